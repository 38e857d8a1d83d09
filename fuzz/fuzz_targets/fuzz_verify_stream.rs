#![no_main]

use libfuzzer_sys::fuzz_target;
use mx_script::{Expectation, Scenario};
use mx_verify::{OutputVerifier, ScenarioStatus};

fn scenario(name: &str, expectation: Expectation, pattern: &str) -> Scenario {
    Scenario {
        name: name.to_owned(),
        expectation,
        pattern: pattern.to_owned(),
    }
}

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let scenarios = vec![
        scenario(
            "load",
            Expectation::Success,
            "Loaded Matrix. Dimensions: 3 x 3",
        ),
        scenario(
            "missing",
            Expectation::Error,
            "SEMANTIC ERROR: File doesn't exist",
        ),
        scenario("cross", Expectation::Success, "CROSSTRANSPOSE done"),
    ];

    let mut verifier = OutputVerifier::new(&scenarios);
    let mut previous = verifier.cursor();
    for line in text.lines() {
        verifier.observe_line(line);
        let current = verifier.cursor();
        assert!(current >= previous && current <= scenarios.len());
        previous = current;
    }

    let statuses = verifier.finish();
    assert_eq!(statuses.len(), scenarios.len());
    assert!(statuses.iter().all(|s| *s != ScenarioStatus::NotRun));
});
