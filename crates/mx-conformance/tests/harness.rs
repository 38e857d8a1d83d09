//! End-to-end harness runs against small stand-in Engine executables.

use std::fs;
use std::path::Path;
use std::time::Duration;

use mx_conformance::{HarnessConfig, HarnessError, run_conformance};
use mx_fixture::FixtureSet;
use mx_script::standard_suite;
use mx_verify::{FailureReason, ScenarioStatus};

/// The exact marker stream a conforming Engine would emit for the standard
/// suite under `seed`, interleaved with prompt/dump noise lines.
fn conforming_stream(seed: u64) -> String {
    let fixtures = FixtureSet::standard(seed).expect("fixtures");
    let plan = standard_suite(&fixtures).expect("suite");
    let mut out = String::from("Matrix Engine ready\n");
    for scenario in plan.scenarios() {
        out.push_str("1 2 3\n");
        out.push_str(&scenario.pattern);
        out.push('\n');
    }
    out.push_str("Goodbye\n");
    out
}

/// Configure the harness to run `sh -c <script>` as its Engine.
fn shell_engine(script: &str, data_dir: &Path) -> HarnessConfig {
    let mut config = HarnessConfig::default_paths();
    config.engine_binary = "sh".into();
    config.engine_args = vec!["-c".to_owned(), script.to_owned()];
    config.data_dir = data_dir.to_path_buf();
    config
}

#[test]
fn conforming_engine_yields_green_report_and_cleanup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stream_path = dir.path().join("stream.txt");
    fs::write(&stream_path, conforming_stream(42)).expect("stream");

    let data_dir = dir.path().join("data");
    let config = shell_engine(&format!("cat '{}'", stream_path.display()), &data_dir);

    let outcome = run_conformance(&config).expect("run");
    assert!(outcome.report.is_green(), "report: {:?}", outcome.report);
    assert_eq!(outcome.report.scenario_count, 38);
    assert_eq!(outcome.report.passed, 38);
    assert_eq!(outcome.report.engine_status, Some(0));
    assert!(outcome.engine_output.stdout.contains("Matrix Engine ready"));

    // Generated fixtures and the script were removed after verification.
    assert!(!data_dir.join("M1.csv").exists());
    assert!(!data_dir.join("M12.csv").exists());
    assert!(!data_dir.join("matrix_tests.ra").exists());
}

#[test]
fn truncated_output_fails_trailing_scenarios_without_not_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let full = conforming_stream(42);
    // Keep only the first five marker lines (plus their noise lines).
    let truncated = full.lines().take(11).collect::<Vec<_>>().join("\n");
    let stream_path = dir.path().join("stream.txt");
    fs::write(&stream_path, truncated).expect("stream");

    let data_dir = dir.path().join("data");
    let config = shell_engine(&format!("cat '{}'", stream_path.display()), &data_dir);

    let outcome = run_conformance(&config).expect("run");
    assert_eq!(outcome.report.passed, 5);
    assert_eq!(outcome.report.failed, 33);
    assert_eq!(outcome.report.not_run, 0);
    assert!(!outcome.report.is_green());
    for result in &outcome.report.results[5..] {
        assert_eq!(
            result.status,
            ScenarioStatus::Failed(FailureReason::PatternNotFound)
        );
    }
}

#[test]
fn missing_engine_is_fatal_and_skips_cleanup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path().join("data");
    let mut config = HarnessConfig::default_paths();
    config.engine_binary = "/nonexistent/matrix-engine".into();
    config.data_dir = data_dir.clone();

    let err = run_conformance(&config).expect_err("must fail");
    assert!(err.is_setup_failure());
    assert!(matches!(err, HarnessError::Engine(_)));

    // Setup failure aborts before cleanup: already-written artifacts remain.
    assert!(data_dir.join("M1.csv").exists());
    assert!(data_dir.join("matrix_tests.ra").exists());
}

#[test]
fn hung_engine_times_out_and_still_cleans_up() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path().join("data");
    let mut config = shell_engine("sleep 30", &data_dir);
    config.timeout = Duration::from_millis(200);

    let err = run_conformance(&config).expect_err("must time out");
    assert!(!err.is_setup_failure());
    assert!(matches!(
        err,
        HarnessError::Engine(mx_engine::EngineError::Timeout { .. })
    ));
    assert!(!data_dir.join("M1.csv").exists());
    assert!(!data_dir.join("matrix_tests.ra").exists());
}

#[test]
fn keep_artifacts_skips_cleanup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stream_path = dir.path().join("stream.txt");
    fs::write(&stream_path, conforming_stream(42)).expect("stream");

    let data_dir = dir.path().join("data");
    let mut config = shell_engine(&format!("cat '{}'", stream_path.display()), &data_dir);
    config.keep_artifacts = true;

    let outcome = run_conformance(&config).expect("run");
    assert!(outcome.report.is_green());
    assert!(data_dir.join("M1.csv").exists());
    assert!(data_dir.join("matrix_tests.ra").exists());
    let script = fs::read_to_string(data_dir.join("matrix_tests.ra")).expect("script");
    assert!(script.starts_with("LOAD MATRIX M1\n"));
    assert!(script.lines().all(|line| !line.starts_with('#')));
}

#[test]
fn report_json_artifact_is_written_and_parses() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stream_path = dir.path().join("stream.txt");
    fs::write(&stream_path, conforming_stream(7)).expect("stream");

    let data_dir = dir.path().join("data");
    let report_path = dir.path().join("artifacts").join("run_report.json");
    let mut config = shell_engine(&format!("cat '{}'", stream_path.display()), &data_dir);
    config.master_seed = 7;
    config.report_json = Some(report_path.clone());

    let outcome = run_conformance(&config).expect("run");
    assert!(outcome.report.is_green());

    let body = fs::read_to_string(&report_path).expect("report json");
    let parsed: serde_json::Value = serde_json::from_str(&body).expect("valid json");
    assert_eq!(parsed["suite"], "matrix_engine_protocol");
    assert_eq!(parsed["scenario_count"], 38);
    assert_eq!(parsed["failed"], 0);
}

#[test]
fn nonconforming_engine_inverts_polarity() {
    let dir = tempfile::tempdir().expect("tempdir");
    // An engine that reports a semantic error for the very first LOAD.
    let stream_path = dir.path().join("stream.txt");
    fs::write(&stream_path, "SEMANTIC ERROR: File doesn't exist\n").expect("stream");

    let data_dir = dir.path().join("data");
    let config = shell_engine(&format!("cat '{}'", stream_path.display()), &data_dir);

    let outcome = run_conformance(&config).expect("run");
    assert_eq!(
        outcome.report.results[0].status,
        ScenarioStatus::Failed(FailureReason::GotErrorInsteadOfSuccess)
    );
    // Everything after the inverted scenario desynchronizes.
    assert_eq!(outcome.report.failed, 38);
}
