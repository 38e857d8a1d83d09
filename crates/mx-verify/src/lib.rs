#![forbid(unsafe_code)]

use std::fmt;

use mx_script::{Expectation, Scenario};
use serde::{Deserialize, Serialize};

/// Substrings that mark a line as an Engine failure of either class. A line
/// carrying one of these while a success is expected inverts the scenario.
pub const GENERIC_ERROR_MARKERS: [&str; 2] = ["semantic error", "syntax error"];

/// Substrings that mark a line as an Engine success confirmation or boolean
/// result. A line carrying one of these while an error is expected inverts
/// the scenario.
pub const GENERIC_SUCCESS_MARKERS: [&str; 6] = [
    "loaded matrix",
    "exported matrix",
    "crosstranspose done",
    "rotated 90 degrees",
    "true",
    "false",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    GotErrorInsteadOfSuccess,
    GotSuccessInsteadOfError,
    PatternNotFound,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::GotErrorInsteadOfSuccess => "got error instead of success",
            Self::GotSuccessInsteadOfError => "got success instead of error",
            Self::PatternNotFound => "pattern not found",
        };
        f.write_str(text)
    }
}

/// Per-scenario result. Initialized `NotRun`, written at most once by the
/// verifier, never mutated afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum ScenarioStatus {
    Passed,
    Failed(FailureReason),
    NotRun,
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => f.write_str("PASSED"),
            Self::Failed(reason) => write!(f, "FAILED ({reason})"),
            Self::NotRun => f.write_str("NOT_RUN"),
        }
    }
}

/// The forward-only streaming matcher.
///
/// A single cursor advances over the ordered scenario sequence as lines are
/// observed. Lines matching neither the current scenario's pattern nor a
/// generic marker of the opposite polarity are noise and leave the cursor in
/// place, so arbitrary diagnostic output between markers is tolerated. The
/// matcher never backtracks or looks ahead: a marker that never appears (or
/// appears permanently out of order) desynchronizes every later scenario.
#[derive(Debug)]
pub struct OutputVerifier<'a> {
    scenarios: &'a [Scenario],
    cursor: usize,
    statuses: Vec<ScenarioStatus>,
}

impl<'a> OutputVerifier<'a> {
    #[must_use]
    pub fn new(scenarios: &'a [Scenario]) -> Self {
        Self {
            scenarios,
            cursor: 0,
            statuses: vec![ScenarioStatus::NotRun; scenarios.len()],
        }
    }

    /// Current cursor position; monotone non-decreasing, never exceeds the
    /// scenario count.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Classify one output line against the scenario under the cursor.
    pub fn observe_line(&mut self, line: &str) {
        let Some(scenario) = self.scenarios.get(self.cursor) else {
            return;
        };
        let line_lc = line.to_lowercase();
        let pattern_lc = scenario.pattern.to_lowercase();

        let verdict = match scenario.expectation {
            Expectation::Success => {
                if line_lc.contains(&pattern_lc) {
                    Some(ScenarioStatus::Passed)
                } else if GENERIC_ERROR_MARKERS.iter().any(|m| line_lc.contains(m)) {
                    Some(ScenarioStatus::Failed(
                        FailureReason::GotErrorInsteadOfSuccess,
                    ))
                } else {
                    None
                }
            }
            Expectation::Error => {
                if line_lc.contains(&pattern_lc) {
                    Some(ScenarioStatus::Passed)
                } else if GENERIC_SUCCESS_MARKERS.iter().any(|m| line_lc.contains(m)) {
                    Some(ScenarioStatus::Failed(
                        FailureReason::GotSuccessInsteadOfError,
                    ))
                } else {
                    None
                }
            }
        };

        if let Some(status) = verdict {
            self.statuses[self.cursor] = status;
            self.cursor += 1;
        }
    }

    /// Exhaust the stream: every scenario the cursor never reached a verdict
    /// for is marked `pattern not found`.
    #[must_use]
    pub fn finish(mut self) -> Vec<ScenarioStatus> {
        for status in self.statuses.iter_mut().skip(self.cursor) {
            *status = ScenarioStatus::Failed(FailureReason::PatternNotFound);
        }
        self.statuses
    }
}

/// Batch entry point: scan the captured output line by line and return one
/// status per scenario, in scenario order.
#[must_use]
pub fn verify_stream(scenarios: &[Scenario], output: &str) -> Vec<ScenarioStatus> {
    let mut verifier = OutputVerifier::new(scenarios);
    for line in output.lines() {
        verifier.observe_line(line);
    }
    verifier.finish()
}
