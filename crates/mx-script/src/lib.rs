#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fmt;

use mx_fixture::FixtureSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lines starting with this character are treated by the Engine as a syntax
/// failure, which the verifier would misclassify. The plan validator rejects
/// them outright.
pub const COMMENT_TRIGGER: char = '#';

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("command line {index} starts with the Engine comment trigger {COMMENT_TRIGGER:?}: {line}")]
    CommentTrigger { index: usize, line: String },
    #[error("command {index} references matrix {id} before any LOAD MATRIX {id}")]
    ReferenceBeforeLoad { index: usize, id: String },
    #[error("plan contains no commands")]
    EmptyPlan,
    #[error("standard suite requires fixture {id}, which the set does not contain")]
    MissingFixture { id: String },
}

/// One Engine command, rendered as a single script line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    LoadMatrix(String),
    PrintMatrix(String),
    ExportMatrix(String),
    Rotate(String),
    CrossTranspose(String, String),
    CheckAntiSym(String, String),
    /// Rendered as an empty line; a no-op separator the Engine ignores.
    Blank,
    /// A verbatim script line for commands the typed variants do not cover.
    /// Raw lines are exempt from the load-before-reference check but still
    /// subject to the comment-trigger check.
    Raw(String),
}

impl EngineCommand {
    /// Identifiers this command reads. LOAD introduces rather than reads its
    /// identifier, so it reports none.
    fn referenced_ids(&self) -> Vec<&str> {
        match self {
            Self::LoadMatrix(_) | Self::Blank | Self::Raw(_) => Vec::new(),
            Self::PrintMatrix(id) | Self::ExportMatrix(id) | Self::Rotate(id) => {
                vec![id.as_str()]
            }
            Self::CrossTranspose(a, b) | Self::CheckAntiSym(a, b) => {
                vec![a.as_str(), b.as_str()]
            }
        }
    }

    fn loaded_id(&self) -> Option<&str> {
        match self {
            Self::LoadMatrix(id) => Some(id.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadMatrix(id) => write!(f, "LOAD MATRIX {id}"),
            Self::PrintMatrix(id) => write!(f, "PRINT MATRIX {id}"),
            Self::ExportMatrix(id) => write!(f, "EXPORT MATRIX {id}"),
            Self::Rotate(id) => write!(f, "ROTATE {id}"),
            Self::CrossTranspose(a, b) => write!(f, "CROSSTRANSPOSE {a} {b}"),
            Self::CheckAntiSym(a, b) => write!(f, "CHECKANTISYM {a} {b}"),
            Self::Blank => Ok(()),
            Self::Raw(line) => write!(f, "{line}"),
        }
    }
}

/// Whether a scenario expects a success marker or an error marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    Success,
    Error,
}

/// One expected command/response pair. Order across the scenario sequence is
/// significant: it must mirror the order the commands produce output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub expectation: Expectation,
    pub pattern: String,
}

/// An ordered command script plus the scenario sequence it should produce.
///
/// Commands and scenarios are accumulated through one API so the mirror-order
/// invariant holds by construction: a scenario can only enter the sequence
/// attached to the command that produces its marker.
#[derive(Debug, Clone, Default)]
pub struct ScriptPlan {
    commands: Vec<EngineCommand>,
    scenarios: Vec<Scenario>,
    expected_missing: BTreeSet<String>,
}

impl ScriptPlan {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command with no observable marker (blank separators, repeated
    /// prints whose output the suite does not assert on).
    pub fn exec(&mut self, command: EngineCommand) -> &mut Self {
        self.commands.push(command);
        self
    }

    /// Append a command whose output must contain `pattern` on a success line.
    pub fn expect_success(
        &mut self,
        command: EngineCommand,
        name: impl Into<String>,
        pattern: impl Into<String>,
    ) -> &mut Self {
        self.push_expected(command, name, Expectation::Success, pattern)
    }

    /// Append a command whose output must contain `pattern` on an error line.
    pub fn expect_error(
        &mut self,
        command: EngineCommand,
        name: impl Into<String>,
        pattern: impl Into<String>,
    ) -> &mut Self {
        self.push_expected(command, name, Expectation::Error, pattern)
    }

    fn push_expected(
        &mut self,
        command: EngineCommand,
        name: impl Into<String>,
        expectation: Expectation,
        pattern: impl Into<String>,
    ) -> &mut Self {
        self.commands.push(command);
        self.scenarios.push(Scenario {
            name: name.into(),
            expectation,
            pattern: pattern.into(),
        });
        self
    }

    /// Declare an identifier that is deliberately never generated; its LOAD is
    /// exempt from the load-before-reference check and expected to fail.
    pub fn declare_missing(&mut self, id: impl Into<String>) -> &mut Self {
        self.expected_missing.insert(id.into());
        self
    }

    #[must_use]
    pub fn commands(&self) -> &[EngineCommand] {
        &self.commands
    }

    #[must_use]
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Script text: one command per line, blank lines permitted.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for command in &self.commands {
            out.push_str(&command.to_string());
            out.push('\n');
        }
        out
    }

    /// Enforce the two script invariants: no comment-trigger lines, and every
    /// referenced identifier loaded earlier in the plan (missing identifiers
    /// excepted, since their failing LOAD is the point of the scenario).
    pub fn validate(&self) -> Result<(), ScriptError> {
        if self.commands.is_empty() {
            return Err(ScriptError::EmptyPlan);
        }

        let mut loaded = BTreeSet::new();
        for (index, command) in self.commands.iter().enumerate() {
            let line = command.to_string();
            if line.starts_with(COMMENT_TRIGGER) {
                return Err(ScriptError::CommentTrigger { index, line });
            }
            for id in command.referenced_ids() {
                if !loaded.contains(id) {
                    return Err(ScriptError::ReferenceBeforeLoad {
                        index,
                        id: id.to_owned(),
                    });
                }
            }
            if let Some(id) = command.loaded_id()
                && !self.expected_missing.contains(id)
            {
                loaded.insert(id.to_owned());
            }
        }
        Ok(())
    }
}

/// Build the standard 38-scenario suite over the standard fixture set.
///
/// Covers load/print/export/rotate, cross-transpose in both the matching and
/// mismatched-dimension cases, anti-symmetry checks through the True, False,
/// and mismatched-dimension paths, and a load of a nonexistent identifier.
pub fn standard_suite(fixtures: &FixtureSet) -> Result<ScriptPlan, ScriptError> {
    use EngineCommand::{
        Blank, CheckAntiSym, CrossTranspose, ExportMatrix, LoadMatrix, PrintMatrix, Rotate,
    };

    let dim_of = |id: &str| -> Result<usize, ScriptError> {
        fixtures
            .get(id)
            .map(|fixture| fixture.matrix.dim())
            .ok_or_else(|| ScriptError::MissingFixture { id: id.to_owned() })
    };
    let loaded = |id: &str| -> Result<String, ScriptError> {
        let dim = dim_of(id)?;
        Ok(format!("Loaded Matrix. Dimensions: {dim} x {dim}"))
    };
    let printed = |id: &str| -> Result<String, ScriptError> {
        let dim = dim_of(id)?;
        Ok(format!("Matrix dimension: {dim} x {dim}"))
    };
    let exported = |id: &str| format!("Exported matrix {id} to file: {id}.csv");
    let rotated = |id: &str| format!("Matrix {id} rotated 90 degrees");
    let mismatch_cross = "SEMANTIC ERROR: Matrices must have the same dimensions";
    let mismatch_antisym = "SEMANTIC ERROR: Matrices have different dimensions";

    let id = |s: &str| s.to_owned();
    let mut plan = ScriptPlan::new();
    plan.declare_missing("M99");

    // M1: load, print, export, rotate, print again.
    plan.expect_success(LoadMatrix(id("M1")), "LOAD MATRIX M1", loaded("M1")?)
        .expect_success(PrintMatrix(id("M1")), "PRINT MATRIX M1", printed("M1")?)
        .expect_success(ExportMatrix(id("M1")), "EXPORT MATRIX M1", exported("M1"))
        .expect_success(Rotate(id("M1")), "ROTATE M1", rotated("M1"))
        .expect_success(
            PrintMatrix(id("M1")),
            "PRINT MATRIX M1 (rotated)",
            printed("M1")?,
        )
        .exec(Blank);

    // M2, then a matching-dimension cross-transpose against M1.
    plan.expect_success(LoadMatrix(id("M2")), "LOAD MATRIX M2", loaded("M2")?)
        .expect_success(
            CrossTranspose(id("M1"), id("M2")),
            "CROSSTRANSPOSE M1 M2",
            "CROSSTRANSPOSE done",
        )
        .expect_success(
            PrintMatrix(id("M1")),
            "PRINT MATRIX M1 (after crosstranspose)",
            printed("M1")?,
        )
        .expect_success(
            PrintMatrix(id("M2")),
            "PRINT MATRIX M2 (after crosstranspose)",
            printed("M2")?,
        )
        .exec(Blank);

    // M7 (2x2) vs M8 (3x3): cross-transpose must refuse the mismatch.
    plan.expect_success(LoadMatrix(id("M7")), "LOAD MATRIX M7", loaded("M7")?)
        .expect_success(LoadMatrix(id("M8")), "LOAD MATRIX M8", loaded("M8")?)
        .expect_error(
            CrossTranspose(id("M7"), id("M8")),
            "CROSSTRANSPOSE M7 M8 (dimension mismatch)",
            mismatch_cross,
        )
        .exec(Blank);

    // M5/M6: M6 is the negated transpose of M5, so the check reports True.
    plan.expect_success(LoadMatrix(id("M5")), "LOAD MATRIX M5", loaded("M5")?)
        .expect_success(LoadMatrix(id("M6")), "LOAD MATRIX M6", loaded("M6")?)
        .expect_success(
            CheckAntiSym(id("M5"), id("M6")),
            "CHECKANTISYM M5 M6 (anti-symmetric pair)",
            "True",
        )
        .exec(Blank);

    plan.expect_error(
        CheckAntiSym(id("M7"), id("M8")),
        "CHECKANTISYM M7 M8 (dimension mismatch)",
        mismatch_antisym,
    )
    .exec(Blank);

    // M3/M4: 1x1 pair that is not anti-symmetric.
    plan.expect_success(LoadMatrix(id("M3")), "LOAD MATRIX M3", loaded("M3")?)
        .expect_success(LoadMatrix(id("M4")), "LOAD MATRIX M4", loaded("M4")?)
        .expect_success(
            CheckAntiSym(id("M3"), id("M4")),
            "CHECKANTISYM M3 M4 (not anti-symmetric)",
            "False",
        )
        .exec(Blank);

    plan.expect_success(Rotate(id("M3")), "ROTATE M3 (single element)", rotated("M3"))
        .expect_success(PrintMatrix(id("M3")), "PRINT MATRIX M3", printed("M3")?)
        .exec(Blank);

    // M9: seeded 5x5.
    plan.expect_success(LoadMatrix(id("M9")), "LOAD MATRIX M9", loaded("M9")?)
        .expect_success(PrintMatrix(id("M9")), "PRINT MATRIX M9", printed("M9")?)
        .expect_success(ExportMatrix(id("M9")), "EXPORT MATRIX M9", exported("M9"))
        .exec(Blank);

    // Nonexistent identifier: the LOAD itself is the expected failure.
    plan.expect_error(
        LoadMatrix(id("M99")),
        "LOAD MATRIX M99 (nonexistent)",
        "SEMANTIC ERROR: File doesn't exist",
    );

    // Large block: M10/M11 20x20, M12 one larger.
    plan.expect_success(LoadMatrix(id("M10")), "LOAD MATRIX M10", loaded("M10")?)
        .expect_success(PrintMatrix(id("M10")), "PRINT MATRIX M10", printed("M10")?)
        .expect_success(Rotate(id("M10")), "ROTATE M10", rotated("M10"))
        .expect_success(
            PrintMatrix(id("M10")),
            "PRINT MATRIX M10 (rotated)",
            printed("M10")?,
        )
        .expect_success(ExportMatrix(id("M10")), "EXPORT MATRIX M10", exported("M10"))
        .exec(Blank);

    plan.expect_success(LoadMatrix(id("M11")), "LOAD MATRIX M11", loaded("M11")?)
        .expect_success(
            CrossTranspose(id("M10"), id("M11")),
            "CROSSTRANSPOSE M10 M11",
            "CROSSTRANSPOSE done",
        )
        .expect_success(
            PrintMatrix(id("M10")),
            "PRINT MATRIX M10 (after crosstranspose)",
            printed("M10")?,
        )
        .expect_success(
            PrintMatrix(id("M11")),
            "PRINT MATRIX M11 (after crosstranspose)",
            printed("M11")?,
        )
        .exec(Blank)
        .expect_success(
            CheckAntiSym(id("M10"), id("M11")),
            "CHECKANTISYM M10 M11 (random pair)",
            "False",
        )
        .exec(Blank);

    plan.expect_success(LoadMatrix(id("M12")), "LOAD MATRIX M12", loaded("M12")?)
        .expect_error(
            CrossTranspose(id("M10"), id("M12")),
            "CROSSTRANSPOSE M10 M12 (dimension mismatch)",
            mismatch_cross,
        )
        .exec(Blank)
        .expect_error(
            CheckAntiSym(id("M10"), id("M12")),
            "CHECKANTISYM M10 M12 (dimension mismatch)",
            mismatch_antisym,
        );

    plan.validate()?;
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use mx_fixture::FixtureSet;

    use super::{EngineCommand, Expectation, ScriptError, ScriptPlan, standard_suite};

    fn load(id: &str) -> EngineCommand {
        EngineCommand::LoadMatrix(id.to_owned())
    }

    #[test]
    fn commands_render_one_line_each() {
        assert_eq!(load("M1").to_string(), "LOAD MATRIX M1");
        assert_eq!(
            EngineCommand::CrossTranspose("A".to_owned(), "B".to_owned()).to_string(),
            "CROSSTRANSPOSE A B"
        );
        assert_eq!(EngineCommand::Blank.to_string(), "");
    }

    #[test]
    fn empty_plan_is_rejected() {
        let plan = ScriptPlan::new();
        assert!(matches!(plan.validate(), Err(ScriptError::EmptyPlan)));
    }

    #[test]
    fn reference_before_load_is_rejected() {
        let mut plan = ScriptPlan::new();
        plan.expect_success(
            EngineCommand::Rotate("M5".to_owned()),
            "ROTATE M5",
            "rotated",
        );
        let err = plan.validate().expect_err("must fail");
        assert!(matches!(err, ScriptError::ReferenceBeforeLoad { index: 0, .. }));
    }

    #[test]
    fn declared_missing_load_does_not_satisfy_later_references() {
        let mut plan = ScriptPlan::new();
        plan.declare_missing("M99");
        plan.expect_error(load("M99"), "LOAD MATRIX M99", "File doesn't exist");
        plan.exec(EngineCommand::PrintMatrix("M99".to_owned()));
        let err = plan.validate().expect_err("must fail");
        assert!(matches!(err, ScriptError::ReferenceBeforeLoad { index: 1, .. }));
    }

    #[test]
    fn comment_trigger_lines_are_rejected() {
        let mut plan = ScriptPlan::new();
        plan.exec(load("M1"));
        plan.exec(EngineCommand::Raw("# annotation the Engine would choke on".to_owned()));
        let err = plan.validate().expect_err("must fail");
        assert!(matches!(err, ScriptError::CommentTrigger { index: 1, .. }));
    }

    #[test]
    fn raw_lines_without_trigger_are_accepted() {
        let mut plan = ScriptPlan::new();
        plan.exec(load("M1"));
        plan.exec(EngineCommand::Raw("CLEAR M1".to_owned()));
        assert!(plan.validate().is_ok());
        assert!(plan.render().contains("CLEAR M1\n"));
    }

    #[test]
    fn standard_suite_has_38_mirrored_scenarios() {
        let fixtures = FixtureSet::standard(42).expect("fixtures");
        let plan = standard_suite(&fixtures).expect("suite");
        assert_eq!(plan.scenarios().len(), 38);
        assert!(plan.validate().is_ok());

        // Non-blank command count matches the original suite's 38 commands.
        let non_blank = plan
            .commands()
            .iter()
            .filter(|command| !matches!(command, EngineCommand::Blank))
            .count();
        assert_eq!(non_blank, 38);

        let errors = plan
            .scenarios()
            .iter()
            .filter(|scenario| scenario.expectation == Expectation::Error)
            .count();
        assert_eq!(errors, 5);
    }

    #[test]
    fn standard_suite_patterns_follow_fixture_dimensions() {
        let fixtures = FixtureSet::standard(42).expect("fixtures");
        let plan = standard_suite(&fixtures).expect("suite");
        let first = &plan.scenarios()[0];
        assert_eq!(first.name, "LOAD MATRIX M1");
        assert_eq!(first.pattern, "Loaded Matrix. Dimensions: 3 x 3");

        let large = plan
            .scenarios()
            .iter()
            .find(|scenario| scenario.name == "LOAD MATRIX M12")
            .expect("M12 scenario");
        assert_eq!(large.pattern, "Loaded Matrix. Dimensions: 21 x 21");
    }

    #[test]
    fn rendered_script_has_blank_separators_and_no_comment_lines() {
        let fixtures = FixtureSet::standard(42).expect("fixtures");
        let plan = standard_suite(&fixtures).expect("suite");
        let script = plan.render();
        assert!(script.contains("\n\n"), "blank separators expected");
        assert!(script.lines().all(|line| !line.starts_with('#')));
        assert!(script.starts_with("LOAD MATRIX M1\n"));
        assert!(script.trim_end().ends_with("CHECKANTISYM M10 M12"));
    }
}
