#![forbid(unsafe_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mx_engine::{DEFAULT_TIMEOUT, EngineConfig, EngineError, EngineOutput, run_engine};
use mx_fixture::{FixtureError, FixtureSet};
use mx_script::{Scenario, ScriptError, standard_suite};
use mx_verify::{ScenarioStatus, verify_stream};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Path to the Engine executable (spawned once per run).
    pub engine_binary: PathBuf,
    /// Extra arguments passed to the Engine, normally empty.
    pub engine_args: Vec<String>,
    /// Working directory the Engine is spawned in; inherited when `None`.
    pub engine_workdir: Option<PathBuf>,
    /// Directory fixture files and the command script are written to.
    pub data_dir: PathBuf,
    /// Stem of the script file; the Engine is told to `SOURCE` it by stem.
    pub script_name: String,
    /// Master seed for the randomized fixture block.
    pub master_seed: u64,
    pub timeout: Duration,
    /// Skip the end-of-run cleanup of generated files.
    pub keep_artifacts: bool,
    /// When set, the machine-readable run report is written here.
    pub report_json: Option<PathBuf>,
}

impl HarnessConfig {
    /// Defaults mirror the conventional Engine checkout: the `server` binary
    /// next to the harness and a sibling `data` directory.
    #[must_use]
    pub fn default_paths() -> Self {
        Self {
            engine_binary: PathBuf::from("./server"),
            engine_args: Vec::new(),
            engine_workdir: None,
            data_dir: PathBuf::from("../data"),
            script_name: "matrix_tests".to_owned(),
            master_seed: 42,
            timeout: DEFAULT_TIMEOUT,
            keep_artifacts: false,
            report_json: None,
        }
    }

    #[must_use]
    pub fn script_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.ra", self.script_name))
    }

    /// The full batch input the Engine receives on stdin: run the script,
    /// then terminate.
    #[must_use]
    pub fn engine_input(&self) -> String {
        format!("SOURCE {}\nQUIT\n", self.script_name)
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Fixture(#[from] FixtureError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    /// True for the fatal setup class: the Engine could not be started at
    /// all, so no verification, report, or cleanup happened.
    #[must_use]
    pub fn is_setup_failure(&self) -> bool {
        matches!(self, Self::Engine(err) if err.is_setup_failure())
    }
}

/// One scenario's name and final status, in scenario order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub status: ScenarioStatus,
}

/// The machine-readable summary of one conformance run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub suite: String,
    pub scenario_count: usize,
    pub passed: usize,
    pub failed: usize,
    pub not_run: usize,
    /// Engine exit code, recorded as evidence; never used for classification.
    pub engine_status: Option<i32>,
    pub results: Vec<ScenarioResult>,
}

impl RunReport {
    #[must_use]
    pub fn is_green(&self) -> bool {
        self.scenario_count > 0 && self.failed == 0 && self.not_run == 0
    }
}

/// Everything a caller needs after a completed run: the verdicts plus the
/// verbatim captured output for echoing ahead of the report table.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: RunReport,
    pub engine_output: EngineOutput,
}

/// Execute one full conformance run against the configured Engine.
///
/// Pipeline: generate fixtures, build and validate the command plan, write
/// the script file, run the Engine once, verify its output stream, clean up
/// generated files (best effort), and assemble the report.
///
/// A spawn failure aborts immediately with no verification or cleanup. An
/// Engine timeout is a run-level failure distinct from any scenario verdict;
/// generated files are still cleaned up before the error is returned.
pub fn run_conformance(config: &HarnessConfig) -> Result<RunOutcome, HarnessError> {
    let fixtures = FixtureSet::standard(config.master_seed)?;
    let fixture_paths = fixtures.write_all(&config.data_dir)?;
    info!(
        count = fixture_paths.len(),
        dir = %config.data_dir.display(),
        "fixtures generated"
    );

    let plan = standard_suite(&fixtures)?;
    let script_path = config.script_path();
    fs::write(&script_path, plan.render())?;
    info!(script = %script_path.display(), scenarios = plan.scenarios().len(), "script written");

    let engine_output = match run_engine(&engine_config(config), &config.engine_input()) {
        Ok(output) => output,
        Err(err) if err.is_setup_failure() => return Err(err.into()),
        Err(err) => {
            cleanup_artifacts(config, &fixture_paths, &script_path);
            return Err(err.into());
        }
    };

    let statuses = verify_stream(plan.scenarios(), &engine_output.stdout);
    cleanup_artifacts(config, &fixture_paths, &script_path);

    let report = build_report(plan.scenarios(), &statuses, engine_output.status);
    if let Some(path) = &config.report_json {
        write_report_json(path, &report)?;
    }

    Ok(RunOutcome {
        report,
        engine_output,
    })
}

fn engine_config(config: &HarnessConfig) -> EngineConfig {
    let mut engine = EngineConfig::new(&config.engine_binary);
    engine.args = config.engine_args.clone();
    engine.working_dir = config.engine_workdir.clone();
    engine.timeout = config.timeout;
    engine
}

fn build_report(
    scenarios: &[Scenario],
    statuses: &[ScenarioStatus],
    engine_status: Option<i32>,
) -> RunReport {
    let results = scenarios
        .iter()
        .zip(statuses)
        .map(|(scenario, status)| ScenarioResult {
            name: scenario.name.clone(),
            status: *status,
        })
        .collect::<Vec<_>>();

    let passed = statuses
        .iter()
        .filter(|s| matches!(s, ScenarioStatus::Passed))
        .count();
    let failed = statuses
        .iter()
        .filter(|s| matches!(s, ScenarioStatus::Failed(_)))
        .count();
    let not_run = statuses
        .iter()
        .filter(|s| matches!(s, ScenarioStatus::NotRun))
        .count();

    RunReport {
        suite: "matrix_engine_protocol".to_owned(),
        scenario_count: results.len(),
        passed,
        failed,
        not_run,
        engine_status,
        results,
    }
}

/// Best-effort removal of every generated fixture and the script file.
/// Removal failures are logged and never escalate.
fn cleanup_artifacts(config: &HarnessConfig, fixture_paths: &[PathBuf], script_path: &Path) {
    if config.keep_artifacts {
        info!("keeping generated artifacts on request");
        return;
    }
    let script_path = script_path.to_path_buf();
    for path in fixture_paths.iter().chain(std::iter::once(&script_path)) {
        if let Err(err) = fs::remove_file(path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), %err, "could not remove generated file");
            }
        }
    }
}

/// Render the final aligned `name => status` table. Pure formatting.
#[must_use]
pub fn render_report(report: &RunReport) -> String {
    let width = report
        .results
        .iter()
        .map(|result| result.name.len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    out.push_str("=== Conformance Report ===\n");
    for result in &report.results {
        let _ = writeln!(out, "{:<width$}  =>  {}", result.name, result.status);
    }
    let _ = writeln!(
        out,
        "--- {} scenarios: {} passed, {} failed, {} not run ---",
        report.scenario_count, report.passed, report.failed, report.not_run
    );
    out.push_str("=== End of Report ===\n");
    out
}

/// Write the pretty-printed JSON run report.
pub fn write_report_json(path: &Path, report: &RunReport) -> Result<(), HarnessError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(report)?)?;
    Ok(())
}
