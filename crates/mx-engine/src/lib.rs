#![forbid(unsafe_code)]

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

/// Default bound on the subordinate process's runtime. A hung Engine must
/// surface as a distinct timeout outcome rather than hanging the harness.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the Engine executable.
    pub binary: PathBuf,
    /// Extra arguments, normally empty for the interactive Engine.
    pub args: Vec<String>,
    /// Working directory for the child; inherited when `None`.
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl EngineConfig {
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// The complete captured result of one Engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `None` when the process was terminated by a signal.
    pub status: Option<i32>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine executable could not be started: {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed writing command input to engine stdin: {0}")]
    Stdin(#[source] io::Error),
    #[error("engine did not exit within {timeout:?}")]
    Timeout { timeout: Duration },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl EngineError {
    /// Setup failures abort the whole run before verification and cleanup;
    /// everything else happens after the run is underway.
    #[must_use]
    pub fn is_setup_failure(&self) -> bool {
        matches!(self, Self::Spawn { .. })
    }
}

/// Run the Engine once: spawn, deliver `input` to stdin in a single write,
/// capture stdout/stderr in full, and wait for exit under the configured
/// deadline. Strictly a batch round trip; nothing is observed incrementally.
pub fn run_engine(config: &EngineConfig, input: &str) -> Result<EngineOutput, EngineError> {
    let mut command = Command::new(&config.binary);
    command
        .args(&config.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &config.working_dir {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|source| EngineError::Spawn {
        binary: config.binary.clone(),
        source,
    })?;
    debug!(binary = %config.binary.display(), bytes = input.len(), "engine spawned");

    // Readers start before the stdin write so a chatty Engine can never fill
    // its output pipe while the harness is still blocked on input delivery.
    let stdout_reader = child.stdout.take().map(spawn_stdout_reader);
    let stderr_reader = child.stderr.take().map(spawn_stderr_reader);

    write_input(&mut child, input)?;

    let status = wait_with_deadline(&mut child, config.timeout)?;

    let stdout = join_reader(stdout_reader)?;
    let stderr = join_reader(stderr_reader)?;
    debug!(?status, stdout_bytes = stdout.len(), "engine exited");

    Ok(EngineOutput {
        stdout,
        stderr,
        status,
    })
}

fn write_input(child: &mut Child, input: &str) -> Result<(), EngineError> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(());
    };
    match stdin.write_all(input.as_bytes()) {
        Ok(()) => Ok(()),
        // The Engine may stop reading once it sees QUIT; a broken pipe on the
        // tail of the input is not a delivery failure.
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
            warn!("engine closed stdin before the full input was written");
            Ok(())
        }
        Err(err) => Err(EngineError::Stdin(err)),
    }
    // Dropping stdin here closes the pipe so the Engine sees end-of-input.
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<Option<i32>, EngineError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status.code());
        }
        if Instant::now() >= deadline {
            warn!(?timeout, "engine deadline expired, killing process");
            let _ = child.kill();
            let _ = child.wait();
            return Err(EngineError::Timeout { timeout });
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    }
}

fn spawn_stdout_reader(mut pipe: ChildStdout) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn spawn_stderr_reader(mut pipe: ChildStderr) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn join_reader(reader: Option<JoinHandle<io::Result<Vec<u8>>>>) -> Result<String, EngineError> {
    let Some(handle) = reader else {
        return Ok(String::new());
    };
    let bytes = handle
        .join()
        .map_err(|_| io::Error::other("output reader thread panicked"))??;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
