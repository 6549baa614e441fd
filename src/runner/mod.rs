//! Batch execution of the external simulator.
//!
//! The calibration loop hands a whole iteration's configurations to a
//! `BatchRunner` and blocks until it returns. Runs inside a batch are
//! independent; the pool size bounds how many simulator processes exist at once.
//!
//! Failure granularity:
//! - one configuration failing (non-zero exit, no track written) is reported
//!   per id and only costs that case
//! - the batch deadline passing aborts the whole batch (`AppError`, exit code 5)

use std::fs::File;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::ConfigId;
use crate::error::AppError;

/// Poll interval while waiting on a child process.
const POLL: Duration = Duration::from_millis(50);

/// One simulator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub id: String,
    pub nml1: PathBuf,
    pub nml2: PathBuf,
    /// Track the run must produce to count as successful.
    pub track: PathBuf,
    /// Where the child's stdout/stderr go.
    pub log: PathBuf,
}

impl From<&ConfigId> for RunRequest {
    fn from(config: &ConfigId) -> Self {
        Self {
            id: config.name.clone(),
            nml1: config.nml1(),
            nml2: config.nml2(),
            track: config.track(),
            log: config.log(),
        }
    }
}

/// A configuration that did not produce a usable run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFailure {
    pub id: String,
    pub reason: String,
}

/// Outcome of a batch that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub failures: Vec<RunFailure>,
}

impl BatchReport {
    pub fn failure(&self, id: &str) -> Option<&RunFailure> {
        self.failures.iter().find(|f| f.id == id)
    }
}

/// "Run these configurations, block until all complete."
pub trait BatchRunner {
    fn run_batch(&self, requests: &[RunRequest]) -> Result<BatchReport, AppError>;
}

/// Runs `executable <nml1> <nml2>` for each request on a bounded thread pool.
#[derive(Debug, Clone)]
pub struct SimulatorRunner {
    pub executable: PathBuf,
    pub concurrency: usize,
    pub timeout: Option<Duration>,
}

enum RunStatus {
    Done,
    Failed(String),
    TimedOut,
}

impl SimulatorRunner {
    pub fn new(executable: PathBuf, concurrency: usize, timeout: Option<Duration>) -> Self {
        Self {
            executable,
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    fn run_one(&self, request: &RunRequest, deadline: Option<Instant>) -> RunStatus {
        let log = match File::create(&request.log) {
            Ok(f) => f,
            Err(e) => return RunStatus::Failed(format!("cannot create log '{}': {e}", request.log.display())),
        };
        let stderr = match log.try_clone() {
            Ok(f) => f,
            Err(e) => return RunStatus::Failed(format!("cannot share log handle: {e}")),
        };

        let child = Command::new(&self.executable)
            .arg(&request.nml1)
            .arg(&request.nml2)
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(stderr)
            .spawn();
        let mut child = match child {
            Ok(c) => c,
            Err(e) => {
                return RunStatus::Failed(format!("failed to spawn '{}': {e}", self.executable.display()));
            }
        };
        debug!(id = %request.id, pid = child.id(), "simulator started");

        match wait_until(&mut child, deadline) {
            Ok(Some(status)) if status.success() => {}
            Ok(Some(status)) => return RunStatus::Failed(format!("simulator exited with {status}")),
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return RunStatus::TimedOut;
            }
            Err(e) => return RunStatus::Failed(format!("failed waiting on simulator: {e}")),
        }

        if request.track.is_file() {
            RunStatus::Done
        } else {
            RunStatus::Failed(format!("no track written at '{}'", request.track.display()))
        }
    }
}

/// Wait for `child`, giving up at `deadline`. `Ok(None)` means the deadline passed.
fn wait_until(child: &mut Child, deadline: Option<Instant>) -> std::io::Result<Option<std::process::ExitStatus>> {
    let Some(deadline) = deadline else {
        return child.wait().map(Some);
    };
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL);
    }
}

impl BatchRunner for SimulatorRunner {
    fn run_batch(&self, requests: &[RunRequest]) -> Result<BatchReport, AppError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency)
            .build()
            .map_err(|e| AppError::new(5, format!("Failed to start simulator pool: {e}")))?;

        info!(
            runs = requests.len(),
            concurrency = self.concurrency,
            executable = %self.executable.display(),
            "running simulator batch"
        );

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let statuses: Vec<RunStatus> =
            pool.install(|| requests.par_iter().map(|r| self.run_one(r, deadline)).collect());

        let mut report = BatchReport::default();
        let mut timed_out = Vec::new();
        for (request, status) in requests.iter().zip(statuses) {
            match status {
                RunStatus::Done => {}
                RunStatus::Failed(reason) => {
                    warn!(id = %request.id, %reason, "simulator run failed");
                    report.failures.push(RunFailure {
                        id: request.id.clone(),
                        reason,
                    });
                }
                RunStatus::TimedOut => timed_out.push(request.id.clone()),
            }
        }

        if !timed_out.is_empty() {
            let secs = self.timeout.map(|t| t.as_secs_f64()).unwrap_or_default();
            return Err(AppError::new(
                5,
                format!(
                    "Simulator batch timed out after {secs:.0}s; still running: {}",
                    timed_out.join(", ")
                ),
            ));
        }

        Ok(report)
    }
}
