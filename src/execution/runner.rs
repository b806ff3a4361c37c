//! Isolated Runner: one snippet, one child process, one deadline

use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::config::SandboxConfig;
use crate::errors::{Result, SandboxError};
use crate::execution::capture::spawn_collector;
use crate::execution::process::ProcessHandle;
use crate::execution::unit::ExecutionUnit;
use crate::isolation::{ChildSetup, seccomp};

/// How long to wait for EOF on each pipe once the process group is gone
const OUTPUT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(2);

/// Terminal state of one run
#[derive(Debug)]
pub enum RunOutcome {
    /// The interpreter exited on its own, whatever its exit code
    Completed {
        stdout: String,
        stderr: String,
        exit_code: Option<i32>,
        signal: Option<i32>,
        wall_time_ms: u64,
    },
    /// The deadline elapsed and the process group was killed
    TimedOut,
    /// Host-side failure: artifact creation, spawn, wait or capture
    InternalError(SandboxError),
}

/// Something that can run a snippet under a deadline.
///
/// Implementations own every resource they create for a run and release it
/// before returning.
pub trait Runner: Send + Sync {
    fn run(&self, source: &str, deadline: Duration) -> RunOutcome;
}

/// Runs snippets by handing a scratch file to the host interpreter in a
/// fresh child process.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    config: SandboxConfig,
}

impl ProcessRunner {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    fn command(&self, unit: &ExecutionUnit, deadline: Duration) -> Result<Command> {
        let config = &self.config;
        let mut command = Command::new(&config.interpreter);
        command
            .args(&config.interpreter_args)
            .arg(unit.script_path())
            .current_dir(unit.workdir())
            .env_clear()
            .envs(config.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env("HOME", unit.workdir())
            .env("TMPDIR", unit.workdir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(gid) = config.gid {
            command.gid(gid);
        }
        if let Some(uid) = config.uid {
            command.uid(uid);
        }

        let setup = ChildSetup {
            namespaces: config.namespaces,
            rlimits: config.rlimits.with_cpu_from_deadline(deadline),
            group_lock: Some(seccomp::group_lock_filter()?),
        };
        // SAFETY: ChildSetup::apply only issues raw syscalls and does not
        // allocate, which keeps it sound between fork and exec.
        unsafe {
            command.pre_exec(move || setup.apply());
        }

        Ok(command)
    }

    fn try_run(&self, source: &str, deadline: Duration) -> Result<RunOutcome> {
        let config = &self.config;

        // Declared before the handle so it is dropped after it: the
        // artifact outlives the process that reads it.
        let unit = ExecutionUnit::create(
            &config.scratch_root,
            source,
            &config.script_suffix,
            config.uid.is_some(),
        )?;

        let child = self.command(&unit, deadline)?.spawn().map_err(|e| {
            SandboxError::Spawn(format!("{}: {}", config.interpreter.display(), e))
        })?;
        let mut handle = ProcessHandle::new(child);
        debug!("Spawned interpreter pid={}", handle.id());

        let stdout = handle
            .take_stdout()
            .ok_or_else(|| SandboxError::Capture("stdout pipe missing".to_string()))?;
        let stderr = handle
            .take_stderr()
            .ok_or_else(|| SandboxError::Capture("stderr pipe missing".to_string()))?;
        let stdout = spawn_collector(stdout, "stdout", config.max_output_bytes)?;
        let stderr = spawn_collector(stderr, "stderr", config.max_output_bytes)?;

        let start = Instant::now();
        let Some(status) = handle.wait_deadline(deadline)? else {
            let status = handle.terminate()?;
            debug!(
                "Interpreter pid={} killed after {}ms ({:?})",
                handle.id(),
                start.elapsed().as_millis(),
                status
            );
            return Ok(RunOutcome::TimedOut);
        };
        let wall_time_ms = start.elapsed().as_millis() as u64;

        // Background children would otherwise keep the pipes open
        handle.kill_group();

        Ok(RunOutcome::Completed {
            stdout: stdout.collect(OUTPUT_COLLECTION_TIMEOUT)?,
            stderr: stderr.collect(OUTPUT_COLLECTION_TIMEOUT)?,
            exit_code: status.code(),
            signal: status.signal(),
            wall_time_ms,
        })
    }
}

impl Runner for ProcessRunner {
    fn run(&self, source: &str, deadline: Duration) -> RunOutcome {
        match self.try_run(source, deadline) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Run failed before completion: {}", e);
                RunOutcome::InternalError(e)
            }
        }
    }
}
