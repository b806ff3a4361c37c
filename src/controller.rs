//! Execution Coordinator: validate, run, normalize

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SandboxConfig;
use crate::errors::{Result, SandboxError};
use crate::execution::{ProcessRunner, RunOutcome, Runner};
use crate::isolation::NamespaceConfig;
use crate::policy::{CallPattern, PolicyTable, ValidationVerdict};
use crate::utils::format_seconds;

/// Diagnostic for every host-side failure; carries no host detail
pub const INTERNAL_ERROR_MESSAGE: &str =
    "Error: Internal execution error. The snippet could not be run.";

/// A snippet submitted for execution. Treated as untrusted throughout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

/// What the caller gets back, for every input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    /// Result for any outcome where the snippet produced no usable output
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
        }
    }
}

/// Message reported when a run is killed at its deadline
pub fn timeout_message(deadline: Duration) -> String {
    format!(
        "Error: Code execution timed out ({}-second limit exceeded).",
        format_seconds(deadline)
    )
}

/// Runs snippets one request at a time; holds no per-request state, so a
/// single executor can serve any number of concurrent callers.
pub struct Executor<R: Runner = ProcessRunner> {
    policy: PolicyTable,
    deadline: Duration,
    runner: R,
}

impl<R: Runner> Executor<R> {
    /// Policy table checked before every run
    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    /// Wall-clock limit handed to the runner
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Validate and run one snippet. Never fails and never retries.
    pub fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        let run_id = Uuid::new_v4();

        if let ValidationVerdict::Rejected(rejection) = self.policy.validate(&request.code) {
            warn!("[{}] Rejected snippet: forbidden '{}'", run_id, rejection.token);
            return ExecutionResult::failure(rejection.reason());
        }

        debug!(
            "[{}] Running {} byte snippet (deadline {}s)",
            run_id,
            request.code.len(),
            format_seconds(self.deadline)
        );

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.runner.run(&request.code, self.deadline)
        }))
        .unwrap_or_else(|_| {
            RunOutcome::InternalError(SandboxError::Spawn("runner panicked".to_string()))
        });

        match outcome {
            RunOutcome::Completed {
                stdout,
                stderr,
                exit_code,
                signal,
                wall_time_ms,
            } => {
                info!(
                    "[{}] Completed in {}ms (exit_code={:?}, signal={:?})",
                    run_id, wall_time_ms, exit_code, signal
                );
                ExecutionResult { stdout, stderr }
            }
            RunOutcome::TimedOut => {
                warn!(
                    "[{}] Killed after {}s deadline",
                    run_id,
                    format_seconds(self.deadline)
                );
                ExecutionResult::failure(timeout_message(self.deadline))
            }
            RunOutcome::InternalError(e) => {
                error!("[{}] Internal error: {}", run_id, e);
                ExecutionResult::failure(INTERNAL_ERROR_MESSAGE)
            }
        }
    }

    /// Convenience wrapper around [`Executor::execute`]
    pub fn execute_code(&self, code: &str) -> ExecutionResult {
        self.execute(&ExecutionRequest::new(code))
    }
}

/// Builder pattern for executor creation
pub struct ExecutorBuilder {
    config: SandboxConfig,
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutorBuilder {
    /// Create new builder with the reference policy
    pub fn new() -> Self {
        Self {
            config: SandboxConfig::default(),
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Set interpreter program
    pub fn interpreter(mut self, interpreter: impl AsRef<Path>) -> Self {
        self.config.interpreter = interpreter.as_ref().to_path_buf();
        self
    }

    /// Set arguments placed before the script path
    pub fn interpreter_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.interpreter_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set script file extension
    pub fn script_suffix(mut self, suffix: &str) -> Self {
        self.config.script_suffix = suffix.to_string();
        self
    }

    /// Set wall-clock deadline
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.config.deadline = deadline;
        self
    }

    /// Set memory limit
    pub fn memory_limit(mut self, bytes: u64) -> Self {
        self.config.rlimits.max_memory = Some(bytes);
        self
    }

    /// Set memory limit from string (e.g., "256M")
    pub fn memory_limit_str(self, s: &str) -> Result<Self> {
        let bytes = crate::utils::parse_memory_size(s)?;
        Ok(self.memory_limit(bytes))
    }

    /// Set maximum size of files the snippet may write
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.rlimits.max_file_size = Some(bytes);
        self
    }

    /// Set maximum open file descriptors
    pub fn max_open_files(mut self, count: u64) -> Self {
        self.config.rlimits.max_open_files = Some(count);
        self
    }

    /// Set RLIMIT_NPROC for the child's uid
    pub fn max_processes(mut self, count: u64) -> Self {
        self.config.rlimits.max_processes = Some(count);
        self
    }

    /// Set CPU time limit; defaults to one second past the deadline
    pub fn max_cpu_seconds(mut self, secs: u64) -> Self {
        self.config.rlimits.max_cpu_seconds = Some(secs);
        self
    }

    /// Set per-stream capture budget
    pub fn max_output_bytes(mut self, bytes: usize) -> Self {
        self.config.max_output_bytes = bytes;
        self
    }

    /// Set namespace configuration
    pub fn namespaces(mut self, config: NamespaceConfig) -> Self {
        self.config.namespaces = config;
        self
    }

    /// Run the interpreter under a dedicated low-privilege identity
    pub fn run_as(mut self, uid: u32, gid: u32) -> Self {
        self.config.uid = Some(uid);
        self.config.gid = Some(gid);
        self
    }

    /// Set directory for per-run scratch directories
    pub fn scratch_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.scratch_root = path.into();
        self
    }

    /// Replace the policy table
    pub fn policy(mut self, policy: PolicyTable) -> Self {
        self.config.policy = policy;
        self
    }

    /// Add a forbidden module to the policy table
    pub fn forbid_module(mut self, module: &str) -> Self {
        self.config.policy = self.config.policy.forbid_module(module);
        self
    }

    /// Add a forbidden call pattern to the policy table
    pub fn forbid_pattern(mut self, pattern: CallPattern) -> Self {
        self.config.policy = self.config.policy.forbid_pattern(pattern);
        self
    }

    /// Build an executor backed by [`ProcessRunner`]
    pub fn build(self) -> Result<Executor> {
        self.config.validate()?;
        let policy = self.config.policy.clone();
        let deadline = self.config.deadline;
        Ok(Executor {
            policy,
            deadline,
            runner: ProcessRunner::new(self.config),
        })
    }

    /// Build an executor around a custom runner
    pub fn build_with_runner<R: Runner>(self, runner: R) -> Result<Executor<R>> {
        self.config.validate()?;
        Ok(Executor {
            policy: self.config.policy,
            deadline: self.config.deadline,
            runner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Script {
        Print(&'static str, &'static str),
        Timeout,
        Fail,
        Panic,
    }

    /// Runner double that counts spawns instead of spawning
    struct CountingRunner {
        calls: AtomicUsize,
        seen: Mutex<Vec<(String, Duration)>>,
        script: Script,
    }

    impl CountingRunner {
        fn new(script: Script) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                script,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Runner for CountingRunner {
        fn run(&self, source: &str, deadline: Duration) -> RunOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push((source.to_string(), deadline));
            match self.script {
                Script::Print(stdout, stderr) => RunOutcome::Completed {
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                    exit_code: Some(if stderr.is_empty() { 0 } else { 1 }),
                    signal: None,
                    wall_time_ms: 1,
                },
                Script::Timeout => RunOutcome::TimedOut,
                Script::Fail => RunOutcome::InternalError(SandboxError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "/var/secret/path: no space left",
                ))),
                Script::Panic => panic!("runner blew up"),
            }
        }
    }

    fn executor(script: Script) -> Executor<CountingRunner> {
        ExecutorBuilder::new()
            .build_with_runner(CountingRunner::new(script))
            .unwrap()
    }

    #[test]
    fn rejected_snippet_never_reaches_runner() {
        let exec = executor(Script::Print("should not run", ""));

        for code in ["import os", "from os import path", "IMPORT SUBPROCESS", "open('x')"] {
            let result = exec.execute_code(code);
            assert!(result.stdout.is_empty());
            assert!(result.stderr.starts_with("Security Error"));
        }
        assert_eq!(exec.runner().calls(), 0);
    }

    #[test]
    fn rejection_names_the_module() {
        let exec = executor(Script::Print("", ""));
        let result = exec.execute_code("from os import path");
        assert_eq!(
            result,
            ExecutionResult::failure(
                "Security Error: Module 'os' is not allowed for security reasons."
            )
        );
    }

    #[test]
    fn allowed_snippet_runs_exactly_once_with_deadline() {
        let exec = executor(Script::Print("Hello, World!\n", ""));
        let result = exec.execute_code("print(\"Hello, World!\")");

        assert_eq!(result.stdout, "Hello, World!\n");
        assert_eq!(result.stderr, "");
        assert_eq!(exec.runner().calls(), 1);

        let seen = exec.runner().seen.lock().unwrap();
        assert_eq!(seen[0].0, "print(\"Hello, World!\")");
        assert_eq!(seen[0].1, Duration::from_secs(5));
    }

    #[test]
    fn empty_snippet_is_run() {
        let exec = executor(Script::Print("", ""));
        assert_eq!(exec.execute_code("   "), ExecutionResult::default());
        assert_eq!(exec.runner().calls(), 1);
    }

    #[test]
    fn completed_output_passes_through_unmodified() {
        let exec = executor(Script::Print("partial\n", "Traceback ...\nZeroDivisionError\n"));
        let result = exec.execute_code("print('partial')\n1/0");
        assert_eq!(result.stdout, "partial\n");
        assert_eq!(result.stderr, "Traceback ...\nZeroDivisionError\n");
    }

    #[test]
    fn timeout_reports_fixed_message() {
        let exec = executor(Script::Timeout);
        let result = exec.execute_code("while True: pass");
        assert!(result.stdout.is_empty());
        assert_eq!(
            result.stderr,
            "Error: Code execution timed out (5-second limit exceeded)."
        );
        assert_eq!(exec.runner().calls(), 1);
    }

    #[test]
    fn internal_error_is_generic() {
        let exec = executor(Script::Fail);
        let result = exec.execute_code("print(1)");
        assert!(result.stdout.is_empty());
        assert_eq!(result.stderr, INTERNAL_ERROR_MESSAGE);
        assert!(!result.stderr.contains("/var/secret"));
        // no retry
        assert_eq!(exec.runner().calls(), 1);
    }

    #[test]
    fn runner_panic_becomes_internal_error() {
        let exec = executor(Script::Panic);
        let result = exec.execute_code("print(1)");
        assert_eq!(result, ExecutionResult::failure(INTERNAL_ERROR_MESSAGE));
    }

    #[test]
    fn timeout_message_formats_fractional_deadlines() {
        assert_eq!(
            timeout_message(Duration::from_millis(1500)),
            "Error: Code execution timed out (1.5-second limit exceeded)."
        );
    }

    #[test]
    fn builder_threads_deadline_and_policy() {
        let exec = ExecutorBuilder::new()
            .deadline(Duration::from_secs(2))
            .forbid_module("pickle")
            .build_with_runner(CountingRunner::new(Script::Print("", "")))
            .unwrap();

        assert_eq!(exec.deadline(), Duration::from_secs(2));
        assert!(exec.execute_code("import pickle").stderr.contains("'pickle'"));
        exec.execute_code("x = 1");
        assert_eq!(exec.runner().seen.lock().unwrap()[0].1, Duration::from_secs(2));
    }

    #[test]
    fn builder_rejects_invalid_config() {
        assert!(ExecutorBuilder::new().deadline(Duration::ZERO).build().is_err());
        assert!(ExecutorBuilder::new().interpreter("").build().is_err());
        assert!(ExecutorBuilder::new().memory_limit_str("lots").is_err());
    }

    #[test]
    fn builder_sets_limits() -> Result<()> {
        let builder = ExecutorBuilder::new()
            .memory_limit_str("128M")?
            .max_file_size(4096)
            .max_open_files(32)
            .max_processes(16)
            .max_cpu_seconds(3)
            .max_output_bytes(2048)
            .run_as(65534, 65534);
        let rl = builder.config().rlimits;
        assert_eq!(rl.max_memory, Some(128 * 1024 * 1024));
        assert_eq!(rl.max_file_size, Some(4096));
        assert_eq!(rl.max_open_files, Some(32));
        assert_eq!(rl.max_processes, Some(16));
        assert_eq!(rl.max_cpu_seconds, Some(3));
        assert_eq!(builder.config().max_output_bytes, 2048);
        assert_eq!(builder.config().uid, Some(65534));
        Ok(())
    }

    #[test]
    fn request_and_result_serialize_as_flat_objects() {
        let req: ExecutionRequest = serde_json::from_str(r#"{"code": "print(1)"}"#).unwrap();
        assert_eq!(req.code, "print(1)");

        let json = serde_json::to_value(ExecutionResult {
            stdout: "1\n".to_string(),
            stderr: String::new(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"stdout": "1\n", "stderr": ""}));
    }
}
