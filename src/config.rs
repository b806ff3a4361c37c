//! Sandbox configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{Result, SandboxError};
use crate::isolation::{self, NamespaceConfig, RlimitConfig};
use crate::policy::PolicyTable;

/// Wall-clock deadline of the reference policy
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);
/// Interpreter looked up on the child's PATH
pub const DEFAULT_INTERPRETER: &str = "python3";
/// Per-stream capture budget
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;
/// PATH handed to the child
pub const CHILD_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Everything that shapes a run: policy table, interpreter, deadline and
/// the isolation applied to the child.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Interpreter program (bare name or absolute path)
    pub interpreter: PathBuf,
    /// Arguments placed before the script path
    pub interpreter_args: Vec<String>,
    /// Extension given to the script artifact
    pub script_suffix: String,
    /// Wall-clock limit on the whole process lifetime
    pub deadline: Duration,
    /// Directory under which per-run scratch directories are created
    pub scratch_root: PathBuf,
    /// Maximum bytes kept per captured stream
    pub max_output_bytes: usize,
    /// Environment of the child; HOME and TMPDIR are added per run
    pub env: Vec<(String, String)>,
    /// Resource limits applied in the child
    pub rlimits: RlimitConfig,
    /// Namespaces entered by the child
    pub namespaces: NamespaceConfig,
    /// UID to run the interpreter as
    pub uid: Option<u32>,
    /// GID to run the interpreter as
    pub gid: Option<u32>,
    /// Deny list checked before anything is spawned
    pub policy: PolicyTable,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from(DEFAULT_INTERPRETER),
            // isolated mode, no .pyc writes
            interpreter_args: vec!["-I".to_string(), "-B".to_string()],
            script_suffix: ".py".to_string(),
            deadline: DEFAULT_DEADLINE,
            scratch_root: std::env::temp_dir(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            env: default_child_env(),
            rlimits: RlimitConfig {
                max_memory: Some(256 * 1024 * 1024),
                max_cpu_seconds: None,
                // counts every process of the uid; profiles set it
                max_processes: None,
                max_file_size: Some(1024 * 1024),
                max_open_files: Some(64),
            },
            namespaces: NamespaceConfig::none(),
            uid: None,
            gid: None,
            policy: PolicyTable::reference(),
        }
    }
}

fn default_child_env() -> Vec<(String, String)> {
    [
        ("PATH", CHILD_PATH),
        ("LANG", "C.UTF-8"),
        ("PYTHONIOENCODING", "utf-8"),
        ("PYTHONDONTWRITEBYTECODE", "1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl SandboxConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.interpreter.as_os_str().is_empty() {
            return Err(SandboxError::InvalidConfig(
                "Interpreter cannot be empty".to_string(),
            ));
        }

        if self.deadline.is_zero() {
            return Err(SandboxError::InvalidConfig(
                "Deadline must be greater than zero".to_string(),
            ));
        }

        if self.max_output_bytes == 0 {
            return Err(SandboxError::InvalidConfig(
                "Output limit must be greater than zero".to_string(),
            ));
        }

        if !self.scratch_root.is_dir() {
            return Err(SandboxError::InvalidConfig(format!(
                "Scratch root is not a directory: {}",
                self.scratch_root.display()
            )));
        }

        if self.namespaces.needs_privilege() && !isolation::is_root() {
            return Err(SandboxError::InvalidConfig(
                "Network/IPC/UTS namespaces need a user namespace when not running as root"
                    .to_string(),
            ));
        }

        if self.uid.is_some() != self.gid.is_some() {
            return Err(SandboxError::InvalidConfig(
                "uid and gid must be set together".to_string(),
            ));
        }

        Ok(())
    }
}
