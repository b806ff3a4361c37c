//! Named presets for deadline and resource limits

use clap::ValueEnum;
use std::time::Duration;

use crate::controller::ExecutorBuilder;

struct SecurityConfig {
    deadline: Duration,
    memory: u64,
    file_size: u64,
    open_files: u64,
    processes: u64,
}

const STRICT: SecurityConfig = SecurityConfig {
    deadline: Duration::from_secs(5),
    memory: 256 * 1024 * 1024,
    file_size: 1024 * 1024,
    open_files: 64,
    processes: 64,
};

const MODERATE: SecurityConfig = SecurityConfig {
    deadline: Duration::from_secs(10),
    memory: 512 * 1024 * 1024,
    file_size: 16 * 1024 * 1024,
    open_files: 256,
    processes: 256,
};

const PERMISSIVE: SecurityConfig = SecurityConfig {
    deadline: Duration::from_secs(30),
    memory: 1024 * 1024 * 1024,
    file_size: 64 * 1024 * 1024,
    open_files: 1024,
    processes: 1024,
};

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum SecurityProfile {
    /// Reference limits: 5 second deadline, small memory and file budgets
    #[default]
    Strict,
    /// Longer deadline and larger budgets for heavier snippets
    Moderate,
    /// Generous limits: good for local development
    Permissive,
}

impl SecurityProfile {
    fn config(&self) -> &'static SecurityConfig {
        match self {
            SecurityProfile::Strict => &STRICT,
            SecurityProfile::Moderate => &MODERATE,
            SecurityProfile::Permissive => &PERMISSIVE,
        }
    }

    /// Deadline this profile runs snippets with
    pub fn deadline(&self) -> Duration {
        self.config().deadline
    }

    pub fn apply(&self, builder: ExecutorBuilder) -> ExecutorBuilder {
        let cfg = self.config();
        builder
            .deadline(cfg.deadline)
            .memory_limit(cfg.memory)
            .max_file_size(cfg.file_size)
            .max_open_files(cfg.open_files)
            .max_processes(cfg.processes)
    }

    pub fn description(&self) -> &str {
        match self {
            SecurityProfile::Strict => "Reference limits for untrusted snippets",
            SecurityProfile::Moderate => "Relaxed limits for heavier workloads",
            SecurityProfile::Permissive => "Minimal restrictions for development work",
        }
    }

    pub fn details(&self) -> String {
        match self {
            SecurityProfile::Strict => {
                "Deadline: 5s | Memory: 256MB | Max file: 1MB | Open files: 64 | Processes: 64".to_string()
            }
            SecurityProfile::Moderate => {
                "Deadline: 10s | Memory: 512MB | Max file: 16MB | Open files: 256 | Processes: 256".to_string()
            }
            SecurityProfile::Permissive => {
                "Deadline: 30s | Memory: 1GB | Max file: 64MB | Open files: 1024 | Processes: 1024".to_string()
            }
        }
    }

    pub fn all() -> [SecurityProfile; 3] {
        [
            SecurityProfile::Strict,
            SecurityProfile::Moderate,
            SecurityProfile::Permissive,
        ]
    }
}
