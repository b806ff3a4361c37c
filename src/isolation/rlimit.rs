//! setrlimit-based resource limits (no privileges needed)
//!
//! Limits are applied inside the forked child right before the interpreter
//! is exec'd, so they bind the snippet and everything it spawns.

use std::io;

/// Resource limits via setrlimit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RlimitConfig {
    /// Maximum address space size in bytes (RLIMIT_AS)
    pub max_memory: Option<u64>,
    /// Maximum CPU time in seconds (RLIMIT_CPU)
    pub max_cpu_seconds: Option<u64>,
    /// Maximum number of processes for the child's uid (RLIMIT_NPROC)
    pub max_processes: Option<u64>,
    /// Maximum file size in bytes (RLIMIT_FSIZE)
    pub max_file_size: Option<u64>,
    /// Maximum number of open files (RLIMIT_NOFILE)
    pub max_open_files: Option<u64>,
}

impl RlimitConfig {
    /// Apply resource limits to the current process.
    ///
    /// Runs between fork and exec: it must not allocate, so failures carry
    /// only the raw OS error.
    pub fn apply(&self) -> io::Result<()> {
        if let Some(mem) = self.max_memory {
            set_rlimit(libc::RLIMIT_AS, mem)?;
        }
        if let Some(cpu) = self.max_cpu_seconds {
            set_rlimit(libc::RLIMIT_CPU, cpu)?;
        }
        if let Some(nproc) = self.max_processes {
            set_rlimit(libc::RLIMIT_NPROC, nproc)?;
        }
        if let Some(fsize) = self.max_file_size {
            set_rlimit(libc::RLIMIT_FSIZE, fsize)?;
        }
        if let Some(nofile) = self.max_open_files {
            set_rlimit(libc::RLIMIT_NOFILE, nofile)?;
        }
        Ok(())
    }

    /// Fill in the CPU limit from a wall-clock deadline unless one is set.
    ///
    /// The extra second lets the wall-clock deadline fire first for a
    /// single-threaded busy loop.
    pub fn with_cpu_from_deadline(mut self, deadline: std::time::Duration) -> Self {
        if self.max_cpu_seconds.is_none() {
            let secs = deadline.as_secs() + u64::from(deadline.subsec_nanos() > 0);
            self.max_cpu_seconds = Some(secs.max(1) + 1);
        }
        self
    }
}

#[cfg(target_env = "gnu")]
type Resource = libc::__rlimit_resource_t;
#[cfg(not(target_env = "gnu"))]
type Resource = libc::c_int;

fn set_rlimit(resource: Resource, limit: u64) -> io::Result<()> {
    let rlim = libc::rlimit {
        rlim_cur: limit as libc::rlim_t,
        rlim_max: limit as libc::rlim_t,
    };

    let ret = unsafe { libc::setrlimit(resource, &rlim) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
