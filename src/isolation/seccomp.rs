//! Syscall filter that pins every descendant to the run's process group
//!
//! The supervisor reclaims a run by killing its process group. `setsid` and
//! `setpgid` are the only ways out of that group, so the filter answers both
//! with `EPERM` and allows everything else.

use std::collections::BTreeMap;
use std::io;

use seccompiler::{BpfProgram, SeccompAction, SeccompFilter, SeccompRule, TargetArch};

use crate::errors::{Result, SandboxError};

/// Syscalls that would move a process out of its process group
const GROUP_ESCAPE_SYSCALLS: &[(&str, i64)] = &[
    ("setsid", libc::SYS_setsid as i64),
    ("setpgid", libc::SYS_setpgid as i64),
];

/// Names of the syscalls the filter refuses
pub fn blocked_syscalls() -> impl Iterator<Item = &'static str> {
    GROUP_ESCAPE_SYSCALLS.iter().map(|(name, _)| *name)
}

/// Compile the group-pinning filter for the host architecture.
///
/// Compiled in the parent; the child only loads the finished program.
pub fn group_lock_filter() -> Result<BpfProgram> {
    let arch = TargetArch::try_from(std::env::consts::ARCH)
        .map_err(|e| SandboxError::Seccomp(format!("Unsupported architecture: {}", e)))?;

    let rules: BTreeMap<i64, Vec<SeccompRule>> = GROUP_ESCAPE_SYSCALLS
        .iter()
        .map(|(_, nr)| (*nr, Vec::new()))
        .collect();

    let filter = SeccompFilter::new(
        rules,
        SeccompAction::Allow,
        SeccompAction::Errno(libc::EPERM as u32),
        arch,
    )
    .map_err(|e| SandboxError::Seccomp(format!("Failed to create filter: {}", e)))?;

    filter
        .try_into()
        .map_err(|e| SandboxError::Seccomp(format!("Failed to compile filter: {}", e)))
}

/// Install `program` on the calling thread. Needs `no_new_privs` (or
/// CAP_SYS_ADMIN) and does not allocate.
pub fn load(program: &BpfProgram) -> io::Result<()> {
    seccompiler::apply_filter(program).map_err(|_| io::Error::last_os_error())
}
