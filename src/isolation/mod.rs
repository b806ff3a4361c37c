//! Isolation layer: what the interpreter child does to itself before exec
//!
//! Everything here runs inside the forked child, between `fork` and `exec`,
//! and therefore sticks to raw syscalls without allocating.

pub mod namespace;
pub mod rlimit;
pub mod seccomp;

pub use namespace::NamespaceConfig;
pub use rlimit::RlimitConfig;

use std::io;

use nix::sched::unshare;
use nix::unistd::setsid;
use seccompiler::BpfProgram;

/// Steps applied in the child, in order:
/// 1. New session; the child leads its own process group
/// 2. SIGKILL on parent death
/// 3. Namespaces
/// 4. Resource limits
/// 5. `no_new_privs`
/// 6. Syscall filter pinning descendants to the process group
#[derive(Debug, Clone, Default)]
pub struct ChildSetup {
    pub namespaces: NamespaceConfig,
    pub rlimits: RlimitConfig,
    /// Compiled by [`seccomp::group_lock_filter`] before fork
    pub group_lock: Option<BpfProgram>,
}

impl ChildSetup {
    pub fn apply(&self) -> io::Result<()> {
        setsid().map_err(io::Error::from)?;

        if unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL as libc::c_ulong, 0, 0, 0) }
            != 0
        {
            return Err(io::Error::last_os_error());
        }

        let flags = self.namespaces.to_clone_flags();
        if !flags.is_empty() {
            unshare(flags).map_err(io::Error::from)?;
        }

        self.rlimits.apply()?;

        if unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1 as libc::c_ulong, 0, 0, 0) } != 0 {
            return Err(io::Error::last_os_error());
        }

        if let Some(program) = &self.group_lock {
            seccomp::load(program)?;
        }

        Ok(())
    }
}

/// Whether unprivileged user namespaces look usable on this host
pub fn user_namespaces_available() -> bool {
    if let Ok(content) = std::fs::read_to_string("/proc/sys/kernel/unprivileged_userns_clone") {
        if content.trim() == "0" {
            return false;
        }
    }

    if let Ok(content) = std::fs::read_to_string("/proc/sys/user/max_user_namespaces") {
        if let Ok(max) = content.trim().parse::<u64>() {
            return max > 0;
        }
    }

    true
}

/// Check if running as root
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_setup_default_has_no_namespaces() {
        let setup = ChildSetup::default();
        assert_eq!(setup.namespaces.enabled_count(), 0);
        assert_eq!(setup.rlimits, RlimitConfig::default());
        assert!(setup.group_lock.is_none());
    }

    #[test]
    fn child_setup_applies_in_forked_child() {
        let setup = ChildSetup {
            rlimits: RlimitConfig {
                max_open_files: Some(32),
                ..Default::default()
            },
            group_lock: Some(seccomp::group_lock_filter().unwrap()),
            ..Default::default()
        };

        match unsafe { nix::unistd::fork() } {
            Ok(nix::unistd::ForkResult::Child) => {
                let code = match setup.apply() {
                    Ok(()) if unsafe { libc::getpgrp() == libc::getpid() } => 0,
                    Ok(()) => 2,
                    Err(_) => 1,
                };
                unsafe { libc::_exit(code) };
            }
            Ok(nix::unistd::ForkResult::Parent { child }) => {
                let status = nix::sys::wait::waitpid(child, None).unwrap();
                assert_eq!(status, nix::sys::wait::WaitStatus::Exited(child, 0));
            }
            Err(e) => panic!("fork failed: {}", e),
        }
    }

    #[test]
    fn user_namespace_probe_does_not_panic() {
        let _ = user_namespaces_available();
    }
}
