//! Namespace configuration for the interpreter child
//!
//! Namespaces are entered with `unshare(2)` from inside the freshly forked
//! child, just before exec. A user namespace lets an unprivileged host
//! create the others; a network namespace leaves the snippet with nothing
//! but a downed loopback interface.

use nix::sched::CloneFlags;

/// Which namespaces the interpreter child enters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NamespaceConfig {
    pub user: bool,
    pub net: bool,
    pub ipc: bool,
    pub uts: bool,
}

impl NamespaceConfig {
    /// No namespaces: the child shares everything with the host process
    pub fn none() -> Self {
        Self::default()
    }

    /// All supported namespaces, anchored on a user namespace so no root is
    /// needed
    pub fn isolated() -> Self {
        Self {
            user: true,
            net: true,
            ipc: true,
            uts: true,
        }
    }

    /// Network removal only (requires root)
    pub fn network_only() -> Self {
        Self {
            net: true,
            ..Self::default()
        }
    }

    pub fn enabled_count(&self) -> usize {
        [self.user, self.net, self.ipc, self.uts]
            .iter()
            .filter(|&&x| x)
            .count()
    }

    /// Whether entering these namespaces needs CAP_SYS_ADMIN on the host
    pub fn needs_privilege(&self) -> bool {
        !self.user && (self.net || self.ipc || self.uts)
    }

    /// Convert to unshare flags
    pub fn to_clone_flags(&self) -> CloneFlags {
        let mut flags = CloneFlags::empty();
        if self.user {
            flags |= CloneFlags::CLONE_NEWUSER;
        }
        if self.net {
            flags |= CloneFlags::CLONE_NEWNET;
        }
        if self.ipc {
            flags |= CloneFlags::CLONE_NEWIPC;
        }
        if self.uts {
            flags |= CloneFlags::CLONE_NEWUTS;
        }
        flags
    }
}
