//! Handle on the spawned interpreter process

use std::io;
use std::process::{Child, ChildStderr, ChildStdout, ExitStatus};
use std::time::Duration;

use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use wait_timeout::ChildExt;

use crate::errors::Result;

/// The interpreter child for one run.
///
/// The child leads its own process group (see
/// [`ChildSetup`](crate::isolation::ChildSetup)), so the whole group can be
/// killed at once. A handle that is dropped before the child was reaped
/// kills the group and reaps the child.
pub struct ProcessHandle {
    child: Child,
    pgid: Pid,
    reaped: bool,
}

impl ProcessHandle {
    pub fn new(child: Child) -> Self {
        let pgid = Pid::from_raw(child.id() as i32);
        Self {
            child,
            pgid,
            reaped: false,
        }
    }

    /// Process ID of the interpreter (also its process group ID)
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Wait for the child to exit, giving up after `deadline`.
    ///
    /// `Ok(None)` means the deadline elapsed and the child is still running.
    pub fn wait_deadline(&mut self, deadline: Duration) -> Result<Option<ExitStatus>> {
        let status = self.child.wait_timeout(deadline)?;
        if status.is_some() {
            self.reaped = true;
        }
        Ok(status)
    }

    /// SIGKILL everything left in the child's process group. Best effort.
    pub fn kill_group(&self) {
        match killpg(self.pgid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => debug!("killpg({}) failed: {}", self.pgid, e),
        }
    }

    /// Forcibly stop the child and its group, then reap it
    pub fn terminate(&mut self) -> Result<ExitStatus> {
        self.kill_group();
        match self.child.kill() {
            Ok(()) => {}
            // already exited, still needs reaping
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => debug!("kill({}) failed: {}", self.child.id(), e),
        }
        let status = self.child.wait()?;
        self.reaped = true;
        Ok(status)
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.reaped {
            if let Err(e) = self.terminate() {
                warn!("Failed to reap interpreter {}: {}", self.child.id(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::{CommandExt, ExitStatusExt};
    use std::process::{Command, Stdio};
    use std::time::Instant;

    fn spawn_in_own_group(script: &str) -> ProcessHandle {
        let child = Command::new("/bin/sh")
            .arg("-c")
            .arg(script)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .unwrap();
        ProcessHandle::new(child)
    }

    #[test]
    fn wait_deadline_returns_status_for_fast_child() {
        let mut handle = spawn_in_own_group("exit 3");
        let status = handle.wait_deadline(Duration::from_secs(5)).unwrap();
        assert_eq!(status.and_then(|s| s.code()), Some(3));
    }

    #[test]
    fn wait_deadline_returns_none_for_slow_child() {
        let mut handle = spawn_in_own_group("sleep 10");
        let start = Instant::now();
        let status = handle.wait_deadline(Duration::from_millis(200)).unwrap();
        assert!(status.is_none());
        assert!(start.elapsed() < Duration::from_secs(5));

        let status = handle.terminate().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGKILL));
    }

    #[test]
    fn terminate_after_exit_still_reaps() {
        let mut handle = spawn_in_own_group("true");
        std::thread::sleep(Duration::from_millis(100));
        assert!(handle.terminate().is_ok());
    }

    #[test]
    fn drop_kills_unreaped_child() {
        let handle = spawn_in_own_group("sleep 30");
        let pid = Pid::from_raw(handle.id() as i32);
        drop(handle);
        // reaped by drop: the pid no longer names a child of ours
        assert_eq!(
            nix::sys::wait::waitpid(pid, Some(nix::sys::wait::WaitPidFlag::WNOHANG)),
            Err(Errno::ECHILD)
        );
    }

    #[test]
    fn kill_group_reaches_grandchildren() {
        let mut handle = spawn_in_own_group("sleep 30 & echo $!; wait");
        let mut stdout = handle.take_stdout().unwrap();
        let mut line = String::new();
        {
            use std::io::BufRead;
            let mut reader = io::BufReader::new(&mut stdout);
            reader.read_line(&mut line).unwrap();
        }
        let grandchild = Pid::from_raw(line.trim().parse().unwrap());

        handle.terminate().unwrap();
        std::thread::sleep(Duration::from_millis(200));
        // signal 0 probes for existence; a zombie reparented to init is
        // reaped quickly, so accept either outcome except "alive and well"
        let alive = nix::sys::signal::kill(grandchild, None).is_ok()
            && std::fs::read_to_string(format!("/proc/{}/stat", grandchild))
                .map(|s| !s.contains(") Z "))
                .unwrap_or(false);
        assert!(!alive, "grandchild {} survived", grandchild);
    }
}
