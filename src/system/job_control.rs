// src/system/job_control.rs

//! Process-group membership and controlling-terminal ownership.
//!
//! Caller discipline, not enforced here:
//! - a new process joins its group before it replaces its image, so signals sent to the group
//!   cannot miss it (doing it in the parent as well closes the remaining window);
//! - a process changing the terminal's foreground group while in the background must ignore or
//!   block SIGTTOU, otherwise the kernel stops it;
//! - the terminal should be in a known mode (see `termios`) around every ownership change.

use crate::system::error::{OsContext, SysResult};
use crate::system::process::current_pid;
use nix::unistd::{self, Pid};
use std::os::fd::{AsFd, AsRawFd};

/// Makes `pid` the leader of a new process group whose id is its own pid. `pid` 0 means the
/// calling process. Returns the new group id.
pub fn create_group(pid: Pid) -> SysResult<Pid> {
    let pid = if pid.as_raw() == 0 { current_pid() } else { pid };
    join_group(pid, pid)
}

/// Moves `pid` into the existing group `target_pgid` (or creates it when the two are equal).
/// Returns the group id.
pub fn join_group(pid: Pid, target_pgid: Pid) -> SysResult<Pid> {
    unistd::setpgid(pid, target_pgid).os_context("setpgid")?;
    log::debug!("setpgid({}, {})", pid, target_pgid);
    Ok(if target_pgid.as_raw() == 0 {
        if pid.as_raw() == 0 { current_pid() } else { pid }
    } else {
        target_pgid
    })
}

/// The calling process's own group.
pub fn current_group() -> Pid {
    unistd::getpgrp()
}

/// The group of an arbitrary process.
pub fn group_of(pid: Pid) -> SysResult<Pid> {
    unistd::getpgid(Some(pid)).os_context("getpgid")
}

/// The group that currently owns `terminal`.
pub fn foreground_group<Fd: AsFd>(terminal: Fd) -> SysResult<Pid> {
    let fd = terminal.as_fd();
    unistd::tcgetpgrp(fd).tty_context("tcgetpgrp", fd.as_raw_fd())
}

/// Hands `terminal` to `pgid`. From a background process this raises SIGTTOU unless the caller
/// ignores it.
pub fn set_foreground_group<Fd: AsFd>(terminal: Fd, pgid: Pid) -> SysResult<()> {
    let fd = terminal.as_fd();
    unistd::tcsetpgrp(fd, pgid).tty_context("tcsetpgrp", fd.as_raw_fd())?;
    log::debug!("tcsetpgrp(fd {}, {})", fd.as_raw_fd(), pgid);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::error::ErrorKind;
    use crate::system::fd::create_pipe;
    use crate::system::process::{self, Forked, ProcessState, WaitFlags, WaitTarget, exit_child};
    use crate::system::test_support::{fork_lock, run_in_child};
    use nix::sys::signal::Signal;
    use std::time::Duration;

    #[test]
    fn test_create_group_in_child_makes_it_leader() {
        let state = run_in_child(|| {
            let Ok(pgid) = create_group(Pid::from_raw(0)) else {
                return 2;
            };
            if pgid != current_pid() || current_group() != pgid {
                return 3;
            }
            0
        });
        assert_eq!(state, ProcessState::Exited(0));
    }

    #[test]
    fn test_parent_moves_child_into_group() {
        let _lock = fork_lock();
        let child = match process::spawn().unwrap() {
            Forked::Child => {
                std::thread::sleep(Duration::from_secs(30));
                exit_child(0)
            }
            Forked::Parent { child } => child,
        };

        let pgid = create_group(child).unwrap();
        assert_eq!(pgid, child);
        assert_eq!(group_of(child).unwrap(), child);
        assert_ne!(current_group(), child);

        // The group is addressable as a whole.
        process::signal_group(pgid, Signal::SIGKILL).unwrap();
        let outcome = process::wait(WaitTarget::Group(pgid), WaitFlags::empty()).unwrap();
        assert!(matches!(
            outcome,
            process::WaitOutcome::Changed {
                state: ProcessState::Signaled(Signal::SIGKILL, false),
                ..
            }
        ));
    }

    #[test]
    fn test_foreground_group_on_pipe_is_not_a_terminal() {
        let pipe = create_pipe().unwrap();
        let err = foreground_group(&pipe.read_end).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotATerminal);
        let err = set_foreground_group(&pipe.read_end, current_group()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotATerminal);
    }

    /// Opens a pseudo-terminal as the controlling terminal of a fresh session, then moves the
    /// foreground between the session leader's group and a second group.
    #[cfg(target_os = "linux")]
    #[test]
    fn test_set_then_get_foreground_group() {
        use crate::system::signals::{Disposition, set_disposition};
        use std::fs::OpenOptions;

        let pty = nix::pty::openpty(None, None).unwrap();
        let slave_path =
            std::fs::read_link(format!("/proc/self/fd/{}", pty.slave.as_raw_fd())).unwrap();

        let state = run_in_child(move || {
            if unistd::setsid().is_err() {
                return 2;
            }
            // Opening a terminal without O_NOCTTY from a session leader with no controlling
            // terminal makes it the controlling terminal.
            let Ok(terminal) = OpenOptions::new().read(true).write(true).open(&slave_path) else {
                return 3;
            };
            let leader_group = current_group();
            match foreground_group(&terminal) {
                Ok(group) if group == leader_group => {}
                _ => return 4,
            }
            if set_foreground_group(&terminal, leader_group).is_err() {
                return 5;
            }
            if foreground_group(&terminal).ok() != Some(leader_group) {
                return 6;
            }

            let other = match process::spawn() {
                Ok(Forked::Child) => {
                    let _ = create_group(Pid::from_raw(0));
                    std::thread::sleep(Duration::from_secs(30));
                    exit_child(0)
                }
                Ok(Forked::Parent { child }) => child,
                Err(_) => return 7,
            };
            let _ = create_group(other);
            // After the transfer this process is in the background.
            let _ = set_disposition(Signal::SIGTTOU, Disposition::Ignore);
            if set_foreground_group(&terminal, other).is_err() {
                return 8;
            }
            let result = if foreground_group(&terminal).ok() == Some(other) { 0 } else { 9 };
            let _ = set_foreground_group(&terminal, leader_group);
            let _ = process::signal(other, Signal::SIGKILL);
            let _ = process::wait(WaitTarget::Pid(other), WaitFlags::empty());
            result
        });
        assert_eq!(state, ProcessState::Exited(0));
    }
}
