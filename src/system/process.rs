// src/system/process.rs

//! Process creation, image replacement, waiting and signal delivery.
//!
//! Between `spawn` returning `Forked::Child` and `exec_prepared`/`exit_child`, the child is a copy
//! of a possibly multithreaded parent: only async-signal-safe work belongs there. No logging, no
//! allocation and no locks on the child side. Build the argument vector with `Command::new` before
//! forking; `replace_image` allocates and is only for callers that have not forked.

use crate::system::error::{OsContext, SysError, SysResult};
use nix::errno::Errno;
use nix::sys::signal::{self as nix_signal, Signal};
use nix::sys::wait::{self, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};
use std::convert::Infallible;
use std::ffi::CString;

/// Wait-call modifiers: `WNOHANG` for polling, `WUNTRACED` to report stopped children.
pub use nix::sys::wait::WaitPidFlag as WaitFlags;

/// Which side of a `spawn` the caller is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forked {
    Parent { child: Pid },
    Child,
}

/// Decoded wait status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Alive with nothing to report.
    Running,
    /// Resumed by SIGCONT. Only reported to waits that ask for `WCONTINUED`.
    Continued,
    Stopped(Signal),
    Exited(i32),
    /// Terminated by a signal; the flag is set when a core image was written.
    Signaled(Signal, bool),
}

impl ProcessState {
    /// Decodes a raw status word as filled in by `waitpid(2)`.
    pub fn from_raw_status(pid: Pid, raw: i32) -> SysResult<Self> {
        let status = WaitStatus::from_raw(pid, raw).os_context("wait status")?;
        Ok(decode(status))
    }

    pub fn exited(&self) -> bool {
        matches!(self, Self::Exited(_))
    }

    pub fn signaled(&self) -> bool {
        matches!(self, Self::Signaled(..))
    }

    pub fn core_dumped(&self) -> bool {
        matches!(self, Self::Signaled(_, true))
    }

    pub fn continued(&self) -> bool {
        matches!(self, Self::Continued)
    }

    pub fn stopped(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(*code),
            _ => None,
        }
    }

    /// The conventional shell status: the exit code, or 128 plus the signal number.
    pub fn shell_status(&self) -> i32 {
        match self {
            Self::Exited(code) => *code,
            Self::Signaled(signal, _) | Self::Stopped(signal) => 128 + *signal as i32,
            Self::Running | Self::Continued => 0,
        }
    }
}

fn decode(status: WaitStatus) -> ProcessState {
    match status {
        WaitStatus::Exited(_, code) => ProcessState::Exited(code),
        WaitStatus::Signaled(_, signal, core) => ProcessState::Signaled(signal, core),
        WaitStatus::Stopped(_, signal) => ProcessState::Stopped(signal),
        WaitStatus::Continued(_) => ProcessState::Continued,
        WaitStatus::StillAlive => ProcessState::Running,
        // ptrace stops
        _ => ProcessState::Stopped(Signal::SIGTRAP),
    }
}

/// Which children a `wait` is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    Pid(Pid),
    /// Any child whose process group is this one.
    Group(Pid),
    Any,
}

impl WaitTarget {
    fn as_pid(self) -> Pid {
        match self {
            Self::Pid(pid) => pid,
            Self::Group(pgid) => Pid::from_raw(-pgid.as_raw()),
            Self::Any => Pid::from_raw(-1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Changed { pid: Pid, state: ProcessState },
    /// A `WNOHANG` wait found children, none of which had changed state.
    NoChange,
}

pub fn current_pid() -> Pid {
    unistd::getpid()
}

/// Duplicates the calling process.
///
/// The parent learns the child's pid before this returns; the child may not have run yet. The
/// child must restrict itself to async-signal-safe work (descriptor rewiring, `setpgid`, signal
/// dispositions) before calling `exec_prepared` or `exit_child`.
#[allow(unsafe_code)]
pub fn spawn() -> SysResult<Forked> {
    // SAFETY: fork is sound as long as the child sticks to async-signal-safe calls until it
    // execs or exits, which is the documented contract of this function.
    match unsafe { unistd::fork() }.os_context("fork")? {
        ForkResult::Parent { child } => {
            log::debug!("fork() -> child {}", child);
            Ok(Forked::Parent { child })
        }
        ForkResult::Child => Ok(Forked::Child),
    }
}

/// Replaces the current program image, searching `PATH` when `program` has no slash.
///
/// Never returns on success. On failure the process is untouched; inside a freshly spawned child
/// the only sensible continuation is `exit_child`.
pub fn replace_image<S: AsRef<str>>(program: &str, args: &[S]) -> SysResult<Infallible> {
    if args.is_empty() {
        return Err(SysError::os("execvp", Errno::EINVAL));
    }
    let program = to_c_string(program)?;
    let argv = args
        .iter()
        .map(|arg| to_c_string(arg.as_ref()))
        .collect::<SysResult<Vec<_>>>()?;
    unistd::execvp(&program, &argv).os_context("execvp")
}

/// A program and its argument vector, converted to C strings ahead of a fork.
#[derive(Debug, Clone)]
pub struct Command {
    program: CString,
    argv: Vec<CString>,
}

impl Command {
    /// `args[0]` names the program, which is looked up on `PATH` when it has no slash.
    pub fn new<S: AsRef<str>>(args: &[S]) -> SysResult<Self> {
        let argv = args
            .iter()
            .map(|arg| to_c_string(arg.as_ref()))
            .collect::<SysResult<Vec<_>>>()?;
        let program = argv
            .first()
            .cloned()
            .ok_or_else(|| SysError::os("execvp", Errno::EINVAL))?;
        Ok(Self { program, argv })
    }

    pub fn program(&self) -> &[u8] {
        self.program.as_bytes()
    }
}

/// Replaces the current program image with a prepared command. Allocation-free, so it is safe in
/// a forked child. Returns only on failure, with the reason.
pub fn exec_prepared(command: &Command) -> Errno {
    match unistd::execvp(&command.program, &command.argv) {
        Err(errno) => errno,
        Ok(never) => match never {},
    }
}

fn to_c_string(value: &str) -> SysResult<CString> {
    CString::new(value).map_err(|_| SysError::os("execvp", Errno::EINVAL))
}

/// Terminates the calling process immediately, skipping atexit handlers and buffered stdio that a
/// forked child shares with its parent.
#[allow(unsafe_code)]
pub fn exit_child(code: i32) -> ! {
    // SAFETY: _exit(2) is async-signal-safe, takes no pointers and never returns.
    unsafe { nix::libc::_exit(code) }
}

/// Waits for a state change in the children selected by `target`.
///
/// With `WaitFlags::WNOHANG` a running child yields `WaitOutcome::NoChange`. EINTR comes back as an
/// `Interrupted` error and ECHILD as `NoSuchChild`; neither is retried here.
pub fn wait(target: WaitTarget, flags: WaitFlags) -> SysResult<WaitOutcome> {
    let status = wait::waitpid(target.as_pid(), Some(flags)).os_context("waitpid")?;
    let outcome = match status.pid() {
        Some(pid) if status != WaitStatus::StillAlive => WaitOutcome::Changed {
            pid,
            state: decode(status),
        },
        _ => WaitOutcome::NoChange,
    };
    log::debug!("waitpid({:?}, {:?}) -> {:?}", target, flags, outcome);
    Ok(outcome)
}

/// Sends `signal` to `pid`. A negative pid addresses the process group `-pid`, as with `kill(2)`.
pub fn signal(pid: Pid, signal: Signal) -> SysResult<()> {
    nix_signal::kill(pid, signal).os_context("kill")?;
    log::debug!("kill({}, {})", pid, signal);
    Ok(())
}

/// Sends `signal` to every member of the process group `pgid`.
pub fn signal_group(pgid: Pid, signal: Signal) -> SysResult<()> {
    nix_signal::killpg(pgid, signal).os_context("killpg")?;
    log::debug!("killpg({}, {})", pgid, signal);
    Ok(())
}
