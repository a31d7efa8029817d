// src/core/session.rs

//! # Job-control session
//!
//! Composes the primitives of `crate::system` into the cycle an interactive shell runs for every
//! command: launch a pipeline in its own process group, hand it the terminal, wait until it
//! finishes or stops, and take the terminal back with the shell's own modes restored.
//!
//! The session keeps no job table. A `Job` is a plain value owned by the caller, who decides
//! when to wait for it, resume it or forget it.

use crate::constants::{EXIT_NOT_EXECUTABLE, EXIT_NOT_FOUND, STDIN_FILENO, STDOUT_FILENO};
use crate::system::error::{ErrorKind, SysError, SysResult};
use crate::system::fd::{self, Pipe};
use crate::system::job_control::{
    create_group, current_group, foreground_group, join_group, set_foreground_group,
};
use crate::system::process::{
    self, Command, Forked, ProcessState, WaitFlags, WaitOutcome, WaitTarget, exit_child,
};
use crate::system::signals::{Disposition, set_disposition};
use crate::system::termios::{self, ApplyTiming, TerminalModeSnapshot};
use nix::errno::Errno;
use nix::sys::signal::{self as nix_signal, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::{self, Pid};
use std::io;
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};

/// Signals an interactive shell ignores and its jobs get back at their default disposition.
const JOB_CONTROL_SIGNALS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Foreground,
    Background,
}

/// How a job stands after a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Some member is still running or was resumed (only reported by `poll_job`).
    Running,
    /// The job was stopped by this signal and can be resumed with `continue_job`.
    Stopped(Signal),
    /// Every member has terminated; the state is the last stage's.
    Completed(ProcessState),
}

/// A launched pipeline: one process group, one process per stage.
#[derive(Debug)]
pub struct Job {
    pgid: Pid,
    pids: Vec<Pid>,
    running: Vec<Pid>,
    last_state: Option<ProcessState>,
    /// Set while the job is known to be stopped, until it is seen or made to continue.
    stopped: Option<Signal>,
    /// Terminal modes the job had when it last stopped in the foreground.
    modes: Option<TerminalModeSnapshot>,
}

impl Job {
    pub fn pgid(&self) -> Pid {
        self.pgid
    }

    /// Member pids, in stage order.
    pub fn pids(&self) -> &[Pid] {
        &self.pids
    }

    pub fn is_finished(&self) -> bool {
        self.running.is_empty()
    }

    fn record(&mut self, pid: Pid, state: ProcessState) {
        self.running.retain(|member| *member != pid);
        if self.pids.last() == Some(&pid) {
            self.last_state = Some(state);
        }
    }

    fn completed(&self) -> JobStatus {
        JobStatus::Completed(self.last_state.unwrap_or(ProcessState::Exited(0)))
    }
}

#[derive(Debug)]
pub struct JobControlSession {
    /// Private duplicate of the controlling terminal; `None` when job control is off.
    terminal: Option<OwnedFd>,
    shell_pgid: Pid,
    shell_modes: Option<TerminalModeSnapshot>,
}

impl JobControlSession {
    /// Prepares the calling process to act as a job-control shell on `terminal`.
    ///
    /// If `terminal` is not a terminal, job control is off: jobs still get their own process
    /// groups, but nothing touches the terminal or the shell's signal dispositions. Otherwise the
    /// call waits until the shell is in the foreground, ignores the job-control signals, puts the
    /// shell in its own group, takes the terminal and records the shell's terminal modes.
    pub fn init<Fd: AsFd>(terminal: Fd) -> SysResult<Self> {
        let terminal = terminal.as_fd();
        if !fd::is_terminal(terminal.as_raw_fd())? {
            log::debug!(
                "fd {} is not a terminal; job control is off",
                terminal.as_raw_fd()
            );
            return Ok(Self {
                terminal: None,
                shell_pgid: current_group(),
                shell_modes: None,
            });
        }
        let terminal = terminal
            .try_clone_to_owned()
            .map_err(|e| SysError::from_io("dup", &e))?;

        // A shell started in the background stops itself until it is brought forward.
        loop {
            let group = current_group();
            if foreground_group(&terminal)? == group {
                break;
            }
            log::debug!("Shell group {} is in the background; stopping", group);
            process::signal_group(group, Signal::SIGTTIN)?;
        }

        for signal in JOB_CONTROL_SIGNALS {
            set_disposition(signal, Disposition::Ignore)?;
        }

        let shell_pgid = match create_group(Pid::from_raw(0)) {
            Ok(pgid) => pgid,
            // A session leader already leads its group and may not move.
            Err(e) if e.kind() == ErrorKind::PermissionDenied => current_group(),
            Err(e) => return Err(e),
        };
        set_foreground_group(&terminal, shell_pgid)?;
        let shell_modes = termios::capture(&terminal)?;
        log::debug!("Job control on: shell group {}", shell_pgid);

        Ok(Self {
            terminal: Some(terminal),
            shell_pgid,
            shell_modes: Some(shell_modes),
        })
    }

    pub fn is_interactive(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn shell_group(&self) -> Pid {
        self.shell_pgid
    }

    /// Starts one process per stage, each stage's output piped into the next one's input, all in
    /// a new process group led by the first stage.
    ///
    /// Group membership is set by both the parent and the child before the child replaces its
    /// image. A foreground child also takes the terminal itself before restoring the default
    /// signal dispositions. If a later stage cannot be started, the stages already running are
    /// killed and reaped.
    pub fn launch(&self, stages: &[Vec<String>], placement: Placement) -> SysResult<Job> {
        if stages.is_empty() || stages.iter().any(Vec::is_empty) {
            return Err(SysError::os("launch", Errno::EINVAL));
        }

        let commands = stages
            .iter()
            .map(|stage| Command::new(stage.as_slice()))
            .collect::<SysResult<Vec<_>>>()?;

        let mut pids = Vec::with_capacity(commands.len());
        if let Err(e) = self.spawn_stages(&commands, placement, &mut pids) {
            abandon(&pids);
            return Err(e);
        }
        let pgid = pids
            .first()
            .copied()
            .ok_or_else(|| SysError::os("launch", Errno::EINVAL))?;
        log::debug!("Launched job {} ({:?}): {:?}", pgid, placement, pids);

        Ok(Job {
            pgid,
            running: pids.clone(),
            pids,
            last_state: None,
            stopped: None,
            modes: None,
        })
    }

    fn spawn_stages(
        &self,
        commands: &[Command],
        placement: Placement,
        pids: &mut Vec<Pid>,
    ) -> SysResult<()> {
        let mut upstream: Option<OwnedFd> = None;
        for (index, command) in commands.iter().enumerate() {
            let downstream = if index + 1 < commands.len() {
                Some(fd::create_pipe()?)
            } else {
                None
            };
            let group = pids.first().copied();

            match process::spawn()? {
                Forked::Child => {
                    self.run_stage(command, group, placement, upstream.as_ref(), downstream.as_ref())
                }
                Forked::Parent { child } => {
                    let group = group.unwrap_or(child);
                    match join_group(child, group) {
                        Ok(_) => {}
                        // The child got there first and has already replaced its image, or has
                        // already exited: either way its own setpgid ran.
                        Err(e)
                            if matches!(
                                e.kind(),
                                ErrorKind::PermissionDenied | ErrorKind::NoSuchProcess
                            ) => {}
                        Err(e) => log::warn!("Could not move {} into group {}: {}", child, group, e),
                    }
                    pids.push(child);
                    upstream = downstream.map(|pipe| {
                        drop(pipe.write_end);
                        pipe.read_end
                    });
                }
            }
        }
        Ok(())
    }

    /// Child side of `launch`. Never returns.
    ///
    /// Runs between fork and exec, so it only makes async-signal-safe calls straight to the OS:
    /// nothing here logs, allocates or takes a lock that another thread of the parent might have
    /// held at fork time.
    fn run_stage(
        &self,
        command: &Command,
        group: Option<Pid>,
        placement: Placement,
        input: Option<&OwnedFd>,
        output: Option<&Pipe>,
    ) -> ! {
        let group = group.unwrap_or_else(unistd::getpid);
        let _ = unistd::setpgid(Pid::from_raw(0), group);
        if placement == Placement::Foreground {
            if let Some(terminal) = &self.terminal {
                let _ = unistd::tcsetpgrp(terminal, group);
            }
        }
        restore_default_signals();

        if let Some(input) = input {
            if rewire(input.as_raw_fd(), STDIN_FILENO).is_err() {
                exit_child(EXIT_NOT_EXECUTABLE);
            }
        }
        if let Some(pipe) = output {
            let _ = unistd::close(pipe.read_end.as_raw_fd());
            if rewire(pipe.write_end.as_raw_fd(), STDOUT_FILENO).is_err() {
                exit_child(EXIT_NOT_EXECUTABLE);
            }
        }

        let errno = process::exec_prepared(command);
        let stderr = io::stderr();
        for piece in [
            b"jobctl: ".as_slice(),
            command.program(),
            b": ".as_slice(),
            errno.desc().as_bytes(),
            b"\n".as_slice(),
        ] {
            let _ = unistd::write(stderr.as_fd(), piece);
        }
        exit_child(if errno == Errno::ENOENT {
            EXIT_NOT_FOUND
        } else {
            EXIT_NOT_EXECUTABLE
        })
    }

    /// Gives the terminal to `job` and waits until every member has terminated or the job stops.
    /// The terminal and the shell's modes are taken back on every exit path, errors included.
    pub fn wait_foreground(&self, job: &mut Job) -> SysResult<JobStatus> {
        self.run_in_foreground(job, false)
    }

    /// Resumes a stopped job with SIGCONT. In the foreground this waits as `wait_foreground`
    /// does, with the job's own terminal modes reinstated first; in the background it returns
    /// `JobStatus::Running` right away.
    pub fn continue_job(&self, job: &mut Job, placement: Placement) -> SysResult<JobStatus> {
        match placement {
            Placement::Foreground => self.run_in_foreground(job, true),
            Placement::Background => {
                process::signal_group(job.pgid, Signal::SIGCONT)?;
                job.stopped = None;
                Ok(JobStatus::Running)
            }
        }
    }

    /// Collects state changes of a background job without blocking. A job stays `Stopped` across
    /// polls until it is continued, by `continue_job` or by a SIGCONT from elsewhere.
    pub fn poll_job(&self, job: &mut Job) -> SysResult<JobStatus> {
        let flags = WaitFlags::WNOHANG | WaitFlags::WUNTRACED | WaitFlags::WCONTINUED;
        self.wait_job(job, flags, false)
    }

    fn run_in_foreground(&self, job: &mut Job, resume: bool) -> SysResult<JobStatus> {
        if job.is_finished() {
            return Ok(job.completed());
        }
        let _reclaim = scopeguard::guard((), |()| self.reclaim_terminal());
        if let Some(terminal) = &self.terminal {
            set_foreground_group(terminal, job.pgid)?;
            if let Some(modes) = job.modes.take() {
                termios::apply(terminal, &modes, ApplyTiming::Drain)?;
            }
        }
        if resume {
            process::signal_group(job.pgid, Signal::SIGCONT)?;
            job.stopped = None;
        }
        self.wait_job(job, WaitFlags::WUNTRACED, true)
    }

    fn wait_job(&self, job: &mut Job, flags: WaitFlags, foreground: bool) -> SysResult<JobStatus> {
        loop {
            if job.is_finished() {
                return Ok(job.completed());
            }
            match next_event(job, flags) {
                Ok(WaitOutcome::Changed { state: ProcessState::Stopped(signal), pid }) => {
                    log::debug!("Job {} stopped by {} (pid {})", job.pgid, signal, pid);
                    job.stopped = Some(signal);
                    if foreground {
                        if let Some(terminal) = &self.terminal {
                            job.modes = termios::capture(terminal).ok();
                        }
                    }
                    return Ok(JobStatus::Stopped(signal));
                }
                Ok(WaitOutcome::Changed { state: ProcessState::Continued, pid }) => {
                    log::debug!("Job {} continued (pid {})", job.pgid, pid);
                    job.stopped = None;
                }
                Ok(WaitOutcome::Changed { state: ProcessState::Running, .. }) => {}
                Ok(WaitOutcome::Changed { pid, state }) => job.record(pid, state),
                Ok(WaitOutcome::NoChange) => {
                    return Ok(job.stopped.map_or(JobStatus::Running, JobStatus::Stopped));
                }
                // Waiting for our own job is not cancellable by a stray signal.
                Err(e) if e.is_interrupted() => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn reclaim_terminal(&self) {
        let Some(terminal) = &self.terminal else {
            return;
        };
        if let Err(e) = set_foreground_group(terminal, self.shell_pgid) {
            log::warn!("Could not take the terminal back: {}", e);
        }
        if let Some(modes) = &self.shell_modes {
            if let Err(e) = termios::apply(terminal, modes, ApplyTiming::Drain) {
                log::warn!("Could not restore the shell's terminal modes: {}", e);
            }
        }
    }
}

/// Waits on the job's group; members that never made it into the group are waited for by pid.
fn next_event(job: &mut Job, flags: WaitFlags) -> SysResult<WaitOutcome> {
    match process::wait(WaitTarget::Group(job.pgid), flags) {
        Err(e) if e.kind() == ErrorKind::NoSuchChild => {
            let Some(pid) = job.running.first().copied() else {
                return Err(e);
            };
            match process::wait(WaitTarget::Pid(pid), flags) {
                // Reaped by someone else.
                Err(e) if e.kind() == ErrorKind::NoSuchChild => {
                    job.running.retain(|member| *member != pid);
                    Ok(WaitOutcome::Changed {
                        pid,
                        state: ProcessState::Running,
                    })
                }
                other => other,
            }
        }
        other => other,
    }
}

/// Child-side default dispositions for the job-control signals, set with plain sigaction so the
/// handler registry is never consulted.
#[allow(unsafe_code)]
fn restore_default_signals() {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for signal in JOB_CONTROL_SIGNALS {
        // SAFETY: installing SIG_DFL runs no handler code; sigaction(2) is async-signal-safe.
        let _ = unsafe { nix_signal::sigaction(signal, &default) };
    }
}

/// Moves `source` onto `target` in a forked child.
fn rewire(source: RawFd, target: RawFd) -> nix::Result<()> {
    if source == target {
        return Ok(());
    }
    unistd::dup2(source, target)?;
    unistd::close(source)
}

/// Kills and reaps the stages of a launch that failed halfway.
fn abandon(pids: &[Pid]) {
    for pid in pids {
        let _ = process::signal(*pid, Signal::SIGKILL);
        let _ = process::wait(WaitTarget::Pid(*pid), WaitFlags::empty());
    }
    if !pids.is_empty() {
        log::warn!("Abandoned partially launched job {:?}", pids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::test_support::run_in_child;

    fn stage(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    /// A session without a terminal: job control off, groups still created.
    fn detached_session() -> JobControlSession {
        let pipe = fd::create_pipe().unwrap();
        let session = JobControlSession::init(&pipe.read_end).unwrap();
        assert!(!session.is_interactive());
        session
    }

    #[test]
    fn test_single_stage_exit_code() {
        let state = run_in_child(|| {
            let session = detached_session();
            let mut job = session
                .launch(&[stage(&["sh", "-c", "exit 3"])], Placement::Foreground)
                .unwrap();
            assert_eq!(job.pids().len(), 1);
            assert_eq!(job.pgid(), job.pids()[0]);
            let status = session.wait_foreground(&mut job).unwrap();
            assert_eq!(status, JobStatus::Completed(ProcessState::Exited(3)));
            assert!(job.is_finished());
            0
        });
        assert_eq!(state, ProcessState::Exited(0));
    }

    #[test]
    fn test_pipeline_stages_are_connected() {
        let state = run_in_child(|| {
            let session = detached_session();
            let mut job = session
                .launch(
                    &[
                        stage(&["sh", "-c", "echo one; echo two; echo three"]),
                        stage(&["sh", "-c", "exit $(wc -l)"]),
                    ],
                    Placement::Foreground,
                )
                .unwrap();
            // Reaching end-of-input in the last stage needs every write end closed.
            let status = session.wait_foreground(&mut job).unwrap();
            assert_eq!(status, JobStatus::Completed(ProcessState::Exited(3)));
            0
        });
        assert_eq!(state, ProcessState::Exited(0));
    }

    #[test]
    fn test_job_status_is_last_stage() {
        let state = run_in_child(|| {
            let session = detached_session();
            let mut job = session
                .launch(
                    &[stage(&["sh", "-c", "exit 5"]), stage(&["true"])],
                    Placement::Foreground,
                )
                .unwrap();
            let status = session.wait_foreground(&mut job).unwrap();
            assert_eq!(status, JobStatus::Completed(ProcessState::Exited(0)));
            0
        });
        assert_eq!(state, ProcessState::Exited(0));
    }

    #[test]
    fn test_missing_program_exits_127() {
        let state = run_in_child(|| {
            let session = detached_session();
            let mut job = session
                .launch(&[stage(&["jobctl-no-such-program"])], Placement::Foreground)
                .unwrap();
            let status = session.wait_foreground(&mut job).unwrap();
            assert_eq!(
                status,
                JobStatus::Completed(ProcessState::Exited(EXIT_NOT_FOUND))
            );
            0
        });
        assert_eq!(state, ProcessState::Exited(0));
    }

    #[test]
    fn test_empty_pipeline_is_rejected() {
        let session = detached_session();
        let err = session.launch(&[], Placement::Foreground).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = session
            .launch(&[stage(&["true"]), Vec::new()], Placement::Background)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_stopped_job_can_be_continued() {
        let state = run_in_child(|| {
            let session = detached_session();
            let mut job = session
                .launch(&[stage(&["sh", "-c", "kill -STOP $$; exit 4"])], Placement::Foreground)
                .unwrap();
            let status = session.wait_foreground(&mut job).unwrap();
            assert_eq!(status, JobStatus::Stopped(Signal::SIGSTOP));
            assert!(!job.is_finished());

            let status = session.continue_job(&mut job, Placement::Foreground).unwrap();
            assert_eq!(status, JobStatus::Completed(ProcessState::Exited(4)));
            0
        });
        assert_eq!(state, ProcessState::Exited(0));
    }

    #[test]
    fn test_background_job_is_polled() {
        let state = run_in_child(|| {
            let session = detached_session();
            let mut job = session
                .launch(&[stage(&["sleep", "30"])], Placement::Background)
                .unwrap();
            assert_eq!(session.poll_job(&mut job).unwrap(), JobStatus::Running);

            process::signal_group(job.pgid(), Signal::SIGKILL).unwrap();
            let status = session.wait_foreground(&mut job).unwrap();
            assert_eq!(
                status,
                JobStatus::Completed(ProcessState::Signaled(Signal::SIGKILL, false))
            );
            // Finished jobs report their final state again without waiting.
            assert_eq!(session.poll_job(&mut job).unwrap(), status);
            0
        });
        assert_eq!(state, ProcessState::Exited(0));
    }

    #[test]
    fn test_launch_rejects_interior_nul() {
        let session = detached_session();
        let err = session
            .launch(&[stage(&["echo", "a\0b"])], Placement::Background)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_poll_keeps_reporting_stopped_job_until_continued() {
        let state = run_in_child(|| {
            // --- Setup ---
            let session = detached_session();
            let mut job = session
                .launch(&[stage(&["sleep", "30"])], Placement::Background)
                .unwrap();

            process::signal_group(job.pgid(), Signal::SIGSTOP).unwrap();
            let mut status = JobStatus::Running;
            for _ in 0..200 {
                status = session.poll_job(&mut job).unwrap();
                if status != JobStatus::Running {
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
            assert_eq!(status, JobStatus::Stopped(Signal::SIGSTOP));
            // The stop was already collected; the job is still stopped.
            assert_eq!(
                session.poll_job(&mut job).unwrap(),
                JobStatus::Stopped(Signal::SIGSTOP)
            );

            // Resumed from outside the session.
            process::signal_group(job.pgid(), Signal::SIGCONT).unwrap();
            for _ in 0..200 {
                status = session.poll_job(&mut job).unwrap();
                if status == JobStatus::Running {
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
            assert_eq!(status, JobStatus::Running);

            process::signal_group(job.pgid(), Signal::SIGKILL).unwrap();
            let status = session.wait_foreground(&mut job).unwrap();
            assert_eq!(
                status,
                JobStatus::Completed(ProcessState::Signaled(Signal::SIGKILL, false))
            );
            0
        });
        assert_eq!(state, ProcessState::Exited(0));
    }

    #[test]
    fn test_stage_setup_does_not_touch_handler_registry() {
        use crate::system::signals::{HandlerId, with_registry_locked};

        let state = run_in_child(|| {
            // --- Setup ---
            let session = detached_session();
            set_disposition(Signal::SIGINT, Disposition::Custom(HandlerId::RECORD)).unwrap();

            // The stage is forked while the registry lock is held, so a child that consulted
            // the registry would block forever.
            let mut job = with_registry_locked(|| {
                session.launch(&[stage(&["sh", "-c", "exit 0"])], Placement::Foreground)
            })
            .unwrap();

            let mut status = JobStatus::Running;
            for _ in 0..500 {
                status = session.poll_job(&mut job).unwrap();
                if status != JobStatus::Running {
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
            if status == JobStatus::Running {
                let _ = process::signal_group(job.pgid(), Signal::SIGKILL);
                let _ = session.wait_foreground(&mut job);
                return 1;
            }
            assert_eq!(status, JobStatus::Completed(ProcessState::Exited(0)));
            0
        });
        assert_eq!(state, ProcessState::Exited(0));
    }

    /// Full cycle on a pseudo-terminal: the shell owns the terminal before and after a foreground
    /// job, and its modes survive the job changing them.
    #[cfg(target_os = "linux")]
    #[test]
    fn test_foreground_job_returns_terminal_to_shell() {
        use std::fs::OpenOptions;

        let pty = nix::pty::openpty(None, None).unwrap();
        let slave_path =
            std::fs::read_link(format!("/proc/self/fd/{}", pty.slave.as_raw_fd())).unwrap();

        let state = run_in_child(move || {
            unistd::setsid().unwrap();
            let terminal = OpenOptions::new()
                .read(true)
                .write(true)
                .open(&slave_path)
                .unwrap();

            let session = JobControlSession::init(&terminal).unwrap();
            assert!(session.is_interactive());
            assert_eq!(session.shell_group(), current_group());
            assert_eq!(foreground_group(&terminal).unwrap(), session.shell_group());
            let before = termios::capture(&terminal).unwrap();

            let mut job = session
                .launch(
                    &[stage(&["sh", "-c", "stty raw -echo </dev/tty 2>/dev/null; exit 0"])],
                    Placement::Foreground,
                )
                .unwrap();
            assert_ne!(job.pgid(), session.shell_group());
            let status = session.wait_foreground(&mut job).unwrap();
            assert_eq!(status, JobStatus::Completed(ProcessState::Exited(0)));

            assert_eq!(foreground_group(&terminal).unwrap(), session.shell_group());
            let after = termios::capture(&terminal).unwrap();
            assert!(before.same_attributes(&after));
            0
        });
        assert_eq!(state, ProcessState::Exited(0));
    }
}
