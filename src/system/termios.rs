// src/system/termios.rs

//! Terminal mode capture and restore.
//!
//! A `TerminalModeSnapshot` is the only handle to a terminal's attribute block: it can be captured
//! and applied, nothing else. Raw-mode sections go through `RawModeGuard`, which puts the original
//! mode back on every exit path it can observe (explicit restore, early return, unwinding).

use crate::system::error::{OsContext, SysResult};
use nix::sys::termios::{
    self, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg, SpecialCharacterIndices,
    Termios,
};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};

/// When `apply` installs new attributes (the TCSA* timing constants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyTiming {
    /// Immediately (TCSANOW).
    Now,
    /// After pending output has been written (TCSADRAIN).
    Drain,
    /// After pending output is written, discarding unread input (TCSAFLUSH).
    Flush,
}

impl From<ApplyTiming> for SetArg {
    fn from(timing: ApplyTiming) -> Self {
        match timing {
            ApplyTiming::Now => Self::TCSANOW,
            ApplyTiming::Drain => Self::TCSADRAIN,
            ApplyTiming::Flush => Self::TCSAFLUSH,
        }
    }
}

impl TryFrom<i32> for ApplyTiming {
    type Error = crate::system::error::SysError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            nix::libc::TCSANOW => Ok(Self::Now),
            nix::libc::TCSADRAIN => Ok(Self::Drain),
            nix::libc::TCSAFLUSH => Ok(Self::Flush),
            _ => Err(crate::system::error::SysError::os(
                "tcsetattr",
                nix::errno::Errno::EINVAL,
            )),
        }
    }
}

/// Captured terminal attributes. Deliberately not `Clone`: a snapshot is taken for one raw-mode
/// section and given back once.
#[derive(Debug)]
pub struct TerminalModeSnapshot {
    attrs: Termios,
}

impl TerminalModeSnapshot {
    /// A copy of this snapshot with raw-mode input: no line buffering, no echo, no
    /// signal-generating keys, byte-at-a-time reads. Output processing is left alone so newlines
    /// still render.
    pub fn to_raw(&self) -> Self {
        let mut attrs = self.attrs.clone();
        attrs.input_flags.remove(
            InputFlags::BRKINT
                | InputFlags::ICRNL
                | InputFlags::INPCK
                | InputFlags::ISTRIP
                | InputFlags::IXON,
        );
        attrs.control_flags.insert(ControlFlags::CS8);
        attrs
            .local_flags
            .remove(LocalFlags::ECHO | LocalFlags::ICANON | LocalFlags::IEXTEN | LocalFlags::ISIG);
        for (index, value) in [
            (SpecialCharacterIndices::VMIN, 1),
            (SpecialCharacterIndices::VTIME, 0),
        ] {
            if let Some(slot) = attrs.control_chars.get_mut(index as usize) {
                *slot = value;
            }
        }
        Self { attrs }
    }

    pub fn local_flags(&self) -> LocalFlags {
        self.attrs.local_flags
    }

    pub fn input_flags(&self) -> InputFlags {
        self.attrs.input_flags
    }

    pub fn output_flags(&self) -> OutputFlags {
        self.attrs.output_flags
    }

    /// True when canonical input and echo are both off.
    pub fn is_raw(&self) -> bool {
        !self
            .attrs
            .local_flags
            .intersects(LocalFlags::ICANON | LocalFlags::ECHO)
    }

    /// Compares every attribute a terminal reports back: the four flag sets and the control
    /// characters.
    pub fn same_attributes(&self, other: &Self) -> bool {
        self.attrs.input_flags == other.attrs.input_flags
            && self.attrs.output_flags == other.attrs.output_flags
            && self.attrs.control_flags == other.attrs.control_flags
            && self.attrs.local_flags == other.attrs.local_flags
            && self.attrs.control_chars == other.attrs.control_chars
    }
}

/// Captures the current attributes of `descriptor`. Fails with `NotATerminal` for pipes, files
/// and the like.
pub fn capture<Fd: AsFd>(descriptor: Fd) -> SysResult<TerminalModeSnapshot> {
    let fd = descriptor.as_fd();
    let attrs = termios::tcgetattr(fd).tty_context("tcgetattr", fd.as_raw_fd())?;
    Ok(TerminalModeSnapshot { attrs })
}

pub fn apply<Fd: AsFd>(
    descriptor: Fd,
    snapshot: &TerminalModeSnapshot,
    when: ApplyTiming,
) -> SysResult<()> {
    let fd = descriptor.as_fd();
    termios::tcsetattr(fd, when.into(), &snapshot.attrs).tty_context("tcsetattr", fd.as_raw_fd())?;
    log::debug!(
        "tcsetattr(fd {}, {:?}) raw={}",
        fd.as_raw_fd(),
        when,
        snapshot.is_raw()
    );
    Ok(())
}

/// Scoped raw mode on one terminal.
///
/// `enter` captures the current mode before changing anything, so the original is always
/// available to put back. Dropping the guard restores it too, which covers `?` early returns and
/// panics; `restore` does the same but reports the error instead of logging it.
#[derive(Debug)]
pub struct RawModeGuard<'fd> {
    fd: BorrowedFd<'fd>,
    original: Option<TerminalModeSnapshot>,
}

impl<'fd> RawModeGuard<'fd> {
    pub fn enter(fd: BorrowedFd<'fd>) -> SysResult<Self> {
        let original = capture(fd)?;
        apply(fd, &original.to_raw(), ApplyTiming::Flush)?;
        Ok(Self {
            fd,
            original: Some(original),
        })
    }

    /// The mode that will be restored.
    pub fn original(&self) -> Option<&TerminalModeSnapshot> {
        self.original.as_ref()
    }

    pub fn restore(mut self) -> SysResult<()> {
        match self.original.take() {
            Some(original) => apply(self.fd, &original, ApplyTiming::Drain),
            None => Ok(()),
        }
    }
}

impl Drop for RawModeGuard<'_> {
    fn drop(&mut self) {
        if let Some(original) = self.original.take() {
            if let Err(e) = apply(self.fd, &original, ApplyTiming::Drain) {
                log::warn!("Failed to restore terminal mode: {}", e);
            }
        }
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use crate::system::error::ErrorKind;
    use crate::system::fd::create_pipe;
    use nix::pty::openpty;

    #[test]
    fn test_capture_rejects_pipes() {
        let pipe = create_pipe().unwrap();
        let err = capture(&pipe.read_end).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotATerminal);
    }

    #[test]
    fn test_capture_then_apply_same_snapshot_is_a_no_op() {
        let pty = openpty(None, None).unwrap();
        let before = capture(&pty.slave).unwrap();
        apply(&pty.slave, &before, ApplyTiming::Now).unwrap();
        let after = capture(&pty.slave).unwrap();
        assert!(before.same_attributes(&after));
    }

    #[test]
    fn test_raw_mode_guard_restores_on_drop() {
        let pty = openpty(None, None).unwrap();
        let before = capture(&pty.slave).unwrap();
        assert!(!before.is_raw());

        {
            let guard = RawModeGuard::enter(pty.slave.as_fd()).unwrap();
            assert!(capture(&pty.slave).unwrap().is_raw());
            assert!(guard.original().unwrap().same_attributes(&before));
        }

        let after = capture(&pty.slave).unwrap();
        assert!(before.same_attributes(&after));
    }

    #[test]
    fn test_raw_mode_guard_explicit_restore() {
        let pty = openpty(None, None).unwrap();
        let before = capture(&pty.slave).unwrap();
        let guard = RawModeGuard::enter(pty.slave.as_fd()).unwrap();
        guard.restore().unwrap();
        assert!(before.same_attributes(&capture(&pty.slave).unwrap()));
    }

    #[test]
    fn test_raw_copy_clears_echo_and_canonical_mode() {
        let pty = openpty(None, None).unwrap();
        let snapshot = capture(&pty.slave).unwrap();
        let raw = snapshot.to_raw();
        assert!(raw.is_raw());
        assert!(!raw.local_flags().contains(LocalFlags::ISIG));
        assert!(!raw.input_flags().contains(InputFlags::ICRNL));
        assert_eq!(raw.output_flags(), snapshot.output_flags());
    }

    #[test]
    fn test_apply_timing_from_raw_constants() {
        assert_eq!(
            ApplyTiming::try_from(crate::constants::TCSADRAIN).unwrap(),
            ApplyTiming::Drain
        );
        assert!(ApplyTiming::try_from(-1).is_err());
    }
}
