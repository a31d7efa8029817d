// src/system/error.rs

use crate::core::word_splitter::ExpansionError;
use nix::errno::Errno;
use std::io;
use std::os::fd::RawFd;
use thiserror::Error;

/// Result alias used by every primitive in this crate.
pub type SysResult<T> = Result<T, SysError>;

/// Coarse classification of a failure, so callers can branch without matching raw errno values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A signal interrupted a blocking call (EINTR). Retryable.
    Interrupted,
    /// No child matched a wait request (ECHILD).
    NoSuchChild,
    /// No process or group matched (ESRCH).
    NoSuchProcess,
    /// A path or program does not exist (ENOENT).
    NotFound,
    /// EACCES / EPERM.
    PermissionDenied,
    /// EEXIST.
    AlreadyExists,
    /// The kernel is out of processes, memory or descriptors.
    ResourceExhausted,
    /// A non-blocking operation had nothing to do (EAGAIN outside of fork).
    WouldBlock,
    /// A terminal-only operation ran on something else.
    NotATerminal,
    /// Malformed arguments (EINVAL, E2BIG, bad handler ids).
    InvalidInput,
    /// Word expansion rejected the input.
    Expansion,
    /// Line editor or history persistence I/O.
    EditorIo,
    /// Anything not listed above.
    Other,
}

/// Every failure a primitive in this crate can report. OS failures keep the raw errno so callers
/// can branch on specific conditions.
#[derive(Error, Debug)]
pub enum SysError {
    #[error("{op}: {message} (os error {code})")]
    Os {
        op: &'static str,
        code: i32,
        message: String,
    },
    #[error("{op}: descriptor {fd} is not a terminal")]
    NotATerminal { op: &'static str, fd: RawFd },
    #[error("wordexp: {0}")]
    Expansion(#[from] ExpansionError),
    #[error("line editor: could not {action} {target}: {source}")]
    EditorIo {
        action: &'static str,
        target: String,
        #[source]
        source: io::Error,
    },
}

impl SysError {
    /// Builds an OS failure from an errno value, keeping the code and the system's message.
    pub fn os(op: &'static str, errno: Errno) -> Self {
        Self::Os {
            op,
            code: errno as i32,
            message: errno.desc().to_string(),
        }
    }

    /// Converts a `std::io::Error` into an OS failure. Errors that carry no OS code
    /// (validation errors raised by the standard library itself) are reported as EINVAL.
    pub fn from_io(op: &'static str, err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => Self::os(op, Errno::from_raw(code)),
            None => Self::Os {
                op,
                code: Errno::EINVAL as i32,
                message: err.to_string(),
            },
        }
    }

    /// The numeric OS error code, when the failure came from a syscall.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Os { code, .. } => Some(*code),
            Self::NotATerminal { .. } => Some(Errno::ENOTTY as i32),
            Self::EditorIo { source, .. } => source.raw_os_error(),
            Self::Expansion(_) => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Os { op, code, .. } => classify(op, Errno::from_raw(*code)),
            Self::NotATerminal { .. } => ErrorKind::NotATerminal,
            Self::Expansion(_) => ErrorKind::Expansion,
            Self::EditorIo { .. } => ErrorKind::EditorIo,
        }
    }

    /// True for EINTR. Blocking primitives never retry on their own.
    pub fn is_interrupted(&self) -> bool {
        self.kind() == ErrorKind::Interrupted
    }
}

fn classify(op: &str, errno: Errno) -> ErrorKind {
    match errno {
        Errno::EINTR => ErrorKind::Interrupted,
        Errno::ECHILD => ErrorKind::NoSuchChild,
        Errno::ESRCH => ErrorKind::NoSuchProcess,
        Errno::ENOENT => ErrorKind::NotFound,
        Errno::EACCES | Errno::EPERM => ErrorKind::PermissionDenied,
        Errno::EEXIST => ErrorKind::AlreadyExists,
        // fork reports a full process table as EAGAIN.
        Errno::EAGAIN if op == "fork" => ErrorKind::ResourceExhausted,
        Errno::EAGAIN => ErrorKind::WouldBlock,
        Errno::ENOMEM | Errno::EMFILE | Errno::ENFILE => ErrorKind::ResourceExhausted,
        Errno::ENOTTY => ErrorKind::NotATerminal,
        Errno::EINVAL | Errno::E2BIG => ErrorKind::InvalidInput,
        _ => ErrorKind::Other,
    }
}

/// Attaches an operation name to a `nix` result.
pub(crate) trait OsContext<T> {
    fn os_context(self, op: &'static str) -> SysResult<T>;

    /// Like `os_context`, but ENOTTY becomes `SysError::NotATerminal` for `fd`.
    fn tty_context(self, op: &'static str, fd: RawFd) -> SysResult<T>;
}

impl<T> OsContext<T> for nix::Result<T> {
    fn os_context(self, op: &'static str) -> SysResult<T> {
        self.map_err(|errno| SysError::os(op, errno))
    }

    fn tty_context(self, op: &'static str, fd: RawFd) -> SysResult<T> {
        self.map_err(|errno| match errno {
            Errno::ENOTTY => SysError::NotATerminal { op, fd },
            other => SysError::os(op, other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_error_keeps_code_and_message() {
        let err = SysError::os("waitpid", Errno::ECHILD);
        assert_eq!(err.code(), Some(Errno::ECHILD as i32));
        assert_eq!(err.kind(), ErrorKind::NoSuchChild);
        let rendered = err.to_string();
        assert!(rendered.starts_with("waitpid: "));
        assert!(rendered.contains(&format!("os error {}", Errno::ECHILD as i32)));
    }

    #[test]
    fn test_eagain_depends_on_operation() {
        assert_eq!(
            SysError::os("fork", Errno::EAGAIN).kind(),
            ErrorKind::ResourceExhausted
        );
        assert_eq!(SysError::os("read", Errno::EAGAIN).kind(), ErrorKind::WouldBlock);
    }

    #[test]
    fn test_interrupted_is_distinct() {
        assert!(SysError::os("read", Errno::EINTR).is_interrupted());
        assert!(!SysError::os("read", Errno::EIO).is_interrupted());
    }

    #[test]
    fn test_tty_context_maps_enotty() {
        let result: nix::Result<()> = Err(Errno::ENOTTY);
        let err = result.tty_context("tcgetpgrp", 7).unwrap_err();
        assert!(matches!(err, SysError::NotATerminal { fd: 7, .. }));
        assert_eq!(err.code(), Some(Errno::ENOTTY as i32));
    }

    #[test]
    fn test_from_io_without_os_code_is_einval() {
        let io_err = io::Error::new(io::ErrorKind::InvalidInput, "bad options");
        let err = SysError::from_io("open", &io_err);
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
