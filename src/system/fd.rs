// src/system/fd.rs

//! Descriptor plumbing: opening files, pipes, redirection and raw reads.
//!
//! Descriptors handed out here are `OwnedFd`, so exactly one owner closes each of them. Nothing is
//! opened close-on-exec: a descriptor survives `spawn` and `replace_image` until someone closes it,
//! which is what pipeline wiring relies on.

use crate::system::error::{OsContext, SysError, SysResult};
use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::sys::stat::Mode;
use nix::unistd;
use std::os::fd::{AsFd, AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::path::Path;

/// Both ends of an anonymous pipe. Each end is closed independently, by dropping it or by `close`.
#[derive(Debug)]
pub struct Pipe {
    pub read_end: OwnedFd,
    pub write_end: OwnedFd,
}

/// Opens `path` with raw `open(2)` flags and creation mode.
#[allow(unsafe_code)]
pub fn open_file(path: &Path, flags: OFlag, mode: Mode) -> SysResult<OwnedFd> {
    let raw = fcntl::open(path, flags, mode).os_context("open")?;
    log::debug!("open('{}', {:?}) -> fd {}", path.display(), flags, raw);
    // SAFETY: `raw` was just returned by a successful open(2) and is not owned by anything else.
    Ok(unsafe { OwnedFd::from_raw_fd(raw) })
}

pub fn create_pipe() -> SysResult<Pipe> {
    let (read_end, write_end) = unistd::pipe().os_context("pipe")?;
    log::debug!(
        "pipe() -> read fd {}, write fd {}",
        read_end.as_raw_fd(),
        write_end.as_raw_fd()
    );
    Ok(Pipe {
        read_end,
        write_end,
    })
}

/// Makes `target` refer to the same open file as `source`, closing whatever `target` referred to.
///
/// This is how a child rewires its standard streams before replacing its image. The duplicate
/// does not carry close-on-exec, even if `source` does.
pub fn duplicate_onto<Fd: AsFd>(source: Fd, target: RawFd) -> SysResult<()> {
    let raw = source.as_fd().as_raw_fd();
    unistd::dup2(raw, target).os_context("dup2")?;
    log::debug!("dup2({raw}, {target})");
    Ok(())
}

/// Reads up to `buffer.len()` bytes. `Ok(0)` is end-of-stream.
///
/// A signal arriving mid-read yields an `Interrupted` error; the caller decides whether to retry.
pub fn read_into<Fd: AsFd>(descriptor: Fd, buffer: &mut [u8]) -> SysResult<usize> {
    unistd::read(descriptor.as_fd().as_raw_fd(), buffer).os_context("read")
}

/// Closes an owned descriptor and reports the result of `close(2)`, which dropping would swallow.
pub fn close(descriptor: OwnedFd) -> SysResult<()> {
    unistd::close(descriptor.into_raw_fd()).os_context("close")
}

/// Closes a descriptor by number, e.g. an inherited standard stream. Fails with EBADF if it is
/// not open.
pub fn close_raw(descriptor: RawFd) -> SysResult<()> {
    unistd::close(descriptor).os_context("close")
}

/// Reports whether `descriptor` refers to a terminal. Failures other than "not a terminal"
/// (for example a closed descriptor) are surfaced.
pub fn is_terminal(descriptor: RawFd) -> SysResult<bool> {
    unistd::isatty(descriptor).os_context("isatty")
}

/// Same as `open_file`, with the flags given as raw integers the way the exported constants are.
pub fn open_file_raw(path: &Path, flags: i32, mode: nix::libc::mode_t) -> SysResult<OwnedFd> {
    let invalid = || SysError::os("open", Errno::EINVAL);
    let flags = OFlag::from_bits(flags).ok_or_else(invalid)?;
    let mode = Mode::from_bits(mode).ok_or_else(invalid)?;
    open_file(path, flags, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::error::ErrorKind;
    use crate::system::test_support::fork_lock;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_pipe_round_trip_then_end_of_stream() {
        // A child forked meanwhile would inherit the write end and hold off end-of-stream.
        let _lock = fork_lock();
        let Pipe {
            read_end,
            write_end,
        } = create_pipe().unwrap();

        let mut writer = File::from(write_end);
        writer.write_all(b"first ").unwrap();
        writer.write_all(b"second").unwrap();
        drop(writer);

        let mut collected = Vec::new();
        let mut buffer = [0u8; 4];
        loop {
            let count = read_into(&read_end, &mut buffer).unwrap();
            if count == 0 {
                break;
            }
            collected.extend_from_slice(&buffer[..count]);
        }
        assert_eq!(collected, b"first second");

        // Drained and closed: still end-of-stream, not an error.
        assert_eq!(read_into(&read_end, &mut buffer).unwrap(), 0);
        close(read_end).unwrap();
    }

    #[test]
    fn test_open_file_missing_path_is_not_found() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        let err = open_file(&missing, OFlag::O_RDONLY, Mode::empty()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_open_file_exclusive_create_reports_already_exists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_EXCL;
        let mode = Mode::S_IRUSR | Mode::S_IWUSR;

        let fd = open_file(&path, flags, mode).unwrap();
        close(fd).unwrap();

        let err = open_file(&path, flags, mode).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_open_write_then_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.txt");
        let fd = open_file(
            &path,
            OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .unwrap();
        File::from(fd).write_all(b"hello").unwrap();

        let fd = open_file(&path, OFlag::O_RDONLY, Mode::empty()).unwrap();
        let mut buffer = [0u8; 16];
        let count = read_into(&fd, &mut buffer).unwrap();
        assert_eq!(&buffer[..count], b"hello");
    }

    #[test]
    fn test_open_file_raw_uses_exported_constants() {
        use crate::constants::{O_CREAT, O_RDWR, S_IRUSR, S_IWUSR};
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.txt");
        let fd = open_file_raw(&path, O_RDWR | O_CREAT, S_IRUSR | S_IWUSR).unwrap();
        close(fd).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_duplicate_onto_redirects_target() {
        let _lock = fork_lock();
        let dir = tempdir().unwrap();
        let path = dir.path().join("dup.txt");
        let file_fd = open_file(
            &path,
            OFlag::O_WRONLY | OFlag::O_CREAT,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .unwrap();
        let Pipe {
            read_end,
            write_end,
        } = create_pipe().unwrap();

        // Point the pipe's write end at the file; writes now land in the file.
        let target = write_end.as_raw_fd();
        duplicate_onto(&file_fd, target).unwrap();
        let mut redirected = File::from(write_end);
        redirected.write_all(b"redirected").unwrap();
        drop(redirected);
        drop(file_fd);

        assert_eq!(std::fs::read(&path).unwrap(), b"redirected");
        // The pipe lost its only writer when the target was rewired.
        let mut buffer = [0u8; 8];
        assert_eq!(read_into(&read_end, &mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_close_raw_on_unused_descriptor_fails() {
        let err = close_raw(1_000_000).unwrap_err();
        assert_eq!(err.code(), Some(Errno::EBADF as i32));
    }

    #[test]
    fn test_pipe_is_not_a_terminal() {
        let pipe = create_pipe().unwrap();
        assert!(!is_terminal(pipe.read_end.as_raw_fd()).unwrap());
    }
}
