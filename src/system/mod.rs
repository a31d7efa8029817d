//! # System Interaction Layer
//!
//! Thin, typed wrappers over the POSIX calls a job-control shell is built from. Every primitive
//! returns `SysResult` and maps the OS error onto `SysError` without retrying; decisions about
//! EINTR and similar conditions belong to the caller.
//!
//! ## Modules
//!
//! - **`error`**: `SysError`, `ErrorKind` and the errno mapping shared by everything below.
//! - **`fd`**: opening files, pipes, descriptor duplication, raw reads and closes.
//! - **`process`**: fork, exec, wait and signal delivery, with decoded wait statuses.
//! - **`signals`**: signal dispositions as values (`Default`, `Ignore`, registered handlers).
//! - **`termios`**: terminal-mode snapshots and the scoped `RawModeGuard`.
//! - **`job_control`**: process groups and the terminal's foreground group.

pub mod error;
pub mod fd;
pub mod job_control;
pub mod process;
pub mod signals;
pub mod termios;
