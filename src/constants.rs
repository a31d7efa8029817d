// src/constants.rs

use crate::system::signals::Disposition;
use nix::libc;

// --- OS constants ---
// Re-exported with the platform's own values so callers holding raw integers (history tools,
// scripts, FFI-adjacent code) can use the same names the C headers do.

pub const STDIN_FILENO: i32 = libc::STDIN_FILENO;
pub const STDOUT_FILENO: i32 = libc::STDOUT_FILENO;
pub const STDERR_FILENO: i32 = libc::STDERR_FILENO;

pub const SIGINT: i32 = libc::SIGINT;
pub const SIGCONT: i32 = libc::SIGCONT;
pub const SIGQUIT: i32 = libc::SIGQUIT;
pub const SIGTSTP: i32 = libc::SIGTSTP;
pub const SIGTTIN: i32 = libc::SIGTTIN;
pub const SIGTTOU: i32 = libc::SIGTTOU;
pub const SIGCHLD: i32 = libc::SIGCHLD;
pub const SIGTERM: i32 = libc::SIGTERM;

pub const O_RDONLY: i32 = libc::O_RDONLY;
pub const O_WRONLY: i32 = libc::O_WRONLY;
pub const O_RDWR: i32 = libc::O_RDWR;
pub const O_APPEND: i32 = libc::O_APPEND;
pub const O_CREAT: i32 = libc::O_CREAT;
pub const O_TRUNC: i32 = libc::O_TRUNC;

pub const S_IWUSR: libc::mode_t = libc::S_IWUSR;
pub const S_IRUSR: libc::mode_t = libc::S_IRUSR;
pub const S_IRGRP: libc::mode_t = libc::S_IRGRP;

pub const TCSANOW: i32 = libc::TCSANOW;
pub const TCSADRAIN: i32 = libc::TCSADRAIN;
pub const TCSAFLUSH: i32 = libc::TCSAFLUSH;

pub const WUNTRACED: i32 = libc::WUNTRACED;
pub const WNOHANG: i32 = libc::WNOHANG;

pub const ECHILD: i32 = libc::ECHILD;

/// The canonical "ignore" disposition.
pub const SIG_IGN: Disposition = Disposition::Ignore;
/// The canonical "default action" disposition.
pub const SIG_DFL: Disposition = Disposition::Default;

// --- Application constants ---

/// The name of the jobctl directory inside the system config directory.
pub const CONFIG_DIR_NAME: &str = "jobctl";

/// The name of the main configuration file (in ~/.config/jobctl/).
pub const CONFIG_FILENAME: &str = "config.toml";

/// Environment variable that points at an alternative configuration file.
pub const CONFIG_ENV_VAR: &str = "JOBCTL_CONFIG";

/// History file template used when the configuration does not name one.
pub const DEFAULT_HISTORY_FILE: &str = "~/.config/jobctl/history";

/// Prompt used when the configuration does not name one.
pub const DEFAULT_PROMPT: &str = "jobctl$ ";

/// Default number of entries kept in memory by the line editor.
pub const DEFAULT_MAX_HISTORY: usize = 100;

/// Prompt shown for continuation lines in multi-line mode.
pub const CONTINUATION_PROMPT: &str = "> ";

/// Upper bound on the number of words one expansion may produce.
pub const MAX_WORDS: usize = 4096;

/// Exit status of a child whose program could not be found.
pub const EXIT_NOT_FOUND: i32 = 127;

/// Exit status of a child whose program was found but could not be executed.
pub const EXIT_NOT_EXECUTABLE: i32 = 126;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_match_nix_values() {
        use nix::sys::signal::Signal;
        assert_eq!(SIGTSTP, Signal::SIGTSTP as i32);
        assert_eq!(SIGCHLD, Signal::SIGCHLD as i32);
        assert_eq!(WUNTRACED, nix::sys::wait::WaitPidFlag::WUNTRACED.bits());
        assert_eq!(ECHILD, nix::errno::Errno::ECHILD as i32);
        assert_eq!(STDIN_FILENO, 0);
    }

    #[test]
    fn test_canonical_dispositions() {
        assert_eq!(SIG_IGN, Disposition::Ignore);
        assert_eq!(SIG_DFL, Disposition::Default);
    }
}
