//! # jobctl
//!
//! Job-control and process I/O primitives for building interactive POSIX shells: descriptors
//! and pipes, process creation and waiting, process groups and the terminal foreground, terminal
//! modes, signal dispositions, shell-style word expansion and a line editor with history.
//!
//! The primitives live in [`system`]; [`core`] composes them into a job-control session, the
//! word splitter and the line editor; [`cli`] is the `jobctl` command built on top.

include!(concat!(env!("OUT_DIR"), "/translations.rs"));

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;
