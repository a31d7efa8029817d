// src/cli/handlers/mod.rs

// One module per CLI command, plus the helpers they share.

pub mod commons;
pub mod expand;
pub mod repl;
pub mod run;
pub mod status;
