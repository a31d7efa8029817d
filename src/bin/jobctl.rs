// src/bin/jobctl.rs

use clap::Parser;
use colored::*;
use jobctl::cli::{Cli, dispatcher, handlers::commons::CommandError};

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    log::debug!("CLI args parsed: {:?}", cli);

    if let Err(e) = dispatcher::dispatch(cli.args) {
        // --- Centralized Error Handling ---
        // Job outcomes become the exit status without a message; the job already spoke for
        // itself on the terminal.
        match e.downcast_ref::<CommandError>() {
            Some(CommandError::Interrupted) => std::process::exit(130),
            Some(CommandError::Failed(code)) => std::process::exit(*code),
            _ => {}
        }

        eprintln!("\n{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}
