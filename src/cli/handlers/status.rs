// src/cli/handlers/status.rs

use crate::{
    cli::args::StatusArgs,
    constants::STDIN_FILENO,
    core::paths,
    system::{fd, job_control, process},
};
use anyhow::Result;
use clap::Parser;
use colored::*;
use serde::Serialize;
use std::io;

/// Snapshot of the job-control state of this process.
#[derive(Serialize, Debug, PartialEq, Eq)]
struct StatusReport {
    pid: i32,
    pgid: i32,
    stdin_is_terminal: bool,
    foreground_pgid: Option<i32>,
    config_file: Option<String>,
}

/// The main handler for the `status` command.
pub fn handle(args: Vec<String>) -> Result<()> {
    let status_args = StatusArgs::try_parse_from(&args)?;
    let report = collect()?;

    if status_args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n--- {} ---", t!("status.header"));
    println!("  {:<18} {}", t!("status.label.pid").blue(), report.pid);
    println!("  {:<18} {}", t!("status.label.pgid").blue(), report.pgid);
    println!(
        "  {:<18} {}",
        t!("status.label.terminal").blue(),
        if report.stdin_is_terminal {
            t!("status.value.yes").green()
        } else {
            t!("status.value.no").yellow()
        }
    );
    if let Some(foreground) = report.foreground_pgid {
        let marker = if foreground == report.pgid {
            t!("status.value.this_group")
        } else {
            ""
        };
        println!(
            "  {:<18} {} {}",
            t!("status.label.foreground").blue(),
            foreground,
            marker.dimmed()
        );
    }
    match &report.config_file {
        Some(path) => println!("  {:<18} {}", t!("status.label.config").blue(), path),
        None => println!(
            "  {:<18} {}",
            t!("status.label.config").blue(),
            t!("status.value.unavailable").dimmed()
        ),
    }
    Ok(())
}

fn collect() -> Result<StatusReport> {
    let stdin_is_terminal = fd::is_terminal(STDIN_FILENO)?;
    // A terminal that is not our controlling one has no foreground group for us.
    let foreground_pgid = if stdin_is_terminal {
        match job_control::foreground_group(io::stdin()) {
            Ok(pgid) => Some(pgid.as_raw()),
            Err(e) => {
                log::debug!("No foreground group: {}", e);
                None
            }
        }
    } else {
        None
    };
    let config_file = match paths::get_config_file_path() {
        Ok(path) => Some(path.display().to_string()),
        Err(e) => {
            log::debug!("No configuration path: {}", e);
            None
        }
    };

    Ok(StatusReport {
        pid: process::current_pid().as_raw(),
        pgid: job_control::current_group().as_raw(),
        stdin_is_terminal,
        foreground_pgid,
        config_file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_describes_this_process() {
        let report = collect().unwrap();
        assert_eq!(report.pid, std::process::id() as i32);
        assert!(report.pgid > 0);
        if report.foreground_pgid.is_some() {
            assert!(report.stdin_is_terminal);
        }
    }

    #[test]
    fn test_report_serializes_every_field() {
        let report = StatusReport {
            pid: 10,
            pgid: 10,
            stdin_is_terminal: false,
            foreground_pgid: None,
            config_file: None,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["pid"], 10);
        assert!(value["foreground_pgid"].is_null());
        assert_eq!(value["stdin_is_terminal"], false);
    }
}
