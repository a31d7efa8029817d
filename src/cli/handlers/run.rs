// src/cli/handlers/run.rs

use crate::{
    cli::{
        args::RunArgs,
        handlers::commons::{self, Pipeline},
    },
    core::{config_loader, session::Placement, word_splitter::WordSplitter},
    models::JobsConfig,
};
use anyhow::Result;
use clap::Parser;
use colored::*;

/// The main handler for the `run` command.
/// Launches the line as one job. A foreground job gets the terminal and its status becomes the
/// command's; a background job is left running and its process group is printed.
pub fn handle(args: Vec<String>) -> Result<()> {
    let run_args = RunArgs::try_parse_from(&args)?;
    let line = run_args.line.join(" ");

    let pipeline = if run_args.shell {
        let config = config_loader::load_config()?;
        shell_pipeline(&config.jobs, &line)
    } else {
        match commons::parse_pipeline(&line, &WordSplitter::new())? {
            Some(pipeline) => pipeline,
            None => return Ok(()),
        }
    };
    let placement = if run_args.background {
        Placement::Background
    } else {
        pipeline.placement
    };

    let session = commons::open_session()?;
    let mut job = session.launch(&pipeline.stages, placement)?;
    log::debug!(
        "Launched job {} with {} stage(s) in the {:?}",
        job.pgid(),
        job.pids().len(),
        placement
    );

    match placement {
        Placement::Background => {
            println!("[{}] {}", job.pgid().to_string().cyan(), t!("run.info.background"));
            Ok(())
        }
        Placement::Foreground => {
            let status = session.wait_foreground(&mut job)?;
            commons::conclude(&job, status)
        }
    }
}

/// A single stage handing `line` to the configured shell untouched.
fn shell_pipeline(jobs: &JobsConfig, line: &str) -> Pipeline {
    Pipeline {
        stages: vec![vec![
            jobs.default_shell.display().to_string(),
            "-c".to_string(),
            line.to_string(),
        ]],
        placement: Placement::Foreground,
    }
}
