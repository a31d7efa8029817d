// src/cli/handlers/repl.rs

use crate::{
    cli::{
        args::ReplArgs,
        handlers::commons::{self, CommandError},
    },
    core::{
        config_loader,
        line_editor::LineEditor,
        session::{Job, JobControlSession, JobStatus, Placement},
        word_splitter::WordSplitter,
    },
    system::process,
};
use anyhow::{Result, anyhow};
use clap::Parser;
use colored::*;
use nix::errno::Errno;
use nix::sys::signal::Signal;
use std::env;
use std::path::PathBuf;

/// What the loop does after a line has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit(i32),
}

/// A job the shell still tracks: stopped, or running in the background.
#[derive(Debug)]
struct Entry {
    id: usize,
    command: String,
    job: Job,
    status: JobStatus,
}

#[derive(Debug, Default)]
struct JobTable {
    entries: Vec<Entry>,
}

impl JobTable {
    fn insert(&mut self, command: &str, job: Job, status: JobStatus) -> usize {
        let id = self.entries.last().map_or(1, |entry| entry.id + 1);
        self.entries.push(Entry {
            id,
            command: command.to_string(),
            job,
            status,
        });
        id
    }

    /// Finds the job named by `spec` (`%2` or `2`), or the most recent one.
    fn position(&self, spec: Option<&str>) -> Result<usize> {
        let position = match spec {
            None => self.entries.len().checked_sub(1),
            Some(spec) => {
                let id = parse_job_spec(spec)?;
                self.entries.iter().position(|entry| entry.id == id)
            }
        };
        position.ok_or_else(|| anyhow!("{}", t!("repl.error.no_such_job")))
    }
}

struct Shell {
    session: JobControlSession,
    jobs: JobTable,
    last_status: i32,
}

/// The main handler for the `repl` command.
/// Reads command lines until end of input or `exit`, running each one as a job.
pub fn handle(args: Vec<String>) -> Result<()> {
    let repl_args = ReplArgs::try_parse_from(&args)?;
    let config = config_loader::load_config()?;
    let prompt = repl_args
        .prompt
        .unwrap_or_else(|| config.editor.prompt.clone());

    let mut editor = LineEditor::new();
    editor.set_max_history(config.editor.max_history)?;
    editor.set_multi_line(config.editor.multi_line);

    let history_file = if repl_args.no_history {
        None
    } else {
        Some(config_loader::history_path(&config.editor)?)
    };
    if let Some(path) = &history_file {
        match editor.load_history(path) {
            Ok(count) => log::debug!("Loaded {} history entries from '{}'", count, path.display()),
            Err(e) if e.code() == Some(Errno::ENOENT as i32) => {
                log::debug!("No history file at '{}' yet", path.display());
            }
            Err(e) => log::warn!("{}", e),
        }
    }

    let mut shell = Shell {
        session: commons::open_session()?,
        jobs: JobTable::default(),
        last_status: 0,
    };
    if !shell.session.is_interactive() {
        log::debug!("Standard input is not a terminal; job control is off");
    }

    let exit_code = loop {
        shell.report_changes();
        let line = match editor.read_line(&prompt) {
            Ok(Some(line)) => line,
            Ok(None) => break shell.last_status,
            Err(e) if e.is_interrupted() => continue,
            Err(e) => return Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }
        editor.add_history(&line);

        match shell.execute(&line, &mut editor) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit(code)) => break code,
            Err(e) => {
                shell.last_status = 1;
                eprintln!("{}: {}", "Error".red().bold(), e);
            }
        }
    };

    shell.hang_up_stopped();
    if let Some(path) = &history_file {
        if let Err(e) = editor.save_history(path) {
            log::warn!("{}", e);
        }
    }

    match exit_code {
        0 => Ok(()),
        code => Err(CommandError::Failed(code).into()),
    }
}

impl Shell {
    fn execute(&mut self, line: &str, editor: &mut LineEditor) -> Result<Flow> {
        let Some(pipeline) = commons::parse_pipeline(line, &WordSplitter::new())? else {
            return Ok(Flow::Continue);
        };

        if let [stage] = pipeline.stages.as_slice() {
            if let Some((name, rest)) = stage.split_first() {
                if let Some(flow) = self.builtin(name, rest, editor)? {
                    return Ok(flow);
                }
            }
        }

        let job = self.session.launch(&pipeline.stages, pipeline.placement)?;
        match pipeline.placement {
            Placement::Background => {
                let pgid = job.pgid();
                let id = self.jobs.insert(line, job, JobStatus::Running);
                println!("[{}] {}", id, pgid);
                self.last_status = 0;
            }
            Placement::Foreground => self.wait_foreground(line.to_string(), job)?,
        }
        Ok(Flow::Continue)
    }

    /// Runs `name` if it is a builtin. `None` means it is not one.
    fn builtin(
        &mut self,
        name: &str,
        args: &[String],
        editor: &mut LineEditor,
    ) -> Result<Option<Flow>> {
        let flow = match name {
            "exit" => {
                let code = match args.first() {
                    Some(code) => parse_exit_code(code)?,
                    None => self.last_status,
                };
                return Ok(Some(Flow::Exit(code)));
            }
            "cd" => {
                let target = match args.first() {
                    Some(dir) => PathBuf::from(dir),
                    None => dirs::home_dir().ok_or_else(|| anyhow!("{}", t!("repl.error.no_home")))?,
                };
                env::set_current_dir(&target)
                    .map_err(|e| anyhow!("cd: {}: {}", target.display(), e))?;
                Flow::Continue
            }
            "clear" => {
                editor.clear_screen()?;
                Flow::Continue
            }
            "history" => {
                for (number, entry) in editor.history().iter().enumerate() {
                    println!("{:>5}  {}", number + 1, entry);
                }
                Flow::Continue
            }
            "jobs" => {
                self.report_changes();
                for entry in &self.jobs.entries {
                    println!(
                        "[{}] {:<24} {}",
                        entry.id,
                        commons::describe_status(&entry.status),
                        entry.command
                    );
                }
                Flow::Continue
            }
            "fg" => {
                let index = self.jobs.position(args.first().map(String::as_str))?;
                // The entry stays in the table until the job has been resumed.
                let entry = self
                    .jobs
                    .entries
                    .get_mut(index)
                    .ok_or_else(|| anyhow!("{}", t!("repl.error.no_such_job")))?;
                println!("{}", entry.command);
                let status = self
                    .session
                    .continue_job(&mut entry.job, Placement::Foreground)?;
                self.settle(index, status);
                return Ok(Some(Flow::Continue));
            }
            "bg" => {
                let index = self.jobs.position(args.first().map(String::as_str))?;
                let entry = self
                    .jobs
                    .entries
                    .get_mut(index)
                    .ok_or_else(|| anyhow!("{}", t!("repl.error.no_such_job")))?;
                entry.status = self
                    .session
                    .continue_job(&mut entry.job, Placement::Background)?;
                println!("[{}] {} &", entry.id, entry.command);
                Flow::Continue
            }
            _ => return Ok(None),
        };
        self.last_status = 0;
        Ok(Some(flow))
    }

    fn wait_foreground(&mut self, command: String, mut job: Job) -> Result<()> {
        let status = self.session.wait_foreground(&mut job)?;
        self.conclude(command, job, status);
        Ok(())
    }

    /// Records how a foreground job ended. Stopped jobs go to the job table.
    fn conclude(&mut self, command: String, job: Job, status: JobStatus) {
        match status {
            JobStatus::Completed(state) => {
                self.last_status = state.shell_status();
                if state.signaled() {
                    println!("{}", commons::describe_status(&status));
                }
            }
            JobStatus::Stopped(signal) => {
                self.last_status = process::ProcessState::Stopped(signal).shell_status();
                let id = self.jobs.insert(&command, job, status);
                println!("\n[{}] {:<24} {}", id, commons::describe_status(&status), command);
            }
            JobStatus::Running => {
                self.jobs.insert(&command, job, status);
            }
        }
    }

    /// Records how a job brought back to the foreground ended, keeping its job number if it
    /// stopped again.
    fn settle(&mut self, index: usize, status: JobStatus) {
        match status {
            JobStatus::Stopped(signal) => {
                self.last_status = process::ProcessState::Stopped(signal).shell_status();
                if let Some(entry) = self.jobs.entries.get_mut(index) {
                    entry.status = status;
                    println!(
                        "\n[{}] {:<24} {}",
                        entry.id,
                        commons::describe_status(&status),
                        entry.command
                    );
                }
            }
            JobStatus::Running => {
                if let Some(entry) = self.jobs.entries.get_mut(index) {
                    entry.status = status;
                }
            }
            JobStatus::Completed(_) => {
                let entry = self.jobs.entries.remove(index);
                self.conclude(entry.command, entry.job, status);
            }
        }
    }

    /// Polls tracked jobs, prints the ones whose state changed and forgets finished ones.
    fn report_changes(&mut self) {
        let session = &self.session;
        let mut changed = Vec::new();
        for entry in &mut self.jobs.entries {
            if matches!(entry.status, JobStatus::Completed(_)) {
                continue;
            }
            match session.poll_job(&mut entry.job) {
                Ok(status) if status == entry.status => {}
                Ok(status) => {
                    entry.status = status;
                    changed.push(entry.id);
                }
                Err(e) => log::warn!("[{}] {}", entry.id, e),
            }
        }
        for entry in &self.jobs.entries {
            if changed.contains(&entry.id) {
                println!(
                    "[{}] {:<24} {}",
                    entry.id,
                    commons::describe_status(&entry.status),
                    entry.command
                );
            }
        }
        self.jobs
            .entries
            .retain(|entry| !matches!(entry.status, JobStatus::Completed(_)));
    }

    /// Stopped jobs would never run again once the shell is gone.
    fn hang_up_stopped(&self) {
        for entry in &self.jobs.entries {
            if let JobStatus::Stopped(_) = entry.status {
                for signal in [Signal::SIGHUP, Signal::SIGCONT] {
                    if let Err(e) = process::signal_group(entry.job.pgid(), signal) {
                        log::debug!("Could not signal job {}: {}", entry.id, e);
                    }
                }
            }
        }
    }
}

fn parse_job_spec(spec: &str) -> Result<usize> {
    spec.strip_prefix('%')
        .unwrap_or(spec)
        .parse()
        .map_err(|_| anyhow!("{} '{}'", t!("repl.error.bad_job_spec"), spec))
}

fn parse_exit_code(code: &str) -> Result<i32> {
    code.parse::<i32>()
        .map(|code| code & 0xff)
        .map_err(|_| anyhow!("{} '{}'", t!("repl.error.bad_exit_code"), code))
}
