// src/cli/handlers/commons.rs

use crate::core::session::{Job, JobControlSession, JobStatus, Placement};
use crate::core::word_splitter::{WordSplitter, split_unquoted};
use crate::system::error::SysError;
use crate::system::process::ProcessState;
use anyhow::Result;
use nix::sys::signal::Signal;
use std::io;
use thiserror::Error;

/// Outcomes a command reports to `main` instead of printing them, so the process exit status
/// can follow the job's.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("job interrupted")]
    Interrupted,
    #[error("job finished with status {0}")]
    Failed(i32),
    #[error("empty command in pipeline")]
    EmptyStage,
    #[error("'&' is only allowed at the end of a command line")]
    MisplacedBackground,
}

/// A command line split into stages, each already expanded into its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Vec<String>>,
    pub placement: Placement,
}

/// Splits `line` into `|`-separated stages and expands each one. A trailing unquoted `&` asks
/// for a background job. Returns `None` for a blank line.
pub fn parse_pipeline(line: &str, splitter: &WordSplitter<'_>) -> Result<Option<Pipeline>> {
    let (body, placement) = match split_unquoted(line, '&').as_slice() {
        [body] => (*body, Placement::Foreground),
        [body, tail] if tail.trim().is_empty() => (*body, Placement::Background),
        _ => return Err(CommandError::MisplacedBackground.into()),
    };
    if body.trim().is_empty() {
        return match placement {
            Placement::Foreground => Ok(None),
            Placement::Background => Err(CommandError::EmptyStage.into()),
        };
    }

    let mut stages = Vec::new();
    for part in split_unquoted(body, '|') {
        let words = splitter.expand(part).map_err(SysError::from)?;
        if words.is_empty() {
            return Err(CommandError::EmptyStage.into());
        }
        stages.push(words);
    }
    Ok(Some(Pipeline { stages, placement }))
}

/// Starts job control on standard input. Without a terminal there, jobs still run, just without
/// terminal hand-over.
pub fn open_session() -> Result<JobControlSession> {
    Ok(JobControlSession::init(io::stdin())?)
}

/// A short human-readable description of a job status.
pub fn describe_status(status: &JobStatus) -> String {
    match status {
        JobStatus::Running => t!("job.status.running").to_string(),
        JobStatus::Stopped(signal) => format!("{} ({})", t!("job.status.stopped"), signal),
        JobStatus::Completed(ProcessState::Exited(0)) => t!("job.status.done").to_string(),
        JobStatus::Completed(ProcessState::Exited(code)) => {
            format!("{} {}", t!("job.status.exit"), code)
        }
        JobStatus::Completed(ProcessState::Signaled(signal, core_dumped)) => {
            let core = if *core_dumped { t!("job.status.core_dumped") } else { "" };
            format!("{} ({}){}", t!("job.status.signaled"), signal, core)
        }
        JobStatus::Completed(state) => format!("{:?}", state),
    }
}

/// Maps the final status of a foreground job onto the command's result.
pub fn conclude(job: &Job, status: JobStatus) -> Result<()> {
    match status {
        JobStatus::Running | JobStatus::Completed(ProcessState::Exited(0)) => Ok(()),
        JobStatus::Completed(ProcessState::Exited(code)) => Err(CommandError::Failed(code).into()),
        JobStatus::Completed(ProcessState::Signaled(Signal::SIGINT, _)) => {
            Err(CommandError::Interrupted.into())
        }
        JobStatus::Completed(state) => {
            eprintln!("[{}] {}", job.pgid(), describe_status(&status));
            Err(CommandError::Failed(state.shell_status()).into())
        }
        JobStatus::Stopped(signal) => {
            eprintln!("[{}] {}", job.pgid(), describe_status(&status));
            Err(CommandError::Failed(ProcessState::Stopped(signal).shell_status()).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn splitter() -> WordSplitter<'static> {
        WordSplitter::new()
            .with_variables(|name| (name == "WHO").then(|| "world".to_string()))
            .with_home(Some(PathBuf::from("/home/user")))
            .pathname_expansion(false)
    }

    fn parse(line: &str) -> Result<Option<Pipeline>> {
        parse_pipeline(line, &splitter())
    }

    #[test]
    fn test_single_stage_in_foreground() {
        let pipeline = parse("echo hello $WHO").unwrap().unwrap();
        assert_eq!(pipeline.stages, vec![vec!["echo", "hello", "world"]]);
        assert_eq!(pipeline.placement, Placement::Foreground);
    }

    #[test]
    fn test_stages_and_background_marker() {
        let pipeline = parse("cat ~/notes | grep 'a|b' &").unwrap().unwrap();
        assert_eq!(
            pipeline.stages,
            vec![
                vec!["cat".to_string(), "/home/user/notes".to_string()],
                vec!["grep".to_string(), "a|b".to_string()],
            ]
        );
        assert_eq!(pipeline.placement, Placement::Background);
    }

    #[test]
    fn test_blank_line_is_nothing_to_run() {
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn test_malformed_pipelines() {
        let err = parse("a | | b").unwrap_err();
        assert_eq!(err.downcast_ref(), Some(&CommandError::EmptyStage));
        let err = parse("&").unwrap_err();
        assert_eq!(err.downcast_ref(), Some(&CommandError::EmptyStage));
        let err = parse("a && b").unwrap_err();
        assert_eq!(err.downcast_ref(), Some(&CommandError::MisplacedBackground));
        let err = parse("a & b").unwrap_err();
        assert_eq!(err.downcast_ref(), Some(&CommandError::MisplacedBackground));
    }

    #[test]
    fn test_expansion_errors_pass_through() {
        let err = parse("echo $MISSING").unwrap_err();
        let sys = err.downcast_ref::<SysError>().unwrap();
        assert_eq!(sys.kind(), crate::system::error::ErrorKind::Expansion);
        assert!(parse("echo > out").is_err());
    }

    #[test]
    fn test_describe_status() {
        assert_eq!(
            describe_status(&JobStatus::Completed(ProcessState::Exited(0))),
            t!("job.status.done")
        );
        assert!(
            describe_status(&JobStatus::Stopped(Signal::SIGTSTP)).contains("SIGTSTP")
        );
        assert!(
            describe_status(&JobStatus::Completed(ProcessState::Exited(2))).ends_with(" 2")
        );
        let quit = JobStatus::Completed(ProcessState::Signaled(Signal::SIGQUIT, true));
        assert!(describe_status(&quit).ends_with(t!("job.status.core_dumped")));
        let killed = JobStatus::Completed(ProcessState::Signaled(Signal::SIGKILL, false));
        assert!(!describe_status(&killed).contains(t!("job.status.core_dumped")));
    }
}
