// src/cli/handlers/expand.rs

use crate::{cli::args::ExpandArgs, core::word_splitter::WordSplitter, system::error::SysError};
use anyhow::{Context, Result};
use clap::Parser;

/// The main handler for the `expand` command.
/// Prints the words a line expands to, without running anything.
pub fn handle(args: Vec<String>) -> Result<()> {
    let expand_args = ExpandArgs::try_parse_from(&args)?;
    let line = expand_args.line.join(" ");

    let words = WordSplitter::new()
        .pathname_expansion(!expand_args.no_glob)
        .expand(&line)
        .map_err(SysError::from)?;
    log::debug!("'{}' expanded to {} word(s)", line, words.len());

    println!("{}", render(&words, expand_args.json)?);
    Ok(())
}

fn render(words: &[String], json: bool) -> Result<String> {
    if json {
        return serde_json::to_string_pretty(words).context(t!("error.expand.json"));
    }
    shlex::try_join(words.iter().map(String::as_str)).context(t!("error.expand.quote"))
}
