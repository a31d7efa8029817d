// src/cli/args.rs
use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Expands a line the way the shell would, without running it."
)]
pub struct ExpandArgs {
    /// Print the words as a JSON array instead of a shell-quoted line.
    #[arg(long)]
    pub json: bool,

    /// Leave glob patterns unexpanded.
    #[arg(long)]
    pub no_glob: bool,

    /// The line to expand. Several arguments are joined with spaces.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub line: Vec<String>,
}

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Runs a command line as one job in its own process group."
)]
pub struct RunArgs {
    /// Start the job without giving it the terminal, and return immediately.
    #[arg(long, short)]
    pub background: bool,

    /// Hand the line verbatim to the configured shell (`[jobs] default_shell`) instead of
    /// expanding it here.
    #[arg(long)]
    pub shell: bool,

    /// The command line. Stages are separated by unquoted `|`.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub line: Vec<String>,
}

#[derive(Parser, Debug, Default)]
#[command(no_binary_name = true, about = "Starts the interactive shell.")]
pub struct ReplArgs {
    /// Prompt to show instead of the configured one.
    #[arg(long)]
    pub prompt: Option<String>,

    /// Neither load nor save the history file.
    #[arg(long)]
    pub no_history: bool,
}

#[derive(Parser, Debug, Default)]
#[command(
    no_binary_name = true,
    about = "Shows the job-control state of this process and its terminal."
)]
pub struct StatusArgs {
    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_keep_hyphenated_words() {
        let args = RunArgs::try_parse_from(["-b", "--", "ls", "-l", "/tmp"]).unwrap();
        assert!(args.background);
        assert_eq!(args.line, vec!["ls", "-l", "/tmp"]);

        let args = RunArgs::try_parse_from(["grep", "-v", "x"]).unwrap();
        assert!(!args.background);
        assert_eq!(args.line, vec!["grep", "-v", "x"]);
    }

    #[test]
    fn test_expand_args_require_a_line() {
        assert!(ExpandArgs::try_parse_from(["--json"]).is_err());
        let args = ExpandArgs::try_parse_from(["--json", "a b"]).unwrap();
        assert!(args.json);
        assert_eq!(args.line, vec!["a b"]);
    }
}
