// src/cli/mod.rs

use clap::Parser;

pub mod args;
pub mod dispatcher;
pub mod handlers;

/// Styles for the tags the help template uses, as ANSI sequences.
const HELP_STYLES: [(&str, &str); 5] = [
    ("title", "\x1b[1;33m"),
    ("hl", "\x1b[1;36m"),
    ("cmd", "\x1b[36m"),
    ("group", "\x1b[1;32m"),
    ("dim", "\x1b[2m"),
];
const RESET: &str = "\x1b[0m";

/// Replaces `<tag>`/`</tag>` pairs in `template` with their styles, or strips them.
fn render_help(template: &str, colors: bool) -> String {
    HELP_STYLES
        .iter()
        .fold(template.to_string(), |text, (tag, style)| {
            let (open, close) = if colors { (*style, RESET) } else { ("", "") };
            text.replace(&format!("<{tag}>"), open)
                .replace(&format!("</{tag}>"), close)
        })
}

fn build_help_string() -> &'static str {
    let colors = colored::control::SHOULD_COLORIZE.should_colorize();
    Box::leak(render_help(t!("cli.help.template"), colors).into_boxed_str())
}

/// jobctl: job-control and process I/O primitives, with a small shell on top.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    help_template = { build_help_string() },
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
#[command(disable_help_subcommand = true)]
#[command(trailing_var_arg = true)]
pub struct Cli {
    /// The command and its arguments. Parsed by the dispatcher, not by clap.
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,
}
