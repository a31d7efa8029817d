// src/cli/dispatcher.rs

use anyhow::Result;

use crate::cli::handlers;

// --- Command Definition and Registry ---

/// Defines a system command, its aliases, and its handler.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Vec<String>) -> Result<()>,
}

/// The single source of truth for all system commands.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "expand",
        aliases: &[],
        handler: handlers::expand::handle,
    },
    CommandDefinition {
        name: "repl",
        aliases: &["sh"],
        handler: handlers::repl::handle,
    },
    CommandDefinition {
        name: "run",
        aliases: &[],
        handler: handlers::run::handle,
    },
    CommandDefinition {
        name: "status",
        aliases: &[],
        handler: handlers::status::handle,
    },
];

/// Finds a command definition in the registry by its name or alias.
fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

/// Routes the raw arguments to a handler:
/// - no arguments starts the interactive shell;
/// - `jobctl <command> [args...]` runs a registered command;
/// - anything else is a command line to run: `jobctl ls -l` is `jobctl run ls -l`.
pub fn dispatch(all_args: Vec<String>) -> Result<()> {
    log::debug!("Dispatching args: {:?}", all_args);

    let Some(first) = all_args.first() else {
        return handlers::repl::handle(Vec::new());
    };

    match find_command(first) {
        Some(command) => (command.handler)(all_args.into_iter().skip(1).collect()),
        None => handlers::run::handle(all_args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_command_by_name_and_alias() {
        assert_eq!(find_command("repl").map(|c| c.name), Some("repl"));
        assert_eq!(find_command("sh").map(|c| c.name), Some("repl"));
        assert!(find_command("ls").is_none());
    }

    #[test]
    fn test_registry_names_are_unique() {
        let mut names: Vec<&str> = COMMAND_REGISTRY
            .iter()
            .flat_map(|c| std::iter::once(c.name).chain(c.aliases.iter().copied()))
            .collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
