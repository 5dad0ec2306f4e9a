//! Line commands for the interactive loop.

use std::str::FromStr;

use solace_core::types::Severity;

/// One parsed line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A message to process as a conversation turn.
    Say(String),
    /// Print the in-memory history.
    History,
    /// Forget the in-memory context.
    Clear,
    /// Print the persisted transcript.
    Transcript,
    /// Delete the persisted transcript.
    Forget,
    /// Change the resource tier for subsequent turns.
    Severity(Severity),
    Quit,
    /// An unrecognised slash command or bad argument.
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        let Some(rest) = trimmed.trim_start().strip_prefix('/') else {
            return Command::Say(trimmed.to_string());
        };

        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default().to_lowercase();
        let arg = parts.next();
        match (name.as_str(), arg) {
            ("history", None) => Command::History,
            ("clear", None) => Command::Clear,
            ("transcript", None) => Command::Transcript,
            ("forget", None) => Command::Forget,
            ("quit" | "exit", None) => Command::Quit,
            ("severity", Some(tier)) => match Severity::from_str(tier) {
                Ok(severity) => Command::Severity(severity),
                Err(_) => Command::Invalid(format!("unknown severity: {}", tier)),
            },
            ("severity", None) => Command::Invalid("usage: /severity <general|medium|crisis>".to_string()),
            _ => Command::Invalid(format!("unknown command: /{}", rest.trim())),
        }
    }
}
