//! Parses typed lines into user intents.

use shared::domain::PRESET_ENVIRONMENTS;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Catalog,
    Show,
    Add(String),
    Remove(String),
    Location(usize),
    Reset,
    Flush,
    Quit,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Catalog => "catalog",
            Command::Show => "show",
            Command::Add(_) => "add",
            Command::Remove(_) => "remove",
            Command::Location(_) => "location",
            Command::Reset => "reset",
            Command::Flush => "flush",
            Command::Quit => "quit",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty input")]
    Empty,
    #[error("unknown command '{0}'; type 'help'")]
    Unknown(String),
    #[error("'{0}' needs a species name")]
    MissingName(&'static str),
    #[error("location must be a preset number from 1 to {}", PRESET_ENVIRONMENTS.len())]
    BadLocation,
}

pub const HELP: &str = "\
commands:
  catalog              list selectable species
  show                 print the current ecosystem
  add <species>        add a species (max 8)
  remove <species>     remove a species
  location <n>         choose environment preset n, counting from 1
  reset                start over
  flush                send pending telemetry now
  quit                 end the session";

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb.to_ascii_lowercase().as_str() {
        "" => Err(CommandError::Empty),
        "help" | "?" => Ok(Command::Help),
        "catalog" | "list" => Ok(Command::Catalog),
        "show" | "status" => Ok(Command::Show),
        "add" => named(rest, "add").map(Command::Add),
        "remove" | "rm" => named(rest, "remove").map(Command::Remove),
        "location" | "env" => rest
            .parse::<usize>()
            .ok()
            .filter(|idx| (1..=PRESET_ENVIRONMENTS.len()).contains(idx))
            .map(Command::Location)
            .ok_or(CommandError::BadLocation),
        "reset" => Ok(Command::Reset),
        "flush" => Ok(Command::Flush),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

fn named(rest: &str, verb: &'static str) -> Result<String, CommandError> {
    if rest.is_empty() {
        return Err(CommandError::MissingName(verb));
    }
    Ok(rest.to_string())
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
