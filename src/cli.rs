//! Command line and the interactive command language read from stdin.

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::session::Action;

#[derive(Debug, Parser)]
#[command(name = "taperec", version, about = "Record a capture program's output to files")]
pub struct Cli {
    /// Config file (default: platform config dir/taperec/config.toml).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory for new recordings.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Chunk interval in milliseconds, 0 for a single chunk on stop.
    #[arg(long, value_name = "MS")]
    pub slice_ms: Option<u64>,

    /// Do not hold an idle/sleep inhibitor while recording.
    #[arg(long)]
    pub no_power_lock: bool,

    /// Print snapshots as JSON lines.
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Load the config file and apply command line overrides.
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let path = self.config.clone().unwrap_or_else(Config::config_path);
        let mut config = Config::load_from(&path)?;

        if let Some(dir) = &self.output_dir {
            config.sink.output_dir = dir.clone();
        }
        if let Some(slice_ms) = self.slice_ms {
            config.capture.slice_ms = slice_ms;
        }
        if self.no_power_lock {
            config.power_lock.enabled = false;
        }

        config.validate()?;
        Ok(config)
    }
}

/// One line of interactive input.
#[derive(Debug)]
pub enum Command {
    Action(Action),
    Status,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command '{0}' (expected record, pause, resume, stop, status or quit)")]
    Unknown(String),

    #[error("'{command}' takes no arguments")]
    UnexpectedArgument { command: String },
}

/// Parse `record [name]`, `pause`, `resume`, `stop`, `status` or `quit`.
pub fn parse_line(line: &str, config: &Config) -> Result<Command, ParseError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    if word.is_empty() {
        return Err(ParseError::Empty);
    }

    let command = match word.to_ascii_lowercase().as_str() {
        "record" => {
            let name = (!rest.is_empty()).then(|| rest.to_string());
            return Ok(Command::Action(Action::Record {
                capture: config.capture.options(),
                sink: config.sink.options(name),
            }));
        }
        "pause" => Command::Action(Action::Pause),
        "resume" => Command::Action(Action::Resume),
        "stop" => Command::Action(Action::Stop),
        "status" => Command::Status,
        "quit" | "exit" => Command::Quit,
        _ => return Err(ParseError::Unknown(word.to_string())),
    };

    if !rest.is_empty() {
        return Err(ParseError::UnexpectedArgument {
            command: word.to_string(),
        });
    }
    Ok(command)
}
