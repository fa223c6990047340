//! Command line surface

use std::path::PathBuf;

use clap::Parser;
use tsbridge_tsserver::LogVerbosity;

/// LSP adapter for the TypeScript tsserver analysis process.
#[derive(Debug, Parser)]
#[command(name = "tsbridge", version, about)]
pub struct Args {
    /// Speak LSP over stdio. Required; no other transport exists.
    #[arg(long)]
    pub stdio: bool,

    /// Adapter log level: 1 errors, 2 warnings, 3 info, 4 debug.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
    pub log_level: Option<u8>,

    /// Accepted legacy spelling of --log-level.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4), hide = true)]
    pub tsserver_log_level: Option<u8>,

    /// Write the tsserver log to this file.
    #[arg(long)]
    pub tsserver_log_file: Option<PathBuf>,

    /// tsserver log verbosity.
    #[arg(long, value_parser = parse_verbosity)]
    pub tsserver_log_verbosity: Option<LogVerbosity>,

    /// Use this tsserver.js (or its directory) instead of discovering one.
    #[arg(long)]
    pub tsserver_path: Option<PathBuf>,
}

fn parse_verbosity(value: &str) -> Result<LogVerbosity, String> {
    match value {
        "terse" => Ok(LogVerbosity::Terse),
        "normal" => Ok(LogVerbosity::Normal),
        "verbose" => Ok(LogVerbosity::Verbose),
        other => Err(format!(
            "unknown verbosity {other:?} (expected terse, normal or verbose)"
        )),
    }
}

impl Args {
    /// The effective log level. Both spellings are accepted; on conflict
    /// `--log-level` wins and the caller logs a warning.
    pub fn effective_log_level(&self) -> (u8, bool) {
        match (self.log_level, self.tsserver_log_level) {
            (Some(new), Some(old)) => (new, new != old),
            (Some(new), None) => (new, false),
            (None, Some(old)) => (old, false),
            (None, None) => (3, false),
        }
    }
}
