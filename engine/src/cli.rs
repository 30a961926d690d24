//! CLI interface for Lexis
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Lexis legal-draft pipeline
///
/// Routes each request through research, drafting, negotiation and admin
/// stages, validates the result and checkpoints the session.
#[derive(Parser, Debug)]
#[command(name = "lexis")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Process a single turn
    Run {
        /// The request, e.g. "Draft a web design agreement for Acme"
        input: String,

        /// Session to attach the turn to (default: a new session)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Interactive session; supports /session, /new, /current, /help
    Chat {
        /// Session to start in (default: a new session)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Show the checkpointed state of a session
    Show {
        /// Session id
        #[arg(short, long)]
        session: String,
    },

    /// List loaded clause templates
    Templates,

    /// Run system diagnostics
    Doctor,
}
