//! CLI interface for Parley
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parley voice assistant
///
/// Listens for speech, asks a language model for a reply, speaks it back and
/// repeats until you say "exit".
#[derive(Parser, Debug)]
#[command(name = "parley")]
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
    /// Talk through the microphone and speaker
    Voice,

    /// Run the same conversation loop in the terminal
    Chat,

    /// Ask a single question and print the reply
    Ask {
        /// The question to ask
        text: String,
    },

    /// Check configuration, credentials, provider and audio devices
    Doctor,

    /// Remove the stored Google API key from the system keychain
    ForgetKey,
}
