//! Command-line interface for bookvoice
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Narrate book chapters into normalized WAV audio
#[derive(Parser, Debug)]
#[command(name = "bookvoice", version, about = "Narrate book chapters into normalized WAV audio")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Which splitter `split` uses
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    /// Paragraph/line/sentence boundaries for the analysis backend
    Analysis,
    /// Full-width punctuation for the speech synthesizer
    Synthesis,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the format of a WAV file
    Inspect {
        /// WAV file to inspect
        file: PathBuf,
    },

    /// Split a text file into chunks and print them
    Split {
        /// UTF-8 text file
        file: PathBuf,

        /// Splitter to use
        #[arg(long, value_enum, default_value = "synthesis")]
        mode: SplitMode,

        /// Chunk limit in characters (default: from config)
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
    },

    /// Concatenate WAV files, inserting silence between them
    Merge {
        /// Output WAV file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Silence between inputs in milliseconds (default: from config)
        #[arg(long, value_name = "MS")]
        silence_ms: Option<u32>,

        /// Peak-normalize the merged file
        #[arg(long)]
        normalize: bool,

        /// Input WAV files, in order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Peak-normalize a 16-bit PCM WAV file
    Normalize {
        /// Input WAV file
        input: PathBuf,
        /// Output WAV file
        output: PathBuf,
    },

    /// Analyze chapter text with the offline analyzer and store the segments
    Analyze {
        /// Project JSON file
        #[arg(long, value_name = "FILE")]
        project: PathBuf,

        /// Chapter id to store the analysis under
        #[arg(long, value_name = "ID")]
        chapter: String,

        /// Re-analyze even if the chapter already has segments
        #[arg(long)]
        force: bool,

        /// UTF-8 chapter text
        text: PathBuf,
    },

    /// Generate audio for one chapter
    Generate {
        /// Project JSON file
        #[arg(long, value_name = "FILE")]
        project: PathBuf,

        /// Use the offline mock synthesizer
        #[arg(long)]
        mock: bool,

        /// Chapter id
        chapter: String,
    },

    /// Generate audio for every chapter that has none yet
    GenerateAll {
        /// Project JSON file
        #[arg(long, value_name = "FILE")]
        project: PathBuf,

        /// Use the offline mock synthesizer
        #[arg(long)]
        mock: bool,
    },

    /// View and manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
