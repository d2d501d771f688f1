//! CLI parse: clap types for hostpdr. No behavior; definitions only.

use crate::logging::{LogFormat, LogOutput};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// hostpdr - host PDR exchange for the BMC
#[derive(Parser, Debug)]
#[command(name = "hostpdr")]
#[command(about = "Fetch, merge and inspect PLDM PDRs reported by host firmware")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over system files)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log output
    #[arg(long, global = true, value_enum)]
    pub log_output: Option<LogOutput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a fetch cycle against a recorded host capture
    Replay {
        /// Capture file (JSON)
        capture: PathBuf,

        /// Record handles to fetch, comma separated (default: whole repository)
        #[arg(long, value_delimiter = ',')]
        handles: Vec<u32>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Decode a single PDR given as hex
    Decode {
        /// Encoded record, header included
        hex: String,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}
