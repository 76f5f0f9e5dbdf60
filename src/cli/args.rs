//! CLI argument definitions using clap derive
//!
//! Defines all command-line arguments and subcommands.

use crate::config::file::CONFIG_ENV;
use crate::config::BackendKind;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Platform telemetry and control tool
///
/// Read signals from and write controls to the hardware of a compute node.
#[derive(Parser, Debug)]
#[command(name = "platio")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Path to configuration file
    #[arg(long, global = true, env = CONFIG_ENV)]
    pub config: Option<String>,

    /// Platform backend to open
    #[arg(long, global = true, value_enum)]
    pub backend: Option<BackendKind>,

    /// Platform library loaded by the geopmd backend
    #[arg(long, global = true)]
    pub library: Option<String>,

    /// Topology cache file used by the nvml backend
    #[arg(long, global = true)]
    pub topology_cache: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read a signal, or list signals
    Read(ReadArgs),

    /// Write a control, or list controls
    Write(WriteArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Listing options shared by read and write
#[derive(Parser, Debug, Default)]
pub struct ListArgs {
    /// List every domain with its instance count
    #[arg(short, long)]
    pub domain: bool,

    /// Describe one signal or control
    #[arg(short, long, value_name = "NAME")]
    pub info: Option<String>,

    /// Describe every signal or control
    #[arg(short = 'I', long)]
    pub info_all: bool,

    /// Create the topology cache
    #[arg(short, long)]
    pub cache: bool,
}

/// Arguments for the read command
#[derive(Parser, Debug)]
#[command(allow_negative_numbers = true)]
pub struct ReadArgs {
    #[command(flatten)]
    pub list: ListArgs,

    /// Signal name
    pub signal: Option<String>,

    /// Domain type name
    pub domain_type: Option<String>,

    /// Domain index
    pub domain_index: Option<i32>,
}

/// Arguments for the write command
#[derive(Parser, Debug)]
#[command(allow_negative_numbers = true)]
pub struct WriteArgs {
    #[command(flatten)]
    pub list: ListArgs,

    /// Read `NAME DOMAIN_TYPE DOMAIN_INDEX VALUE` lines from a file ("-" for stdin)
    #[arg(short = 'C', long, value_name = "FILE", conflicts_with = "control")]
    pub batch_file: Option<String>,

    /// Control name
    pub control: Option<String>,

    /// Domain type name
    pub domain_type: Option<String>,

    /// Domain index
    pub domain_index: Option<i32>,

    /// Setting to write
    pub value: Option<f64>,
}

/// Output format
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for machine parsing
    Json,
}

/// Generate shell completions and print to stdout
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}
