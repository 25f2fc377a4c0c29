//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "lakihaku",
    version,
    author = "neur0map",
    about = "Hybrid retrieval over Finnish court decisions",
    long_about = "Lakihaku indexes a corpus of Finnish court decisions and retrieves the passages \
                  most relevant to a legal question by fusing semantic, lexical, metadata and \
                  case-identifier search with Reciprocal Rank Fusion."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/lakihaku/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Retrieve passages for a legal question
    Query {
        /// Question or search text
        query: String,

        /// JSONL corpus of decisions
        #[arg(long, value_name = "FILE")]
        corpus: PathBuf,

        /// Earliest decision year
        #[arg(long)]
        year_min: Option<i32>,

        /// Latest decision year
        #[arg(long)]
        year_max: Option<i32>,

        /// Restrict to a court (repeatable, e.g. "KKO")
        #[arg(long)]
        court: Vec<String>,

        /// Restrict to a legal domain (repeatable)
        #[arg(long)]
        domain: Vec<String>,

        /// Tenant scope; shared content is always visible
        #[arg(long)]
        tenant: Option<String>,

        /// Profile to use (e.g., "precise", "broad")
        #[arg(short, long)]
        profile: Option<String>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long, value_parser = ["embedding", "indexing", "retrieval", "profiles"])]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Print the configuration file location
    Path,
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
