//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "hybrid-rag",
    version,
    author = "neur0map",
    about = "Structure-aware chunking and filtered hybrid retrieval",
    long_about = "hybrid-rag splits Markdown documents along their headings, stores every chunk \
                  with a dense and a sparse vector, and answers queries by fusing both rankings, \
                  optionally restricted to a heading section."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/hybrid-rag/config.toml)
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
    /// Manage the vector collection
    Collection {
        #[command(subcommand)]
        action: CollectionAction,
    },

    /// Chunk a document and insert it into the collection
    Ingest {
        /// UTF-8 text or Markdown file
        file: PathBuf,
    },

    /// Run a hybrid search
    Search {
        /// Search query text
        query: String,

        /// Restrict results to a second-level heading (shorthand for --filter header_2=...)
        #[arg(short, long, conflicts_with = "filters")]
        section: Option<String>,

        /// Exact metadata match, e.g. header_1=Guide (repeatable)
        #[arg(short, long = "filter", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,

        /// Maximum number of results (defaults to search.limit)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Query the dense and sparse channels separately and merge client-side
        #[arg(long)]
        separate: bool,

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
pub enum CollectionAction {
    /// Drop and recreate the collection for the configured dense model
    Recreate,

    /// Show whether the collection exists and how many records it holds
    Status,

    /// Drop the collection
    Delete,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

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
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}
