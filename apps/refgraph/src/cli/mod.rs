//! # refgraph CLI Module
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new database
//! - `load` - Bulk-load records from a JSON file
//! - `show` - Show a record and its relation rows
//! - `citations` - Show citation counts for a record
//! - `delete` - Delete a record (soft by default, `--hard` to purge)
//! - `status` - Show database status

mod commands;

use clap::{Parser, Subcommand};
use refgraph_core::{RecordKind, RefgraphError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// refgraph - relation-graph maintenance for scholarly records.
///
/// Keeps the derived citation, authorship, affiliation and advisor tables
/// of a record corpus consistent on every write.
#[derive(Parser, Debug)]
#[command(name = "refgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the record database (overrides the config file)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Path to a TOML config file (default: ./refgraph.toml if present)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty database
    Init {
        /// Force initialization even if the database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Bulk-load records from a JSON file (an array of documents)
    Load {
        /// Path to the input file
        #[arg(short, long)]
        file: PathBuf,

        /// Record kind of the documents (literature, authors, data, ...)
        #[arg(short, long, default_value = "literature")]
        kind: String,

        /// Skip relation-table updates (trusted bulk-load path)
        #[arg(long)]
        skip_relations: bool,
    },

    /// Show a record and its relation rows
    Show {
        /// Control number of the record
        control_number: u64,

        /// Record kind
        #[arg(short, long, default_value = "literature")]
        kind: String,
    },

    /// Show citation counts for a record
    Citations {
        /// Control number of the record
        control_number: u64,

        /// Record kind
        #[arg(short, long, default_value = "literature")]
        kind: String,
    },

    /// Delete a record
    Delete {
        /// Control number of the record
        control_number: u64,

        /// Record kind
        #[arg(short, long, default_value = "literature")]
        kind: String,

        /// Purge the record entirely instead of tombstoning it
        #[arg(long)]
        hard: bool,
    },

    /// Show database status
    Status,
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Optional TOML configuration, merged under CLI flags.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Path to the record database.
    pub database: Option<PathBuf>,
}

impl Config {
    /// Load configuration.
    ///
    /// An explicitly named file must exist and parse; the implicit
    /// `./refgraph.toml` is only read when present.
    pub fn load(explicit: Option<&Path>) -> Result<Self, RefgraphError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from("refgraph.toml");
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            RefgraphError::Storage(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        toml::from_str(&contents).map_err(|e| {
            RefgraphError::Validation(format!("Invalid config '{}': {}", path.display(), e))
        })
    }
}

fn parse_kind(value: &str) -> Result<RecordKind, RefgraphError> {
    RecordKind::from_endpoint(value)
        .ok_or_else(|| RefgraphError::Validation(format!("Unknown record kind: {value}")))
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: &Cli) -> Result<(), RefgraphError> {
    let config = Config::load(cli.config.as_deref())?;
    let database = cli
        .database
        .clone()
        .or(config.database)
        .unwrap_or_else(|| PathBuf::from("refgraph.redb"));
    let json_mode = cli.json_mode;

    match &cli.command {
        Some(Commands::Init { force }) => cmd_init(&database, *force),
        Some(Commands::Load {
            file,
            kind,
            skip_relations,
        }) => cmd_load(&database, file, parse_kind(kind)?, *skip_relations, json_mode),
        Some(Commands::Show {
            control_number,
            kind,
        }) => cmd_show(&database, parse_kind(kind)?, *control_number, json_mode),
        Some(Commands::Citations {
            control_number,
            kind,
        }) => cmd_citations(&database, parse_kind(kind)?, *control_number, json_mode),
        Some(Commands::Delete {
            control_number,
            kind,
            hard,
        }) => cmd_delete(&database, parse_kind(kind)?, *control_number, *hard),
        Some(Commands::Status) | None => cmd_status(&database, json_mode),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn config_parses_database_path() {
        let config: Config = toml::from_str("database = \"/var/lib/refgraph.redb\"").unwrap();
        assert_eq!(
            config.database,
            Some(PathBuf::from("/var/lib/refgraph.redb"))
        );

        let empty: Config = toml::from_str("").unwrap();
        assert_eq!(empty.database, None);
    }

    #[test]
    fn kind_parsing_uses_endpoint_names() {
        assert_eq!(parse_kind("literature").unwrap(), RecordKind::Literature);
        assert_eq!(parse_kind("authors").unwrap(), RecordKind::Authors);
        assert!(parse_kind("preprints").is_err());
    }
}
