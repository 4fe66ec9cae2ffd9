//! # refgraph
//!
//! Command-line front end for the refgraph relation engine.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │             apps/refgraph (THE BINARY)        │
//! │                                               │
//! │   CLI (clap) ── config (toml) ── tracing      │
//! │                      │                        │
//! │                      ▼                        │
//! │              ┌───────────────┐                │
//! │              │ refgraph-core │                │
//! │              │  (THE LOGIC)  │                │
//! │              └───────────────┘                │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! refgraph init
//! refgraph load -f records.json --kind literature
//! refgraph citations 42
//! refgraph status --json-mode
//! ```

mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // Initialize tracing — REFGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("REFGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "refgraph=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(&cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
