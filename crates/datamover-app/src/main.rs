#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Binary entrypoint that wires the datamover services together and runs
//! them until shutdown.

use clap::Parser;
use datamover_app::{AppResult, Cli, run_cli};

/// Parses the command line and blocks until the selected command finishes.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_cli(Cli::parse()).await
}
