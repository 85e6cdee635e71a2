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

//! Datamover application wiring.
//!
//! Layout: `cli.rs` (command line), `bootstrap.rs` (service wiring),
//! `scheduler.rs` (interval loop and shutdown), `error.rs`.

/// Application bootstrap and command dispatch.
pub mod bootstrap;
/// Command line definition.
pub mod cli;
/// Application-level errors.
pub mod error;
/// Interval scheduling for the scanner and watcher.
pub mod scheduler;

pub use bootstrap::{Services, build_services, run_cli};
pub use cli::{Cli, Command};
pub use error::{AppError, AppResult};
pub use scheduler::Scheduler;
