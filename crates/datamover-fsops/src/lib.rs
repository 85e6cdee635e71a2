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
#![allow(clippy::module_name_repetitions)]

//! Directory scanning, fault tracking, free-space watching, and path movers.
//!
//! Layout: `scanner.rs` (polling loop), `faults.rs` (sentinel-backed fault set),
//! `highwater.rs` (free-space transitions), `space.rs` (free-space probes),
//! `retry.rs` (bounded retries), `mover.rs` (same-filesystem rename),
//! `copier.rs` + `process.rs` (external copy tool), `filter.rs`, `handler.rs`,
//! `outcome.rs`, `sink.rs` (event bus + metrics).

pub mod copier;
pub mod error;
pub mod faults;
pub mod filter;
pub mod handler;
pub mod highwater;
pub mod mover;
pub mod outcome;
pub mod process;
pub mod retry;
pub mod scanner;
pub mod sink;
pub mod space;

pub use copier::ProcessCopier;
pub use error::{FsOpsError, FsOpsResult};
pub use faults::{FaultTracker, SENTINEL_FILE_NAME};
pub use filter::{EntryFilter, PathFilter};
pub use handler::PathHandler;
pub use highwater::{HighwaterMarkEvent, HighwaterMarkState, HighwaterMarkWatcher};
pub use mover::IntraFsMover;
pub use outcome::CopyOutcome;
pub use process::ProcessSlot;
pub use retry::{RetryExhausted, RetryPolicy};
pub use scanner::{DirectoryScanner, ScanConfig, ScanReport};
pub use sink::EventSink;
pub use space::{FreeSpaceProvider, StatvfsFreeSpace, TimeBoundedFreeSpace};
