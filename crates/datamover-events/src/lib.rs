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

//! Core event bus for the datamover.
//!
//! Components publish typed [`Event`]s from blocking threads; each gets a
//! sequential id and lands in a bounded journal that shutdown reporting and
//! tests read back. Live subscribers receive envelopes over
//! `tokio::broadcast`.
//!
//! Layout: `payloads.rs` (event types), `routing.rs` (`EventBus`).

pub mod payloads;
pub mod routing;

pub use payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};
pub use routing::{EventBus, EventStream};
