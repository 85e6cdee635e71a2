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

//! File- and environment-backed configuration for the datamover.
//!
//! Layout: `model.rs` (raw document and validated config), `validate.rs`
//! (field parsing helpers), `loader.rs` (YAML + environment overlay),
//! `defaults.rs` (default values).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{CONFIG_PATH_ENV, load, load_from};
pub use model::{
    CopierConfig, DatamoverConfig, FilterConfig, LoggingSettings, MoverKind, RawConfig,
    RetrySettings,
};
pub use validate::PathWithHighwaterMark;
