//! Rolling last-N window collector.
//!
//! Keeps the most recent `N` records of a stream of batches in bounded
//! storage. The caller owns the window state and hands it back on every call;
//! see `window::ingest`.

pub mod config;
pub mod error;
pub mod models;
pub mod util;
pub mod window;

pub use error::{IngestError, Result};
