//! # Catalog Ingest Common Library
//!
//! Shared code for the catalog-ingest crates including:
//! - Error and result types
//! - Configuration file resolution and loading
//! - Event types (IngestEvent enum) and the EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
