//! qa-core - Core types and traits for the retrieval engine
//!
//! This crate provides the data model, the interfaces to the external
//! vector store and language model, configuration, and error handling
//! shared by the other qa crates.

pub mod config;
pub mod error;
pub mod time;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{QaError, Result};
pub use time::{format_clock, parse_clock, TimeRange};
pub use traits::*;
pub use types::*;
