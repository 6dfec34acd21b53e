//! sem-core - Core types, configuration and errors
//!
//! This crate provides the foundational types, configuration and error
//! handling shared by the store, stream and array crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::*;
pub use error::{Result, SemError};
pub use types::*;
