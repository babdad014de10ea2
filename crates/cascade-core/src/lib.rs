//! Cascade core
//!
//! Core domain types, traits, and error handling for cascade.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used across all other crates.

pub mod error;
pub mod pipeline;
pub mod ports;
pub mod revision;
pub mod status;

pub use error::{Error, Result};
