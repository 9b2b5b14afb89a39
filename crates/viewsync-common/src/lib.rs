//! viewsync Common - Shared types and utilities
//!
//! This crate provides the entity identifier, error taxonomy and
//! configuration structures used by the counter pipeline, the durable
//! store and the board service.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
