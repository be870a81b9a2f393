//! # Scoreline Common Library
//!
//! Shared code for the scoreline crates:
//! - Error type used by configuration and startup code
//! - TOML configuration loading and secret resolution
//! - Tracing subscriber initialisation

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
