//! # EDCM Common Library
//!
//! Shared code for the EDC migration tooling:
//! - Error type and result alias
//! - TOML configuration file model and resolution
//! - Day-first date parsing used for event dates and item values

pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, Result};
