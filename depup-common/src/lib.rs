//! # depup Common Library
//!
//! Shared code for the dependency upgrade tooling:
//! - Common error type
//! - Bootstrap TOML configuration and secret resolution
//! - Tracing initialization

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
