//! # catclass Common Library
//!
//! Shared code for the catalog classification tools including:
//! - Database initialization and persisted models
//! - Configuration loading (TOML bootstrap, environment, compiled defaults)
//! - Common error type

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
