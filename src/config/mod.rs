//! # arbordb Configuration Module
//!
//! Compile-time constants and the runtime configuration of an open database.
//!
//! ## Module Organization
//!
//! - [`constants`]: numeric configuration values with dependency documentation
//! - [`database`]: `DatabaseConfig` and its string-property parser

pub mod constants;
pub mod database;

pub use constants::*;
pub use database::DatabaseConfig;
