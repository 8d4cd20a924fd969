//! Configuration
//!
//! Analyzer settings, loading from `greenbox.json`, and the shared error type.

pub mod loader;
pub mod types;
