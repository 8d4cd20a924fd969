//! Interpreter adapters.
//!
//! The channel stays interpreter-agnostic. Adapters define how a worker
//! process is launched and how its interpreter version is checked.

pub mod adapter;
pub mod languages;
pub mod registry;
