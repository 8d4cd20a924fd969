//! Utilities
//!
//! Bounded output handling shared by the channel and the harness decoder.

pub mod output;
