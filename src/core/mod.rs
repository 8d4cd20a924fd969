//! Interpreter-agnostic sandbox core.
//!
//! Core owns the worker process lifecycle, the line protocol, and the harness
//! program. Interpreter-specific launch details live in engine adapters.

pub mod channel;
pub mod harness;
pub mod protocol;
pub mod types;

pub use channel::SandboxChannel;
pub use types::{ChannelEvent, ChannelState, ExecutionResult};
