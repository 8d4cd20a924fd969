//! Source instrumentation
//!
//! Textual rewriting of submitted scripts: list literals become tracked
//! containers and loop/function bodies get an operation counter.

pub mod indent;
pub mod rewriter;

pub use rewriter::{instrument, InstrumentedScript, LineRewriter};
