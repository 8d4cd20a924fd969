//! greenbox: operation and memory accounting for untrusted scripts
//! Instruments a script, runs it in a supervised interpreter worker and turns
//! the measured counters into an energy estimate
//!
//! # Architecture
//!
//! ## Instrumentation ([`instrument`])
//! - [`instrument::indent`]: Body indentation for injected statements
//! - [`instrument::rewriter`]: Line classifier and rewriter (tracked containers, block-entry counters)
//!
//! ## Measurement Library ([`runtime`])
//! - [`runtime::tracker`]: Native model of the counters and the tracked container
//! - [`runtime::prelude`]: Interpreter-side library prepended to every submission
//!
//! ## Sandbox Core ([`core`])
//! - [`core::channel`]: Worker lifecycle, async request/response, terminate-and-respawn
//! - [`core::protocol`]: JSON-lines framing
//! - [`core::harness`]: Worker harness program
//!
//! ## Interpreter Adapters ([`engine`])
//! - [`engine::adapter`]: Launch contract
//! - [`engine::registry`]: Adapter lookup by language name
//!
//! ## Estimation & Sessions
//! - [`energy`]: Counters to joules and kWh
//! - [`session`]: Run state machine and result persistence
//!
//! ## Support
//! - [`config`]: Configuration loading, shared types and errors
//! - [`observability::metrics`]: Prometheus metrics export
//! - [`utils::output`]: Bounded output handling
//!
//! # Design Principles
//!
//! 1. **Classifier, not parser** - Rewriting is line-based and never fails
//! 2. **Explicit state** - Counters live in one tracker per execution
//! 3. **Destructive cancellation** - A stuck worker is killed, never interrupted
//! 4. **Generations** - Nothing from a killed worker reaches the consumer

// Source instrumentation
pub mod instrument;

// Measurement library
pub mod runtime;

// Interpreter-agnostic sandbox core
pub mod core;

// Interpreter adapters
pub mod engine;

// Energy estimation
pub mod energy;

// Session controller and result persistence
pub mod session;

// Observability
pub mod observability;

// Configuration
pub mod config;

// Utilities
pub mod utils;

// CLI entrypoint wiring for the greenbox binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::types::*;
