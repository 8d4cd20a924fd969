//! Observability
//!
//! In-process metrics with Prometheus text export.

pub mod metrics;
