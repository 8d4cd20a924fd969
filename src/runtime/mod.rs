//! Runtime measurement library
//!
//! [`tracker`] is the native model of the counters and the tracked container;
//! [`prelude`] renders the same model as interpreter source that the sandbox
//! prepends to every submission.

pub mod prelude;
pub mod tracker;

pub use tracker::{TrackedContainer, TrackerState};
