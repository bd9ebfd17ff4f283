//! Browser runtime for the patchwork protocol.
//!
//! The request lifecycle, merge decisions and config hooks are plain Rust and
//! run anywhere; [`web`] binds them to the DOM when compiled for `wasm32`.

pub mod descriptor;
pub mod hooks;
pub mod inflight;
pub mod pipeline;
pub mod reconcile;
pub mod signal;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use descriptor::{Body, MergeTarget, Method, RequestDescriptor};
pub use inflight::InFlight;
pub use pipeline::{Exchange, Host, Pipeline, PipelineError, Prepared, Settled};
pub use reconcile::{MergePlan, Outcome, ResponseSnapshot, SkipReason};
pub use signal::Stage;
