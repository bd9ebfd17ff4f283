//! Serialized rendering.
//!
//! Every render job runs on one dedicated worker that owns the only
//! [`RenderContext`]. Callers submit jobs concurrently through a cloneable
//! [`RenderHandle`] and await their replies; a batch submitted through
//! [`RenderHandle::render_all`] resolves in submission order.

mod context;
mod runtime;
mod types;

pub use context::RenderContext;
pub use runtime::{RenderEngine, RenderHandle, RenderJob, component_job};
pub use types::{BindModel, Component, RenderError};
