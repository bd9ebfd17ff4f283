//! Protocol core: classification, the render session and the serialized renderer.

pub mod classify;
pub mod error;
pub mod layout;
pub mod render;
pub mod session;
pub mod validation;
