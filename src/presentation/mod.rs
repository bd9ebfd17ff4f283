//! Views, layouts and askama templates.

pub mod layouts;
pub mod views;
