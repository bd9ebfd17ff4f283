//! Server side of the patchwork partial-update protocol.

pub mod application;
pub mod config;
pub mod infra;
pub mod presentation;
