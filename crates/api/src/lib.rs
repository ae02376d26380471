//! HTTP API: configuration, identity propagation and routing over the auth core.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
