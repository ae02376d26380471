//! HTTP handlers, one file per area. Routing and guards live in `app::build_app`.

pub mod admin;
pub mod auth;
pub mod system;
pub mod users;
