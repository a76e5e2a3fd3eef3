pub mod config;
pub mod service;
pub mod telemetry;

pub use config::{ConfigError, ServiceConfig};
pub use service::{AppState, SessionSweeper, build_router, spawn_expiry_listener};
