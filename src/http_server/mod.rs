//! # HTTP Server Module
//!
//! Axum server exposing the master to administrative clients.
//!
//! # Endpoints
//!
//! - `/health` - Health check
//! - `/api/*` - Resource lifecycle, account cancel, DisableLog removal
//! - `/realtime/invalidations` - WebSocket invalidation feed
//! - `/observability/*` - Metrics and monitoring

pub mod config;
pub mod observability_routes;
pub mod realtime_routes;
pub mod resource_routes;
pub mod server;
pub mod state;

pub use config::HttpServerConfig;
pub use server::HttpServer;
pub use state::{ApiError, ApiState, ErrorResponse};
