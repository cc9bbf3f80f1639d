//! Admin HTTP API using Axum.
//!
//! Provides endpoints for:
//! - Health checks (/healthz, /livez, /readyz)
//! - Metrics (/metrics)
//! - Provider state (/providers/health, /providers/failover, /providers/weights, /providers/stats)
//! - Routing and purge (/route, /purge)
//! - Config reload (/config/reload)

mod handlers;
mod server;

pub use handlers::{
    ErrorResponse, HealthResponse, ReadinessResponse, RouteResponse, WeightsResponse,
};
pub use server::{AdminServer, AdminState, ReloadResult};
