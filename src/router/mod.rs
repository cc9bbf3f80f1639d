//! Geographic and content-aware routing.
//!
//! Routes asset requests to a preferred CDN provider based on:
//! - Client region (geo zones)
//! - Content category (images, videos, static files, API)
//!
//! When no preference table yields an eligible provider the orchestrator
//! falls back to the load balancer.

mod context;
mod router;

pub use context::{
    ConnectionClass, ContentCategory, DeviceClass, RouteReason, RoutingContext, RoutingDecision,
};
pub use router::Router;
