//! cdnd - multi-CDN routing daemon.
//!
//! Rewrites a site's asset URLs onto one of several CDN providers, chosen
//! per request from geographic and content preference tables, falling back
//! to weighted load balancing over healthy providers. Background probes
//! classify provider health and drive failover with a cooldown.

pub mod admin;
pub mod balancer;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod failover;
pub mod health;
pub mod orchestrator;
pub mod provider;
pub mod router;
pub mod telemetry;

pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, PurgeScope};
pub use router::{ContentCategory, RoutingContext, RoutingDecision};
