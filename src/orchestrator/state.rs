//! Immutable routing snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::balancer::{self, LoadBalancer, WeightTable};
use crate::config::{Config, ConfigError, ProviderConfig};
use crate::error::Result;
use crate::failover::{FailoverController, FailoverTable};
use crate::health::{HealthMonitor, HealthRecord, HealthStatus};
use crate::provider::{http, ProviderFactory, ProviderHandle};
use crate::router::Router;
use crate::telemetry::counters;

/// A configured provider and its adapter.
#[derive(Clone)]
pub struct ProviderEntry {
    pub config: ProviderConfig,
    pub handle: ProviderHandle,
}

/// Everything derived from one configuration generation.
pub struct Topology {
    pub generation: u64,
    pub config: Arc<Config>,
    /// Enabled providers whose adapter could be built, in config order
    pub providers: Vec<ProviderEntry>,
    index: HashMap<String, usize>,
    pub router: Router,
    pub balancer: Arc<dyn LoadBalancer>,
    pub monitor: HealthMonitor,
    pub failover: FailoverController,
    /// Routing rules dropped while compiling the router
    pub ignored_rules: Vec<String>,
    /// Enabled providers left out because their adapter failed to build
    pub skipped_providers: Vec<String>,
}

impl Topology {
    /// Build adapters and routing tables for a configuration.
    pub fn build(
        config: Arc<Config>,
        generation: u64,
        factory: &dyn ProviderFactory,
    ) -> Result<Self> {
        let client = http::build_client(config.health.timeout)
            .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;

        let mut providers = Vec::with_capacity(config.providers.len());
        let mut index = HashMap::with_capacity(config.providers.len());
        let mut skipped_providers = Vec::new();
        for provider_config in config.enabled_providers() {
            let handle = match factory.create(provider_config, &config.site.host, &client) {
                Ok(handle) => handle,
                Err(e) => {
                    warn!(
                        provider = %provider_config.name,
                        error = %e,
                        "provider adapter unavailable, provider skipped"
                    );
                    skipped_providers.push(e.to_string());
                    continue;
                }
            };
            index.insert(provider_config.name.clone(), providers.len());
            providers.push(ProviderEntry {
                config: provider_config.clone(),
                handle,
            });
        }
        counters::providers_skipped_set(skipped_providers.len());

        let (router, errors) = Router::new(
            &config.routing.geo_zones,
            &config.routing.content_rules,
            config.providers.iter().map(|p| p.name.as_str()),
        );
        counters::routing_rules_ignored_set(errors.len());

        let balancer = balancer::create(config.routing.load_balancer);

        debug!(
            generation,
            providers = providers.len(),
            skipped = skipped_providers.len(),
            load_balancer = balancer.name(),
            "topology built"
        );

        Ok(Self {
            generation,
            monitor: HealthMonitor::new(&config.health),
            failover: FailoverController::new(&config.failover),
            ignored_rules: errors.iter().map(ToString::to_string).collect(),
            skipped_providers,
            config,
            providers,
            index,
            router,
            balancer,
        })
    }

    pub fn get(&self, name: &str) -> Option<&ProviderEntry> {
        self.index.get(name).map(|&i| &self.providers[i])
    }

    /// Enabled providers in config order.
    pub fn enabled(&self) -> impl Iterator<Item = &ProviderEntry> {
        self.providers.iter()
    }
}

/// Shared routing state, replaced whole by writers.
pub struct RoutingState {
    pub topology: Arc<Topology>,
    pub health: HashMap<String, HealthRecord>,
    pub failover: FailoverTable,
    pub weights: WeightTable,
}

impl RoutingState {
    pub fn new(
        topology: Arc<Topology>,
        health: HashMap<String, HealthRecord>,
        failover: FailoverTable,
    ) -> Self {
        let weights = WeightTable::compute(
            &topology.config.providers,
            |name| is_eligible(&topology, &health, &failover, name),
            |name| health.get(name).map(|r| r.status),
            topology.config.routing.latency_aware,
        );

        Self {
            topology,
            health,
            failover,
            weights,
        }
    }

    /// Initial state: every enabled provider seeded healthy.
    pub fn seeded(topology: Arc<Topology>) -> Self {
        let health = topology
            .enabled()
            .map(|p| (p.config.name.clone(), HealthRecord::seeded(&p.config.name)))
            .collect();
        Self::new(topology, health, FailoverTable::new())
    }

    /// Whether a provider may serve traffic now.
    pub fn is_eligible(&self, name: &str) -> bool {
        is_eligible(&self.topology, &self.health, &self.failover, name)
    }

    pub fn status(&self, name: &str) -> Option<HealthStatus> {
        self.health.get(name).map(|r| r.status)
    }

    /// Most preferred eligible provider.
    pub fn primary(&self) -> Option<&str> {
        self.weights.primary()
    }

    pub fn handle(&self, name: &str) -> Option<&ProviderHandle> {
        self.topology.get(name).map(|p| &p.handle)
    }

    /// Export gauges for this snapshot.
    pub(crate) fn record_metrics(&self) {
        counters::eligible_providers_set(self.weights.entries().len());
        for entry in self.topology.enabled() {
            let name = &entry.config.name;
            counters::provider_weight_set(name, self.weights.get(name).unwrap_or(0));
        }
    }
}

fn is_eligible(
    topology: &Topology,
    health: &HashMap<String, HealthRecord>,
    failover: &FailoverTable,
    name: &str,
) -> bool {
    topology.get(name).is_some_and(|p| p.config.enabled)
        && health.get(name).is_some_and(|r| r.status.is_serving())
        && !failover.contains_key(name)
}
