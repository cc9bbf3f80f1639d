//! Routing orchestrator.
//!
//! Facade over health monitoring, failover, load balancing and routing.
//! All shared state lives in one [`RoutingState`] snapshot behind
//! `ArcSwap`: readers never lock and never touch the network, writers
//! (probe cycles, reloads) are serialized and publish a new snapshot.

mod state;
mod types;

pub use state::{ProviderEntry, RoutingState, Topology};
pub use types::{CycleReport, ProviderStatistics, PurgeReport, PurgeScope};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

use crate::balancer::WeightTable;
use crate::bootstrap::{Event, EventBus};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::failover::{FailoverController, FailoverOutcome, FailoverState};
use crate::health::{HealthHistory, HealthRecord, HealthStatus, HealthTransition};
use crate::provider::{ProviderFactory, ProviderHandle};
use crate::router::{RouteReason, RoutingContext, RoutingDecision};
use crate::telemetry::counters;

/// Multi-CDN routing orchestrator.
pub struct Orchestrator {
    state: ArcSwap<RoutingState>,
    writer: Mutex<()>,
    events: Arc<EventBus>,
    factory: Arc<dyn ProviderFactory>,
    history: HealthHistory,
    generation: AtomicU64,
    /// Probe cycles started so far
    cycles: AtomicU64,
}

impl Orchestrator {
    /// Build adapters and routing tables. Every enabled provider starts
    /// healthy.
    pub fn new(
        config: Config,
        factory: Arc<dyn ProviderFactory>,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let topology = Topology::build(Arc::new(config), 1, factory.as_ref())?;
        let history = HealthHistory::new(topology.config.health.history_size);
        let state = RoutingState::seeded(Arc::new(topology));
        state.record_metrics();

        info!(
            providers = state.topology.providers.len(),
            skipped = state.topology.skipped_providers.len(),
            eligible = state.weights.entries().len(),
            primary = ?state.primary(),
            "orchestrator initialized"
        );

        Ok(Self {
            state: ArcSwap::from_pointee(state),
            writer: Mutex::new(()),
            events,
            factory,
            history,
            generation: AtomicU64::new(1),
            cycles: AtomicU64::new(0),
        })
    }

    /// Current routing snapshot.
    pub fn snapshot(&self) -> Arc<RoutingState> {
        self.state.load_full()
    }

    /// Active configuration.
    pub fn config(&self) -> Arc<Config> {
        self.state.load().topology.config.clone()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    // ------------------------------------------------------------------
    // Request path
    // ------------------------------------------------------------------

    /// Pick a provider for the context: preference tables first, then the
    /// load balancer.
    pub fn get_optimal_provider(&self, context: &RoutingContext) -> Option<ProviderHandle> {
        self.decide(context).0
    }

    /// Routing decision for the context.
    pub fn route(&self, context: &RoutingContext) -> RoutingDecision {
        self.decide(context).1
    }

    /// Rewrite a URL onto the chosen provider. Fails open: the URL comes
    /// back unchanged when no provider resolves.
    pub fn rewrite_url(&self, url: &str, context: &RoutingContext) -> String {
        self.resolve(url, context).0
    }

    /// Rewritten URL together with the decision that produced it.
    pub fn resolve(&self, url: &str, context: &RoutingContext) -> (String, RoutingDecision) {
        let (provider, decision) = self.decide(context);
        let rewritten = match provider {
            Some(p) => p.rewrite_url(url),
            None => url.to_string(),
        };
        (rewritten, decision)
    }

    fn decide(&self, context: &RoutingContext) -> (Option<ProviderHandle>, RoutingDecision) {
        let state = self.state.load();

        let chosen = state
            .topology
            .router
            .select_candidate(context, |name| state.is_eligible(name))
            .or_else(|| {
                state
                    .topology
                    .balancer
                    .select(&state.weights)
                    .map(|name| (name.to_string(), RouteReason::LoadBalanced))
            });

        let (handle, decision) = match chosen {
            Some((name, reason)) => (
                state.handle(&name).cloned(),
                RoutingDecision::new(Some(name), reason, context.clone()),
            ),
            None => (
                None,
                RoutingDecision::new(None, RouteReason::NoneHealthy, context.clone()),
            ),
        };

        trace!(provider = ?decision.provider, reason = %decision.reason, "routing decision");
        counters::routing_decision(decision.reason.as_str());

        if state.topology.config.routing.emit_decisions {
            self.events.publish(Event::RoutingDecision(decision.clone()));
        }

        (handle, decision)
    }

    // ------------------------------------------------------------------
    // Operator actions
    // ------------------------------------------------------------------

    /// Purge via the current primary provider.
    pub async fn purge(&self, scope: PurgeScope) -> Result<PurgeReport> {
        let state = self.state.load_full();
        let primary = state.primary().ok_or(Error::NoActiveProvider)?;
        let handle = state.handle(primary).ok_or(Error::NoActiveProvider)?.clone();
        purge_with(&handle, scope).await
    }

    /// Purge a specific provider, eligible or not.
    pub async fn purge_provider(&self, name: &str, scope: PurgeScope) -> Result<PurgeReport> {
        let handle = self
            .state
            .load()
            .handle(name)
            .cloned()
            .ok_or_else(|| Error::UnknownProvider(name.to_string()))?;
        purge_with(&handle, scope).await
    }

    /// Statistics of every enabled provider, fetched concurrently.
    pub async fn get_statistics(&self) -> Vec<ProviderStatistics> {
        let state = self.state.load_full();
        let requests = state.topology.enabled().map(|entry| {
            let handle = entry.handle.clone();
            async move {
                let provider = handle.name().to_string();
                match handle.get_statistics().await {
                    Ok(stats) => ProviderStatistics {
                        provider,
                        stats: Some(stats),
                        error: None,
                    },
                    Err(e) => {
                        warn!(provider = %provider, error = %e, "statistics unavailable");
                        ProviderStatistics {
                            provider,
                            stats: None,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
        });
        join_all(requests).await
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Latest health record of every enabled provider, in config order.
    pub fn get_health_snapshot(&self) -> Vec<HealthRecord> {
        let state = self.state.load();
        state
            .topology
            .enabled()
            .filter_map(|p| state.health.get(&p.config.name).cloned())
            .collect()
    }

    /// Providers currently out of rotation, in config order.
    pub fn get_failover_snapshot(&self) -> Vec<FailoverState> {
        let state = self.state.load();
        state
            .topology
            .providers
            .iter()
            .filter_map(|p| state.failover.get(&p.config.name).cloned())
            .collect()
    }

    pub fn current_weights(&self) -> WeightTable {
        self.state.load().weights.clone()
    }

    /// Most preferred eligible provider.
    pub fn primary(&self) -> Option<String> {
        self.state.load().primary().map(str::to_string)
    }

    /// Recent probe records of a provider, oldest first.
    pub fn health_history(&self, provider: &str) -> Vec<HealthRecord> {
        self.history.get(provider)
    }

    /// At least one provider is eligible.
    pub fn is_ready(&self) -> bool {
        !self.state.load().weights.is_empty()
    }

    // ------------------------------------------------------------------
    // Background entry points
    // ------------------------------------------------------------------

    /// Probe every enabled provider except those whose credential was
    /// rejected.
    #[instrument(skip(self))]
    pub async fn run_health_cycle(&self) -> CycleReport {
        let state = self.state.load_full();
        let targets: Vec<ProviderHandle> = state
            .topology
            .enabled()
            .filter(|p| state.status(&p.config.name) != Some(HealthStatus::Failed))
            .map(|p| p.handle.clone())
            .collect();

        let cycle = self.next_cycle();
        let records = state.topology.monitor.probe_all(&targets).await;
        self.apply(state.topology.generation, cycle, records).await
    }

    /// Probe only providers whose cooldown has elapsed.
    #[instrument(skip(self))]
    pub async fn run_recovery_check(&self) -> CycleReport {
        let state = self.state.load_full();
        let candidates = FailoverController::recovery_candidates(&state.failover, Instant::now());

        let targets: Vec<ProviderHandle> = candidates
            .iter()
            .filter(|name| state.status(name) != Some(HealthStatus::Failed))
            .filter_map(|name| state.handle(name).cloned())
            .collect();

        if targets.is_empty() {
            return CycleReport::default();
        }

        debug!(candidates = ?candidates, "running recovery probes");
        let cycle = self.next_cycle();
        let records = state.topology.monitor.probe_all(&targets).await;
        self.apply(state.topology.generation, cycle, records).await
    }

    fn next_cycle(&self) -> u64 {
        self.cycles.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Fold probe records into a new snapshot. A record never replaces one
    /// from a cycle that started later.
    async fn apply(
        &self,
        generation: u64,
        cycle: u64,
        records: Vec<HealthRecord>,
    ) -> CycleReport {
        let _guard = self.writer.lock().await;
        let current = self.state.load_full();

        if current.topology.generation != generation {
            debug!(
                probed_generation = generation,
                current_generation = current.topology.generation,
                "configuration reloaded during probe, discarding results"
            );
            return CycleReport::default();
        }

        let now = Instant::now();
        let controller = &current.topology.failover;
        let mut health = current.health.clone();
        let mut failover = current.failover.clone();
        controller.advance(&mut failover, now);

        let mut report = CycleReport {
            probed: records.len(),
            ..CycleReport::default()
        };
        let mut outcomes = Vec::new();

        for mut record in records {
            record.cycle = cycle;
            let Some(previous) = health.get(&record.provider) else {
                continue;
            };
            if previous.cycle > cycle {
                debug!(
                    provider = %record.provider,
                    cycle,
                    newer_cycle = previous.cycle,
                    status = %record.status,
                    "probe result superseded by a later cycle, discarding"
                );
                report.superseded += 1;
                continue;
            }

            if let Some(transition) = HealthTransition::between(Some(previous), &record) {
                info!(
                    provider = %transition.provider,
                    from = %transition.from,
                    to = %transition.to,
                    failure = transition.is_failure(),
                    recovery = transition.is_recovery(),
                    "provider health changed"
                );
                report.transitions.push(transition);
            }

            self.history.push(&record);
            outcomes.extend(controller.observe(&mut failover, &record, now));
            health.insert(record.provider.clone(), record);
        }

        let next = RoutingState::new(current.topology.clone(), health, failover);
        next.record_metrics();
        let backup = next.primary().map(str::to_string);
        self.state.store(Arc::new(next));

        for outcome in outcomes {
            match outcome {
                FailoverOutcome::Failed {
                    provider,
                    reason,
                    retry_count,
                } => {
                    counters::failover(&provider);
                    report.failed.push(provider.clone());
                    self.events.publish(Event::ProviderFailed {
                        provider,
                        reason,
                        backup: backup.clone(),
                        retry_count,
                    });
                }
                FailoverOutcome::Recovered { provider, downtime } => {
                    counters::recovery(&provider);
                    report.recovered.push(provider.clone());
                    self.events
                        .publish(Event::ProviderRecovered { provider, downtime });
                }
            }
        }

        report
    }

    // ------------------------------------------------------------------
    // Reload
    // ------------------------------------------------------------------

    /// Replace the configuration. Health and failover state of surviving
    /// providers carry over; rejected credentials reset to `unhealthy` so
    /// the new ones get probed. On error the running state is untouched.
    pub async fn reload(&self, config: Config) -> Result<u64> {
        let _guard = self.writer.lock().await;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let topology = Arc::new(Topology::build(
            Arc::new(config),
            generation,
            self.factory.as_ref(),
        )?);
        let current = self.state.load_full();

        let health: HashMap<String, HealthRecord> = topology
            .enabled()
            .map(|p| {
                let name = &p.config.name;
                let record = match current.health.get(name) {
                    Some(r) if r.status == HealthStatus::Failed => {
                        r.clone().with_status(HealthStatus::Unhealthy)
                    }
                    Some(r) => r.clone(),
                    None => HealthRecord::seeded(name),
                };
                (name.clone(), record)
            })
            .collect();

        let failover = current
            .failover
            .iter()
            .filter(|(name, _)| topology.get(name).is_some_and(|p| p.config.enabled))
            .map(|(name, state)| {
                let mut state = state.clone();
                state.clear_credential_rejection();
                (name.clone(), state)
            })
            .collect();

        self.history
            .retain(|name| topology.get(name).is_some_and(|p| p.config.enabled));

        let next = RoutingState::new(topology, health, failover);
        next.record_metrics();
        let providers = next.topology.providers.len();

        info!(
            generation,
            providers,
            eligible = next.weights.entries().len(),
            primary = ?next.primary(),
            ignored_rules = next.topology.ignored_rules.len(),
            skipped_providers = next.topology.skipped_providers.len(),
            "configuration applied"
        );

        self.state.store(Arc::new(next));
        counters::config_reloaded();
        self.events.publish(Event::ConfigReloaded {
            generation,
            providers,
        });

        Ok(generation)
    }
}

async fn purge_with(handle: &ProviderHandle, scope: PurgeScope) -> Result<PurgeReport> {
    let provider = handle.name().to_string();
    let label = scope.label();

    let result = match &scope {
        PurgeScope::Urls(urls) => handle.purge_urls(urls).await,
        PurgeScope::All => handle.purge_all_cache().await,
    };

    counters::purge(&provider, label, result.is_ok());

    match result {
        Ok(()) => {
            let urls = match &scope {
                PurgeScope::Urls(urls) => urls.len(),
                PurgeScope::All => 0,
            };
            info!(provider = %provider, scope = label, urls, "cache purged");
            Ok(PurgeReport {
                provider,
                scope: label,
                urls,
            })
        }
        Err(source) => {
            warn!(provider = %provider, scope = label, error = %source, "purge failed");
            Err(Error::Provider { provider, source })
        }
    }
}
