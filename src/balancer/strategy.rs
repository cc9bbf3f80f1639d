//! Load balancing strategies over a [`WeightTable`].
//!
//! Implement [`LoadBalancer`] to add a strategy; [`create`] maps the
//! configured kind onto the built-in ones.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;

use crate::config::LoadBalancer as LoadBalancerKind;

use super::weights::WeightTable;

/// Load balancer trait.
pub trait LoadBalancer: Send + Sync {
    /// Returns the name of this load balancer strategy.
    fn name(&self) -> &'static str;

    /// Select a provider. `None` when nothing is selectable.
    fn select<'a>(&self, table: &'a WeightTable) -> Option<&'a str>;
}

/// Build the configured strategy.
pub fn create(kind: LoadBalancerKind) -> Arc<dyn LoadBalancer> {
    match kind {
        LoadBalancerKind::WeightedRandom => Arc::new(WeightedRandom),
        LoadBalancerKind::RoundRobin => Arc::new(RoundRobin::new()),
        LoadBalancerKind::WeightedRoundRobin => Arc::new(WeightedRoundRobin::new()),
        LoadBalancerKind::Priority => Arc::new(Priority),
    }
}

/// Weighted random selection.
///
/// Draws uniformly in `[0, total)` and returns the first provider whose
/// cumulative weight exceeds the draw.
#[derive(Debug, Default)]
pub struct WeightedRandom;

impl WeightedRandom {
    /// Select with a caller-supplied RNG.
    pub fn select_with<'a, R: Rng + ?Sized>(
        &self,
        table: &'a WeightTable,
        rng: &mut R,
    ) -> Option<&'a str> {
        let total = table.total();
        if total == 0 {
            return None;
        }

        let point = rng.gen_range(0..total);
        pick(table, point)
    }
}

impl LoadBalancer for WeightedRandom {
    fn name(&self) -> &'static str {
        "weighted_random"
    }

    fn select<'a>(&self, table: &'a WeightTable) -> Option<&'a str> {
        self.select_with(table, &mut rand::thread_rng())
    }
}

/// Round-robin load balancer.
///
/// Cycles through selectable providers in preference order, ignoring
/// weights.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    /// Create a new round-robin load balancer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn select<'a>(&self, table: &'a WeightTable) -> Option<&'a str> {
        let count = table.selectable().count();
        if count == 0 {
            return None;
        }

        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % count;
        table.selectable().nth(idx).map(|e| e.provider.as_str())
    }
}

/// Weighted round-robin using a deterministic counter.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin {
    counter: AtomicUsize,
}

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for WeightedRoundRobin {
    fn name(&self) -> &'static str {
        "weighted_round_robin"
    }

    fn select<'a>(&self, table: &'a WeightTable) -> Option<&'a str> {
        let total = table.total() as usize;
        if total == 0 {
            return None;
        }

        let point = self.counter.fetch_add(1, Ordering::Relaxed) % total;
        pick(table, point as u32)
    }
}

/// Always the most preferred selectable provider.
#[derive(Debug, Default)]
pub struct Priority;

impl LoadBalancer for Priority {
    fn name(&self) -> &'static str {
        "priority"
    }

    fn select<'a>(&self, table: &'a WeightTable) -> Option<&'a str> {
        table.selectable().next().map(|e| e.provider.as_str())
    }
}

/// Provider whose cumulative weight range contains `point`.
fn pick(table: &WeightTable, point: u32) -> Option<&str> {
    let mut accumulated = 0u32;
    for entry in table.selectable() {
        accumulated += entry.weight;
        if point < accumulated {
            return Some(&entry.provider);
        }
    }
    None
}
