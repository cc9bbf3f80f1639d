//! Selection weights.

use serde::Serialize;

use crate::config::ProviderConfig;
use crate::health::HealthStatus;

/// Weights always sum to this when any provider is selectable.
pub const WEIGHT_SCALE: u32 = 100;

/// Normalized weight of one eligible provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderWeight {
    pub provider: String,
    pub priority: u32,
    pub weight: u32,
}

/// Eligible providers in preference order (priority, then config order)
/// with weights normalized to [`WEIGHT_SCALE`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct WeightTable {
    entries: Vec<ProviderWeight>,
}

impl WeightTable {
    /// Compute weights for the enabled providers.
    ///
    /// Base weight is the explicit `weight` when configured, otherwise
    /// `max_priority + 1 - priority` over the enabled set. With
    /// `latency_aware`, slow providers get half their base weight.
    pub fn compute<E, S>(
        providers: &[ProviderConfig],
        is_eligible: E,
        status_of: S,
        latency_aware: bool,
    ) -> Self
    where
        E: Fn(&str) -> bool,
        S: Fn(&str) -> Option<HealthStatus>,
    {
        let enabled: Vec<&ProviderConfig> = providers.iter().filter(|p| p.enabled).collect();
        let max_priority = enabled.iter().map(|p| p.priority).max().unwrap_or(0);

        let mut eligible: Vec<(&ProviderConfig, u64)> = enabled
            .into_iter()
            .filter(|p| is_eligible(&p.name))
            .map(|p| {
                let base = p
                    .weight
                    .unwrap_or_else(|| max_priority.saturating_sub(p.priority) + 1);
                // Doubled so halving stays integral
                let mut raw = u64::from(base) * 2;
                if latency_aware && status_of(&p.name) == Some(HealthStatus::Slow) {
                    raw /= 2;
                }
                (p, raw)
            })
            .collect();

        eligible.sort_by_key(|(p, _)| p.priority);

        let raw: Vec<u64> = eligible.iter().map(|(_, w)| *w).collect();
        let normalized = normalize(&raw, WEIGHT_SCALE);

        Self {
            entries: eligible
                .into_iter()
                .zip(normalized)
                .map(|((p, _), weight)| ProviderWeight {
                    provider: p.name.clone(),
                    priority: p.priority,
                    weight,
                })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[ProviderWeight] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all weights.
    pub fn total(&self) -> u32 {
        self.entries.iter().map(|e| e.weight).sum()
    }

    pub fn get(&self, provider: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.provider == provider)
            .map(|e| e.weight)
    }

    /// Most preferred eligible provider.
    pub fn primary(&self) -> Option<&str> {
        self.entries.first().map(|e| e.provider.as_str())
    }

    /// Entries that can actually be drawn.
    pub fn selectable(&self) -> impl Iterator<Item = &ProviderWeight> {
        self.entries.iter().filter(|e| e.weight > 0)
    }
}

/// Scale integer weights to sum exactly to `scale` using largest remainder.
/// Zero stays zero. All-zero input stays all-zero.
pub fn normalize(raw: &[u64], scale: u32) -> Vec<u32> {
    let total: u64 = raw.iter().sum();
    if total == 0 {
        return vec![0; raw.len()];
    }

    let scale = u64::from(scale);
    let mut out: Vec<u32> = Vec::with_capacity(raw.len());
    let mut remainders: Vec<(usize, u64)> = Vec::with_capacity(raw.len());

    for (i, w) in raw.iter().enumerate() {
        let scaled = w * scale;
        out.push((scaled / total) as u32);
        remainders.push((i, scaled % total));
    }

    let assigned: u64 = out.iter().map(|w| u64::from(*w)).sum();
    let missing = (scale - assigned) as usize;

    // Largest remainder first, earlier entries win ties
    remainders.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    for (i, _) in remainders.into_iter().take(missing) {
        out[i] += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;

    fn provider(name: &str, priority: u32, weight: Option<u32>) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            kind: ProviderKind::Mock,
            enabled: true,
            priority,
            weight,
            credential: String::new(),
            api_endpoint: None,
            cdn_host: format!("{name}.example.net"),
            zone: None,
            mock: None,
        }
    }

    fn weights(table: &WeightTable) -> Vec<(&str, u32)> {
        table
            .entries()
            .iter()
            .map(|e| (e.provider.as_str(), e.weight))
            .collect()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(&[3, 2, 1], 100), vec![50, 33, 17]);
        assert_eq!(normalize(&[2, 1], 100), vec![67, 33]);
        assert_eq!(normalize(&[1, 1, 1], 100), vec![34, 33, 33]);
        assert_eq!(normalize(&[70, 30], 100), vec![70, 30]);
        assert_eq!(normalize(&[0, 5], 100), vec![0, 100]);
        assert_eq!(normalize(&[0, 0], 100), vec![0, 0]);
        assert!(normalize(&[], 100).is_empty());
    }

    #[test]
    fn test_priority_derived_weights() {
        let providers = vec![
            provider("c", 3, None),
            provider("a", 1, None),
            provider("b", 2, None),
        ];
        let table = WeightTable::compute(&providers, |_| true, |_| None, true);

        assert_eq!(weights(&table), vec![("a", 50), ("b", 33), ("c", 17)]);
        assert_eq!(table.total(), 100);
        assert_eq!(table.primary(), Some("a"));
    }

    #[test]
    fn test_ineligible_excluded_and_renormalized() {
        let providers = vec![
            provider("a", 1, None),
            provider("b", 2, None),
            provider("c", 3, None),
        ];
        let table = WeightTable::compute(&providers, |p| p != "a", |_| None, true);

        assert_eq!(weights(&table), vec![("b", 67), ("c", 33)]);
        assert_eq!(table.get("a"), None);
        assert_eq!(table.primary(), Some("b"));
    }

    #[test]
    fn test_explicit_weights_override() {
        let providers = vec![provider("a", 1, Some(70)), provider("b", 2, Some(30))];
        let table = WeightTable::compute(&providers, |_| true, |_| None, true);
        assert_eq!(weights(&table), vec![("a", 70), ("b", 30)]);
    }

    #[test]
    fn test_slow_providers_halved() {
        let providers = vec![provider("a", 1, Some(50)), provider("b", 1, Some(50))];
        let status = |p: &str| (p == "b").then_some(HealthStatus::Slow);

        let table = WeightTable::compute(&providers, |_| true, status, true);
        assert_eq!(weights(&table), vec![("a", 67), ("b", 33)]);

        let table = WeightTable::compute(&providers, |_| true, status, false);
        assert_eq!(weights(&table), vec![("a", 50), ("b", 50)]);
    }

    #[test]
    fn test_zero_weight_never_selectable() {
        let providers = vec![provider("a", 1, Some(0)), provider("b", 2, Some(10))];
        let table = WeightTable::compute(&providers, |_| true, |_| None, true);

        assert_eq!(weights(&table), vec![("a", 0), ("b", 100)]);
        let selectable: Vec<_> = table.selectable().map(|e| e.provider.as_str()).collect();
        assert_eq!(selectable, vec!["b"]);
    }

    #[test]
    fn test_disabled_and_none_eligible() {
        let mut disabled = provider("a", 1, None);
        disabled.enabled = false;
        let providers = vec![disabled, provider("b", 5, None)];

        let table = WeightTable::compute(&providers, |_| true, |_| None, true);
        assert_eq!(weights(&table), vec![("b", 100)]);

        let table = WeightTable::compute(&providers, |_| false, |_| None, true);
        assert!(table.is_empty());
        assert_eq!(table.primary(), None);
    }
}
