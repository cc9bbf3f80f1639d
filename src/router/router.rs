//! Preference-table router.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace, warn};

use crate::config::{ConfigError, ContentRuleConfig, GeoZoneConfig};

use super::context::{ContentCategory, RouteReason, RoutingContext};

/// A compiled geographic zone.
#[derive(Debug, Clone)]
struct GeoZone {
    id: String,
    /// Upper-cased region codes
    regions: HashSet<String>,
    providers: Vec<String>,
}

/// Geographic and content-type router.
///
/// Walks the geo zones (config order) whose region set contains the
/// request region, then the content rule for the request category, and
/// returns the first eligible preferred provider. Returns `None` when no
/// table yields a candidate so the caller can fall back to load balancing.
#[derive(Debug, Clone, Default)]
pub struct Router {
    zones: Vec<GeoZone>,
    content: HashMap<ContentCategory, Vec<String>>,
}

impl Router {
    /// Compile the preference tables.
    ///
    /// Malformed rules are dropped; the returned errors describe each one.
    /// The remaining rules still apply.
    pub fn new<'a>(
        geo_zones: &[GeoZoneConfig],
        content_rules: &[ContentRuleConfig],
        known_providers: impl IntoIterator<Item = &'a str>,
    ) -> (Self, Vec<ConfigError>) {
        let known: HashSet<&str> = known_providers.into_iter().collect();
        let mut errors = Vec::new();

        let mut zones = Vec::with_capacity(geo_zones.len());
        for zone in geo_zones {
            let rule = format!("geo:{}", zone.id);
            let regions: HashSet<String> = zone
                .regions
                .iter()
                .map(|r| r.trim().to_ascii_uppercase())
                .filter(|r| !r.is_empty())
                .collect();

            if regions.is_empty() {
                errors.push(ConfigError::InvalidRule {
                    rule,
                    reason: "zone has no regions".to_string(),
                });
                continue;
            }

            match compile_rule(&rule, &zone.providers, &known) {
                Ok(providers) => zones.push(GeoZone {
                    id: zone.id.clone(),
                    regions,
                    providers,
                }),
                Err(err) => errors.push(err),
            }
        }

        let mut content = HashMap::new();
        for rule_config in content_rules {
            let rule = format!("content:{}", rule_config.category);
            if content.contains_key(&rule_config.category) {
                errors.push(ConfigError::InvalidRule {
                    rule,
                    reason: "duplicate content rule".to_string(),
                });
                continue;
            }
            match compile_rule(&rule, &rule_config.providers, &known) {
                Ok(providers) => {
                    content.insert(rule_config.category, providers);
                }
                Err(err) => errors.push(err),
            }
        }

        for err in &errors {
            warn!(error = %err, "routing rule ignored");
        }

        debug!(
            geo_zones = zones.len(),
            content_rules = content.len(),
            ignored = errors.len(),
            "router created"
        );

        (Self { zones, content }, errors)
    }

    /// Pick a preferred provider for the context.
    ///
    /// `is_eligible` reports whether a provider may serve traffic right now.
    pub fn select_candidate<F>(
        &self,
        context: &RoutingContext,
        is_eligible: F,
    ) -> Option<(String, RouteReason)>
    where
        F: Fn(&str) -> bool,
    {
        if let Some(region) = context.region.as_deref() {
            let region = region.trim().to_ascii_uppercase();
            for zone in self.zones.iter().filter(|z| z.regions.contains(&region)) {
                if let Some(provider) = zone.providers.iter().find(|p| is_eligible(p)) {
                    trace!(zone = %zone.id, region = %region, provider = %provider, "geo route matched");
                    return Some((provider.clone(), RouteReason::Geographic));
                }
            }
        }

        if let Some(category) = context.content_category {
            if let Some(providers) = self.content.get(&category) {
                if let Some(provider) = providers.iter().find(|p| is_eligible(p)) {
                    trace!(category = %category, provider = %provider, "content route matched");
                    return Some((provider.clone(), RouteReason::Content));
                }
            }
        }

        None
    }

    /// Number of active geo zones.
    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    /// Number of active content rules.
    pub fn content_rule_count(&self) -> usize {
        self.content.len()
    }
}

fn compile_rule(
    rule: &str,
    providers: &[String],
    known: &HashSet<&str>,
) -> Result<Vec<String>, ConfigError> {
    if providers.is_empty() {
        return Err(ConfigError::InvalidRule {
            rule: rule.to_string(),
            reason: "no preferred providers".to_string(),
        });
    }

    if let Some(unknown) = providers.iter().find(|p| !known.contains(p.as_str())) {
        return Err(ConfigError::UnknownProvider {
            rule: rule.to_string(),
            provider: unknown.clone(),
        });
    }

    Ok(providers.to_vec())
}
