use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::router::RoutingDecision;

/// Events published by the orchestrator and daemon lifecycle.
#[derive(Debug, Clone)]
pub enum Event {
    /// Provider taken out of rotation
    ProviderFailed {
        provider: String,
        reason: String,
        /// Provider now preferred in its place
        backup: Option<String>,
        retry_count: u32,
    },

    /// Provider returned to rotation after its cooldown
    ProviderRecovered { provider: String, downtime: Duration },

    /// A routing call resolved (or failed to resolve) a provider
    RoutingDecision(RoutingDecision),

    /// Configuration reloaded
    ConfigReloaded { generation: u64, providers: usize },

    /// Daemon is starting
    Starting,

    /// Daemon is ready
    Ready,

    /// Shutdown initiated
    ShutdownStarted,

    /// Shutdown complete
    ShutdownComplete,
}

/// Synchronous event handlers.
///
/// Handlers run on the publishing task and must not block. Every method
/// has an empty default.
pub trait EventObserver: Send + Sync {
    fn on_provider_failed(&self, _provider: &str, _reason: &str, _backup: Option<&str>) {}

    fn on_provider_recovered(&self, _provider: &str, _downtime: Duration) {}

    fn on_routing_decision(&self, _decision: &RoutingDecision) {}
}

/// Observer that writes failover events to the log.
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl EventObserver for LoggingObserver {
    fn on_provider_failed(&self, provider: &str, reason: &str, backup: Option<&str>) {
        warn!(provider = %provider, reason = %reason, backup = ?backup, "failover: provider out of rotation");
    }

    fn on_provider_recovered(&self, provider: &str, downtime: Duration) {
        info!(provider = %provider, downtime_secs = downtime.as_secs(), "failover: provider back in rotation");
    }

    fn on_routing_decision(&self, decision: &RoutingDecision) {
        trace!(provider = ?decision.provider, reason = %decision.reason, "routing decision");
    }
}

/// Internal event bus for component communication
///
/// Uses a broadcast channel so multiple subscribers can follow events, and
/// dispatches to registered [`EventObserver`]s. Publishing takes no lock, so
/// routing decisions can be published from the request path.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    observers: ArcSwap<Vec<Arc<dyn EventObserver>>>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self {
            tx,
            observers: ArcSwap::from_pointee(Vec::new()),
        })
    }

    /// Register a handler
    pub fn register(&self, observer: Arc<dyn EventObserver>) {
        self.observers.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(observer.clone());
            next
        });
    }

    /// Publish an event
    pub fn publish(&self, event: Event) {
        if !matches!(event, Event::RoutingDecision(_)) {
            debug!(event = ?event, "publishing event");
        }

        for observer in self.observers.load().iter() {
            match &event {
                Event::ProviderFailed {
                    provider,
                    reason,
                    backup,
                    ..
                } => observer.on_provider_failed(provider, reason, backup.as_deref()),
                Event::ProviderRecovered { provider, downtime } => {
                    observer.on_provider_recovered(provider, *downtime)
                }
                Event::RoutingDecision(decision) => observer.on_routing_decision(decision),
                _ => {}
            }
        }

        // Ignore send errors (no subscribers)
        let _ = self.tx.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{RouteReason, RoutingContext};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl EventObserver for Recorder {
        fn on_provider_failed(&self, provider: &str, _reason: &str, backup: Option<&str>) {
            self.seen
                .lock()
                .push(format!("failed:{provider}->{}", backup.unwrap_or("-")));
        }

        fn on_provider_recovered(&self, provider: &str, _downtime: Duration) {
            self.seen.lock().push(format!("recovered:{provider}"));
        }
    }

    #[tokio::test]
    async fn test_event_bus() {
        let bus = EventBus::new(16);

        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(Event::Starting);

        assert!(matches!(rx1.recv().await.unwrap(), Event::Starting));
        assert!(matches!(rx2.recv().await.unwrap(), Event::Starting));
    }

    #[test]
    fn test_observers_dispatch() {
        let bus = EventBus::new(16);
        let recorder = Arc::new(Recorder::default());
        bus.register(recorder.clone());
        bus.register(Arc::new(LoggingObserver));

        bus.publish(Event::ProviderFailed {
            provider: "bunny".to_string(),
            reason: "timeout".to_string(),
            backup: Some("cloudflare".to_string()),
            retry_count: 1,
        });
        bus.publish(Event::RoutingDecision(RoutingDecision::new(
            None,
            RouteReason::NoneHealthy,
            RoutingContext::default(),
        )));
        bus.publish(Event::ProviderRecovered {
            provider: "bunny".to_string(),
            downtime: Duration::from_secs(300),
        });

        assert_eq!(
            *recorder.seen.lock(),
            vec!["failed:bunny->cloudflare", "recovered:bunny"]
        );
    }

    #[derive(Default)]
    struct DecisionCounter(AtomicUsize);

    impl EventObserver for DecisionCounter {
        fn on_routing_decision(&self, _decision: &RoutingDecision) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_routing_decisions_from_many_threads() {
        let bus = EventBus::new(1024);
        let counter = Arc::new(DecisionCounter::default());
        bus.register(counter.clone());
        let mut rx = bus.subscribe();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        bus.publish(Event::RoutingDecision(RoutingDecision::new(
                            None,
                            RouteReason::NoneHealthy,
                            RoutingContext::default(),
                        )));
                    }
                });
            }
            scope.spawn(|| bus.register(Arc::new(LoggingObserver)));
        });

        assert_eq!(counter.0.load(Ordering::Relaxed), 400);
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 400);
    }
}
