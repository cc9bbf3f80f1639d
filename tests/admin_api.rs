//! Admin API integration tests
//!
//! Starts the admin server on an ephemeral port over an orchestrator backed
//! by mock providers, then drives it over HTTP.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use cdnd::admin::{AdminServer, AdminState, HealthResponse, ReadinessResponse, RouteResponse};
use cdnd::bootstrap::{EventBus, Shutdown};
use cdnd::config::{Config, MemoryConfigStore};
use cdnd::provider::{DefaultProviderFactory, StaticCredentialResolver};
use cdnd::router::RouteReason;
use cdnd::telemetry::Metrics;
use cdnd::Orchestrator;

const CONFIG: &str = r#"
site:
  host: www.example.com

providers:
  - name: alpha
    kind: mock
    priority: 1
    cdn_host: alpha.cdn.net
  - name: beta
    kind: mock
    priority: 2
    cdn_host: beta.cdn.net
  - name: broken
    kind: mock
    priority: 3
    cdn_host: broken.cdn.net
    mock:
      mode: api_error

routing:
  geo_zones:
    - id: europe
      regions: [EU]
      providers: [beta]

health:
  retry:
    max_attempts: 1
"#;

#[derive(Debug, Deserialize)]
struct WeightsBody {
    primary: Option<String>,
    weights: Vec<WeightEntry>,
}

#[derive(Debug, Deserialize)]
struct WeightEntry {
    provider: String,
    weight: u32,
}

/// Test fixture that starts the server on a unique port
struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    orchestrator: Arc<Orchestrator>,
    store: Arc<MemoryConfigStore>,
    shutdown: Arc<Shutdown>,
    base_url: String,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let config = Config::from_yaml(CONFIG).unwrap();
        let store = Arc::new(MemoryConfigStore::new(config.clone()));

        let factory = Arc::new(DefaultProviderFactory::new(Arc::new(
            StaticCredentialResolver::new(),
        )));
        let orchestrator = Arc::new(Orchestrator::new(config, factory, EventBus::new(64)).unwrap());

        let metrics = Metrics::new().unwrap();
        let state = Arc::new(AdminState::new(orchestrator.clone(), metrics, store.clone()));
        let shutdown = Shutdown::new(Duration::from_secs(1));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        let server = AdminServer::new(&Default::default(), state, shutdown.clone());
        let handle = tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });

        Self {
            handle,
            orchestrator,
            store,
            shutdown,
            base_url: format!("http://{address}"),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.expect("request failed")
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("request failed")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn test_healthz_returns_healthy() {
    let server = TestServer::start().await;

    let resp = server.get("/healthz").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: HealthResponse = resp.json().await.expect("invalid json");
    assert_eq!(body.status, "healthy");
    assert!(!body.version.is_empty());
}

#[tokio::test]
async fn test_livez_returns_ok() {
    let server = TestServer::start().await;
    assert_eq!(server.get("/livez").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_readyz_tracks_eligible_providers() {
    let server = TestServer::start().await;

    let resp = server.get("/readyz").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: ReadinessResponse = resp.json().await.unwrap();
    assert!(body.ready);
    assert_eq!(body.eligible, 3);
    assert_eq!(body.primary.as_deref(), Some("alpha"));

    let down = r#"
site:
  host: www.example.com
providers:
  - name: alpha
    kind: mock
    cdn_host: alpha.cdn.net
    mock:
      mode: auth_error
health:
  retry:
    max_attempts: 1
"#;
    server
        .orchestrator
        .reload(Config::from_yaml(down).unwrap())
        .await
        .unwrap();
    server.orchestrator.run_health_cycle().await;

    let resp = server.get("/readyz").await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: ReadinessResponse = resp.json().await.unwrap();
    assert!(!body.ready);
    assert!(body.primary.is_none());
}

#[tokio::test]
async fn test_metrics_returns_prometheus_format() {
    let server = TestServer::start().await;
    server.orchestrator.run_health_cycle().await;

    let resp = server.get("/metrics").await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = resp.text().await.unwrap();
    assert!(body.contains("cdnd_health_probes_total"));
    assert!(body.contains("cdnd_eligible_providers"));
}

#[tokio::test]
async fn test_provider_state_after_health_cycle() {
    let server = TestServer::start().await;
    server.orchestrator.run_health_cycle().await;

    let health: Vec<Value> = server.get("/providers/health").await.json().await.unwrap();
    assert_eq!(health.len(), 3);
    let broken = health.iter().find(|r| r["provider"] == "broken").unwrap();
    assert_eq!(broken["status"], "unhealthy");
    assert!(broken["last_error"].is_string());

    let failover: Vec<Value> = server.get("/providers/failover").await.json().await.unwrap();
    assert_eq!(failover.len(), 1);
    assert_eq!(failover[0]["provider"], "broken");
    assert_eq!(failover[0]["state"], "failed");
    assert_eq!(failover[0]["retry_count"], 1);

    let weights: WeightsBody = server.get("/providers/weights").await.json().await.unwrap();
    assert_eq!(weights.primary.as_deref(), Some("alpha"));
    let pairs: Vec<(String, u32)> = weights
        .weights
        .into_iter()
        .map(|w| (w.provider, w.weight))
        .collect();
    assert_eq!(
        pairs,
        vec![("alpha".to_string(), 60), ("beta".to_string(), 40)]
    );
}

#[tokio::test]
async fn test_provider_stats_report_errors_per_provider() {
    let server = TestServer::start().await;

    let stats: Vec<Value> = server.get("/providers/stats").await.json().await.unwrap();
    assert_eq!(stats.len(), 3);

    let alpha = stats.iter().find(|s| s["provider"] == "alpha").unwrap();
    assert!(alpha["stats"].is_object());
    assert!(alpha.get("error").is_none());

    let broken = stats.iter().find(|s| s["provider"] == "broken").unwrap();
    assert!(broken.get("stats").is_none());
    assert!(broken["error"].is_string());
}

#[tokio::test]
async fn test_route_rewrites_url() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .get(server.url("/route"))
        .query(&[("url", "https://www.example.com/img/a.png"), ("region", "eu")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body: RouteResponse = resp.json().await.unwrap();
    assert_eq!(body.provider.as_deref(), Some("beta"));
    assert_eq!(body.reason, RouteReason::Geographic);
    assert_eq!(body.rewritten_url, "https://beta.cdn.net/img/a.png");
}

#[tokio::test]
async fn test_route_rejects_unknown_category() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .get(server.url("/route"))
        .query(&[("url", "https://www.example.com/a"), ("category", "fonts")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("fonts"));
}

#[tokio::test]
async fn test_purge_uses_primary_or_named_provider() {
    let server = TestServer::start().await;

    let resp = server
        .post("/purge", json!({"urls": ["https://alpha.cdn.net/img/a.png"]}))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["provider"], "alpha");
    assert_eq!(body["scope"], "urls");
    assert_eq!(body["urls"], 1);

    let resp = server
        .post("/purge", json!({"all": true, "provider": "beta"}))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["provider"], "beta");
    assert_eq!(body["scope"], "all");

    let resp = server
        .post("/purge", json!({"all": true, "provider": "broken"}))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    let resp = server
        .post("/purge", json!({"all": true, "provider": "missing"}))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = server.post("/purge", json!({})).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_config_reload_from_store() {
    let server = TestServer::start().await;

    let mut config = server.store.current();
    config.providers.retain(|p| p.name != "broken");
    server.store.update(config).unwrap();

    let resp = server.post("/config/reload", json!({})).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["reload_count"], 1);
    assert_eq!(body["generation"], 2);
    assert_eq!(body["providers"], 2);

    let health: Vec<Value> = server.get("/providers/health").await.json().await.unwrap();
    assert_eq!(health.len(), 2);
}

#[tokio::test]
async fn test_server_stops_on_shutdown() {
    let server = TestServer::start().await;
    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap();
    let resp = client.get(server.url("/livez")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    server.shutdown.start_drain();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(server.handle.is_finished());
}
