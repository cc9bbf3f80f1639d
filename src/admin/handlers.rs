//! Admin API handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::balancer::ProviderWeight;
use crate::error::Error;
use crate::orchestrator::PurgeScope;
use crate::router::{ContentCategory, RouteReason, RoutingContext};

use super::server::ReloadResult;
use super::AdminState;

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Handler error mapped to a status code.
pub struct ApiError(StatusCode, String);

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, message.into())
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::NoActiveProvider => StatusCode::SERVICE_UNAVAILABLE,
            Error::UnknownProvider(_) => StatusCode::NOT_FOUND,
            Error::Provider { .. } => StatusCode::BAD_GATEWAY,
            Error::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorResponse { error: self.1 })).into_response()
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Health check handler. The process is alive whenever it answers.
pub async fn health_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime().as_secs(),
    })
}

/// Live handler (for Kubernetes).
pub async fn live_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub eligible: usize,
    pub primary: Option<String>,
}

/// Ready when at least one provider is eligible.
pub async fn ready_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    let snapshot = state.orchestrator().snapshot();
    let eligible = snapshot.weights.entries().len();
    let response = ReadinessResponse {
        ready: eligible > 0,
        eligible,
        primary: snapshot.primary().map(str::to_string),
    };

    let status = if response.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

/// Metrics handler (Prometheus format).
pub async fn metrics_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    match state.metrics().render() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Error encoding metrics: {e}"),
        ),
    }
}

/// GET /providers/health
pub async fn provider_health_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    Json(state.orchestrator().get_health_snapshot())
}

/// GET /providers/failover
pub async fn failover_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    Json(state.orchestrator().get_failover_snapshot())
}

/// Weights response.
#[derive(Debug, Clone, Serialize)]
pub struct WeightsResponse {
    pub primary: Option<String>,
    pub weights: Vec<ProviderWeight>,
}

/// GET /providers/weights
pub async fn weights_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    let snapshot = state.orchestrator().snapshot();
    Json(WeightsResponse {
        primary: snapshot.primary().map(str::to_string),
        weights: snapshot.weights.entries().to_vec(),
    })
}

/// GET /providers/stats
pub async fn stats_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    Json(state.orchestrator().get_statistics().await)
}

#[derive(Debug, Deserialize)]
pub struct RouteQuery {
    pub url: String,
    pub region: Option<String>,
    pub category: Option<String>,
}

/// Routing decision for one URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResponse {
    pub url: String,
    pub rewritten_url: String,
    pub provider: Option<String>,
    pub reason: RouteReason,
    pub context: RoutingContext,
}

/// GET /route?url=&region=&category=
///
/// The category is inferred from the URL path unless given explicitly.
pub async fn route_handler(
    State(state): State<Arc<AdminState>>,
    Query(query): Query<RouteQuery>,
) -> Result<Json<RouteResponse>, ApiError> {
    let mut context = RoutingContext::for_url(&query.url);
    if let Some(region) = query.region.filter(|r| !r.is_empty()) {
        context = context.with_region(region);
    }
    if let Some(category) = query.category.filter(|c| !c.is_empty()) {
        let category: ContentCategory = category.parse().map_err(ApiError::bad_request)?;
        context = context.with_category(category);
    }

    let (rewritten_url, decision) = state.orchestrator().resolve(&query.url, &context);

    Ok(Json(RouteResponse {
        url: query.url,
        rewritten_url,
        provider: decision.provider,
        reason: decision.reason,
        context: decision.context,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PurgeRequest {
    #[serde(default)]
    pub urls: Option<Vec<String>>,
    #[serde(default)]
    pub all: bool,
    /// Purge this provider instead of the primary
    #[serde(default)]
    pub provider: Option<String>,
}

impl PurgeRequest {
    fn scope(self) -> Result<(PurgeScope, Option<String>), ApiError> {
        let scope = match (self.urls, self.all) {
            (Some(_), true) => {
                return Err(ApiError::bad_request("specify either urls or all, not both"))
            }
            (Some(urls), false) if urls.is_empty() => {
                return Err(ApiError::bad_request("urls must not be empty"))
            }
            (Some(urls), false) => PurgeScope::Urls(urls),
            (None, true) => PurgeScope::All,
            (None, false) => return Err(ApiError::bad_request("specify urls or all")),
        };
        Ok((scope, self.provider))
    }
}

/// POST /purge
pub async fn purge_handler(
    State(state): State<Arc<AdminState>>,
    Json(request): Json<PurgeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (scope, provider) = request.scope()?;
    let orchestrator = state.orchestrator();

    let report = match provider {
        Some(name) => orchestrator.purge_provider(&name, scope).await?,
        None => orchestrator.purge(scope).await?,
    };

    Ok(Json(report))
}

/// POST /config/reload - reload configuration from the store
pub async fn reload_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    match state.reload_config().await {
        Ok(result) => (StatusCode::OK, Json(result)),
        Err(error) => {
            let result = ReloadResult {
                success: false,
                message: error,
                reload_count: state.reload_count(),
                generation: None,
                providers: 0,
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(result))
        }
    }
}
