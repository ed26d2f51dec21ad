//! HTTP API for health checks and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use governor_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::FleetMetrics,
};
use prometheus::{proto::MetricFamily, Encoder, TextEncoder};
use std::sync::Arc;
use tracing::{info, warn};

const TEXT_PLAIN: [(&str, &str); 1] = [("content-type", "text/plain; charset=utf-8")];

type MetricsResponse = (StatusCode, [(&'static str, &'static str); 1], Vec<u8>);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: FleetMetrics,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, metrics: FleetMetrics) -> Self {
        Self {
            health_registry,
            metrics,
        }
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still governing
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    render_metrics(&state.metrics.gather())
}

fn render_metrics(families: &[MetricFamily]) -> MetricsResponse {
    let mut buffer = Vec::new();

    if let Err(e) = TextEncoder::new().encode(families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, TEXT_PLAIN, Vec::new());
    }

    (StatusCode::OK, TEXT_PLAIN, buffer)
}

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use governor_lib::{health::components, models::Tier};
    use tower::ServiceExt;

    async fn setup_test_app() -> (Router, Arc<AppState>) {
        let health_registry = HealthRegistry::new();
        health_registry.register_all().await;

        let state = Arc::new(AppState::new(health_registry, FleetMetrics::new()));
        (router(state.clone()), state)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_healthz_returns_ok_when_healthy() {
        let (app, _state) = setup_test_app().await;

        let (status, health) = get_json(app, "/healthz").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "healthy");
        assert!(health["components"]["inventory"].is_object());
        assert!(health["components"]["governor"].is_object());
        assert!(health["components"]["provisioner"].is_object());
    }

    #[tokio::test]
    async fn test_healthz_returns_ok_when_degraded() {
        let (app, state) = setup_test_app().await;
        state
            .health_registry
            .set_degraded(components::SNAPSHOT, "system snapshot unavailable")
            .await;

        let (status, health) = get_json(app, "/healthz").await;

        // Degraded still governs
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["status"], "degraded");
        assert_eq!(
            health["components"]["snapshot"]["message"],
            "system snapshot unavailable"
        );
    }

    #[tokio::test]
    async fn test_healthz_returns_503_when_unhealthy() {
        let (app, state) = setup_test_app().await;
        state
            .health_registry
            .set_unhealthy(components::RECORDER, "metrics store closed")
            .await;

        let (status, health) = get_json(app, "/healthz").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_readyz_follows_ready_flag() {
        let (app, state) = setup_test_app().await;

        let (status, readiness) = get_json(app.clone(), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(readiness["ready"], false);

        state.health_registry.set_ready(true).await;

        let (status, readiness) = get_json(app, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(readiness["ready"], true);
    }

    #[tokio::test]
    async fn test_readyz_returns_503_when_ready_but_unhealthy() {
        let (app, state) = setup_test_app().await;
        state.health_registry.set_ready(true).await;
        state
            .health_registry
            .set_unhealthy(components::INVENTORY, "runtime binary missing")
            .await;

        let (status, _) = get_json(app, "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_returns_prometheus_format() {
        let (app, state) = setup_test_app().await;
        state.metrics.observe_cycle(0.02);
        state.metrics.set_tier_count(Tier::Low, 3);
        state.metrics.add_evictions(2, 0);
        state.metrics.record_provisioning(true);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(text.contains("fleet_governor_cycle_latency_seconds_bucket"));
        assert!(text.contains("fleet_governor_containers{tier=\"low\"}"));
        assert!(text.contains("fleet_governor_evictions_total"));
        assert!(text.contains("fleet_governor_provisioning_runs_total"));
    }

    #[test]
    fn test_unencodable_families_answer_500() {
        // A family with neither a name nor samples is rejected by the text encoder
        let (status, headers, body) = render_metrics(&[MetricFamily::default()]);

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(headers, TEXT_PLAIN);
        assert!(body.is_empty());
    }
}
