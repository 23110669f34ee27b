//! HTTP trigger: one endpoint that runs a sweep and answers with a summary line.
//!
//! Every request reloads configuration from the environment, builds a fresh
//! registry client, and runs the sweep to completion before responding.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use sweeper_core::impls::{AcrRegistryClient, ClientSecretCredential};
use sweeper_core::ports::{Clock, RegistryClient};
use sweeper_core::{CancelSignal, RetentionCleanupJob, RunStatus, SweeperConfig};

pub const CLEANUP_ROUTE: &str = "/api/CleanupRegistry";

/// Reads one configuration key.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Builds the registry collaborator for one invocation.
pub trait RegistryConnector: Send + Sync {
    fn connect(&self, config: &SweeperConfig) -> Arc<dyn RegistryClient>;
}

/// Client-secret credential against an ACR-compatible endpoint.
pub struct AcrConnector;

impl RegistryConnector for AcrConnector {
    fn connect(&self, config: &SweeperConfig) -> Arc<dyn RegistryClient> {
        let credential = ClientSecretCredential::new(
            &config.registry_endpoint,
            &config.tenant_id,
            &config.client_id,
            &config.client_secret,
        );
        Arc::new(AcrRegistryClient::new(
            &config.registry_endpoint,
            Arc::new(credential),
        ))
    }
}

pub struct TriggerState {
    pub env: EnvLookup,
    pub connector: Arc<dyn RegistryConnector>,
    pub clock: Arc<dyn Clock>,
    pub cancel: CancelSignal,
}

pub fn router(state: Arc<TriggerState>) -> Router {
    Router::new()
        .route(CLEANUP_ROUTE, get(cleanup_registry).post(cleanup_registry))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - liveness only, does not touch the registry.
async fn health() -> &'static str {
    "ok"
}

/// GET|POST /api/CleanupRegistry
///
/// - `200 OK` with `Cleanup Complete - Deleted: N Safe: M`
/// - `500` when configuration is missing or invalid
/// - `502` when listing the registry fails (partial counts in the body)
/// - `503` when the process is shutting down mid-sweep
async fn cleanup_registry(State(state): State<Arc<TriggerState>>) -> Response {
    tracing::info!("cleanup trigger processed a request");

    let config = match SweeperConfig::from_lookup(|key| (state.env)(key)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "refusing to run with invalid configuration");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("configuration error: {e}"),
            )
                .into_response();
        }
    };

    let client = state.connector.connect(&config);
    let job = RetentionCleanupJob::new(Arc::clone(&state.clock), config.sweep_options());

    match job
        .run_until_cancelled(&config.policy(), client.as_ref(), &state.cancel)
        .await
    {
        Ok(result) if result.status == RunStatus::Cancelled => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!(
                "Cleanup Cancelled - Deleted: {} Safe: {}",
                result.deleted_images.len(),
                result.ignored_images.len()
            ),
        )
            .into_response(),
        Ok(result) => (StatusCode::OK, result.summary()).into_response(),
        Err(e) => {
            tracing::error!(error = %e, kind = ?e.kind(), "cleanup failed");
            let partial = e.partial();
            (
                StatusCode::BAD_GATEWAY,
                format!(
                    "Cleanup Failed - {e} (partial: Deleted: {} Safe: {})",
                    partial.deleted_images.len(),
                    partial.ignored_images.len()
                ),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use sweeper_core::impls::{InMemoryRegistry, RegistryCall};
    use sweeper_core::ports::FixedClock;
    use sweeper_core::{ArtifactManifest, RegistryError};
    use tower::ServiceExt;

    struct Fixed(Arc<InMemoryRegistry>);

    impl RegistryConnector for Fixed {
        fn connect(&self, _config: &SweeperConfig) -> Arc<dyn RegistryClient> {
            self.0.clone()
        }
    }

    fn env(pairs: &[(&str, &str)]) -> EnvLookup {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Arc::new(move |key: &str| vars.get(key).cloned())
    }

    fn full_env(extra: &[(&str, &str)]) -> EnvLookup {
        let mut pairs = vec![
            ("RegistryUrl", "https://example.azurecr.io"),
            ("TenantId", "tenant"),
            ("ClientId", "client"),
            ("ClientSecret", "secret"),
            ("RetentionDays", "30"),
        ];
        pairs.extend_from_slice(extra);
        env(&pairs)
    }

    fn registry() -> Arc<InMemoryRegistry> {
        let at = |m, d| Utc.with_ymd_and_hms(2024, m, d, 0, 0, 0).unwrap();
        Arc::new(InMemoryRegistry::new().with_repository(
            "web",
            vec![
                ArtifactManifest::new("web", "sha256:a", at(4, 1))
                    .with_tag("v1")
                    .with_tag("latest"),
                ArtifactManifest::new("web", "sha256:b", at(5, 15)).with_tag("v2"),
            ],
        ))
    }

    fn app(env: EnvLookup, registry: Arc<InMemoryRegistry>, cancel: CancelSignal) -> Router {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        router(Arc::new(TriggerState {
            env,
            connector: Arc::new(Fixed(registry)),
            clock: Arc::new(FixedClock::new(now)),
            cancel,
        }))
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        (status, String::from_utf8_lossy(&body).to_string())
    }

    #[tokio::test]
    async fn get_runs_the_sweep_and_renders_summary() {
        let registry = registry();
        let app = app(full_env(&[]), registry.clone(), CancelSignal::never());

        let (status, body) = call(app, "GET", CLEANUP_ROUTE).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Cleanup Complete - Deleted: 1 Safe: 1");
        assert_eq!(registry.delete_calls().len(), 3);
    }

    #[tokio::test]
    async fn post_is_accepted_too() {
        let app = app(full_env(&[]), registry(), CancelSignal::never());
        let (status, _) = call(app, "POST", CLEANUP_ROUTE).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn dry_run_setting_skips_deletes() {
        let registry = registry();
        let app = app(
            full_env(&[("SweepDryRun", "true")]),
            registry.clone(),
            CancelSignal::never(),
        );

        let (status, body) = call(app, "GET", CLEANUP_ROUTE).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Cleanup Complete - Deleted: 1 Safe: 1");
        assert!(registry.delete_calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_retention_days_fails_before_touching_the_registry() {
        let registry = registry();
        let app = app(
            full_env(&[("RetentionDays", "abc")]),
            registry.clone(),
            CancelSignal::never(),
        );

        let (status, body) = call(app, "GET", CLEANUP_ROUTE).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.starts_with("configuration error: invalid value for RetentionDays"));
        assert!(registry.calls().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_retention_days_is_a_configuration_error() {
        let registry = registry();
        let app = app(
            full_env(&[("RetentionDays", "100000000")]),
            registry.clone(),
            CancelSignal::never(),
        );

        let (status, body) = call(app, "GET", CLEANUP_ROUTE).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("exceeds the maximum"));
        assert!(registry.calls().is_empty());
    }

    #[tokio::test]
    async fn listing_failure_is_a_bad_gateway() {
        let registry = Arc::new(
            InMemoryRegistry::new()
                .fail_repository_listing_after(0, RegistryError::Unauthorized("denied".into())),
        );
        let app = app(full_env(&[]), registry, CancelSignal::never());

        let (status, body) = call(app, "GET", CLEANUP_ROUTE).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("denied"));
        assert!(body.ends_with("(partial: Deleted: 0 Safe: 0)"));
    }

    #[tokio::test]
    async fn shutdown_cancels_the_sweep() {
        let registry = registry();
        let (handle, signal) = CancelSignal::channel();
        handle.cancel();
        let app = app(full_env(&[]), registry.clone(), signal);

        let (status, body) = call(app, "GET", CLEANUP_ROUTE).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "Cleanup Cancelled - Deleted: 0 Safe: 0");
        assert_eq!(registry.calls(), vec![RegistryCall::ListRepositories]);
    }

    #[tokio::test]
    async fn health_is_static() {
        let app = app(env(&[]), registry(), CancelSignal::never());
        let (status, body) = call(app, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
