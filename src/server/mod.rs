//! HTTP surface: catalog listings, the setup endpoint, and the progress
//! WebSocket, nested under the configured base path with a CORS allow-list.

pub mod ws;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};

use crate::catalog::Catalog;
use crate::config::{Config, CorsConfig};
use crate::domain::SetupRequest;
use crate::errors::InputError;
use crate::gateways::bitbucket::BitbucketApi;
use crate::gateways::confluence::ConfluenceApi;
use crate::gateways::ecr::EcrApi;
use crate::gateways::git::GitCommandLine;
use crate::gateways::vault::VaultApi;
use crate::orchestrator::Orchestrator;
use crate::progress::{ProgressStore, RedisProgressStore};
use crate::progress::bus::MessageBus;

// ── Shared application state ─────────────────────────────────────────

pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
    pub orchestrator: Arc<Orchestrator>,
    pub bus: Arc<MessageBus>,
    pub store: Arc<dyn ProgressStore>,
}

pub type SharedState = Arc<AppState>;

// ── Router ───────────────────────────────────────────────────────────

pub fn build_router(state: SharedState) -> Router {
    let base_path = format!("/{}", state.config.http.path.trim_matches('/'));
    let cors = cors_layer(&state.config.cors);
    let api = Router::new()
        .route("/templates", get(list_templates))
        .route("/environments", get(list_environments))
        .route("/squads", get(list_squads))
        .route("/ci-cd/data", get(ci_cd_data))
        .route("/ci-cd/setup", post(setup_ci_cd))
        .route("/ci-cd/progress/ws", get(ws::progress_ws));
    Router::new()
        .nest(&base_path, api)
        .layer(cors)
        .with_state(state)
}

fn cors_layer(cfg: &CorsConfig) -> CorsLayer {
    let mut layer = CorsLayer::new().max_age(cfg.max_age);

    let wildcard_origin = cfg.allowed_origins.iter().any(|o| o == "*");
    if wildcard_origin {
        layer = layer.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = cfg
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        layer = layer.allow_origin(origins);
    }

    if cfg.allowed_methods.iter().any(|m| m == "*") {
        layer = layer.allow_methods(Any);
    } else {
        let methods: Vec<Method> = cfg
            .allowed_methods
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();
        layer = layer.allow_methods(methods);
    }

    if cfg.allow_headers.iter().any(|h| h == "*") {
        layer = layer.allow_headers(Any);
    } else {
        let headers: Vec<axum::http::HeaderName> = cfg
            .allow_headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        layer = layer.allow_headers(headers);
    }

    let expose: Vec<axum::http::HeaderName> = cfg
        .expose_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();
    layer = layer.expose_headers(expose);

    // Credentials cannot be combined with a wildcard origin.
    if cfg.allow_credentials && !wildcard_origin {
        layer = layer.allow_credentials(true);
    }
    layer
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn list_templates(State(state): State<SharedState>) -> Response {
    Json(serde_json::json!({
        "status": "success",
        "data": state.catalog.templates(),
    }))
    .into_response()
}

async fn list_environments(State(state): State<SharedState>) -> Response {
    Json(serde_json::json!({
        "status": "success",
        "data": state.catalog.environments(),
    }))
    .into_response()
}

async fn list_squads(State(state): State<SharedState>) -> Response {
    Json(serde_json::json!({
        "status": "success",
        "data": state.catalog.squads(),
    }))
    .into_response()
}

async fn ci_cd_data(State(state): State<SharedState>) -> Response {
    Json(serde_json::json!({
        "status": "success",
        "data": {
            "repositoryBaseUrl": state.config.git.repository_url(""),
        },
    }))
    .into_response()
}

async fn setup_ci_cd(
    State(state): State<SharedState>,
    Json(request): Json<SetupRequest>,
) -> Response {
    let outcome = state.orchestrator.exec(request);
    if !outcome.errors.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "errors": format_errors(&outcome.errors),
                "message": "Setup data is invalid, please check the errors",
            })),
        )
            .into_response();
    }
    Json(serde_json::json!({
        "status": "success",
        "data": {"code": outcome.process_id},
        "message": "Process started",
    }))
    .into_response()
}

/// Group field errors by input path for the 400 body.
fn format_errors(errors: &[InputError]) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for error in errors {
        grouped
            .entry(error.input.clone())
            .or_default()
            .extend(error.messages.iter().cloned());
    }
    grouped
}

// ── Startup ──────────────────────────────────────────────────────────

/// Wire the production gateways and serve until interrupted.
pub async fn start_server(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let store: Arc<dyn ProgressStore> = Arc::new(
        RedisProgressStore::connect(&config.redis)
            .await
            .context("failed to initialize progress store")?,
    );
    let git = Arc::new(
        GitCommandLine::global_setup(config.git.clone())
            .await
            .context("failed to configure git")?,
    );
    let bus = Arc::new(MessageBus::new());
    let catalog = Arc::new(Catalog::builtin());
    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        catalog.clone(),
        bus.clone(),
        store.clone(),
        git,
        Arc::new(BitbucketApi::new(config.git.clone())),
        Arc::new(EcrApi::from_env().await),
        Arc::new(VaultApi::new(config.secret.clone())),
        Arc::new(ConfluenceApi::new(config.wiki.clone())),
    ));

    let state = Arc::new(AppState {
        config: config.clone(),
        catalog,
        orchestrator,
        bus,
        store,
    });
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "slipway backend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::test_support::{FailAt, Harness};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn test_state() -> (SharedState, Harness) {
        let harness = Harness::new(FailAt::Nowhere).await;
        let state = Arc::new(AppState {
            config: harness.config.clone(),
            catalog: Arc::new(Catalog::builtin()),
            orchestrator: harness.orchestrator.clone(),
            bus: harness.bus.clone(),
            store: harness.store.clone(),
        });
        (state, harness)
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn templates_endpoint_lists_catalog() {
        let (state, _harness) = test_state().await;
        let app = build_router(state);
        let resp = app
            .oneshot(Request::builder().uri("/api/templates").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["data"][0]["code"], "spring-boot");
        assert_eq!(json["data"][1]["code"], "react-js");
    }

    #[tokio::test]
    async fn environments_endpoint_lists_catalog() {
        let (state, _harness) = test_state().await;
        let app = build_router(state);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/environments")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        let codes: Vec<_> = json["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["code"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(codes, vec!["qa", "dev", "hml", "prd"]);
    }

    #[tokio::test]
    async fn squads_endpoint_lists_catalog() {
        let (state, _harness) = test_state().await;
        let app = build_router(state);
        let resp = app
            .oneshot(Request::builder().uri("/api/squads").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert!(json["data"].as_array().unwrap().len() >= 9);
    }

    #[tokio::test]
    async fn ci_cd_data_returns_repository_base_url() {
        let (state, _harness) = test_state().await;
        let app = build_router(state);
        let resp = app
            .oneshot(Request::builder().uri("/api/ci-cd/data").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["data"]["repositoryBaseUrl"], "https://bitbucket.org/tempo/");
    }

    #[tokio::test]
    async fn setup_accepts_a_valid_request_with_a_process_code() {
        let (state, harness) = test_state().await;
        let app = build_router(state);
        let body = serde_json::json!({
            "template": "spring-boot",
            "squad": "cd",
            "envs": [{"code": "qa", "replicas": {"min": 1, "max": 2}}],
            "manifests": ["aws-ecr"],
            "application": {
                "name": "Orders Svc",
                "rootPath": "/orders",
                "healthCheckPath": "/orders/actuator/health",
                "port": 8080,
                "resources": {"cpu": {"min": 0.05, "max": 0.3}, "memory": {"min": 256, "max": 512}}
            },
            "ingress": {"customHost": "", "customPath": "orders", "authentication": true}
        });
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/ci-cd/setup")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "success");
        assert_eq!(json["message"], "Process started");
        let code = json["data"]["code"].as_str().unwrap();
        uuid::Uuid::parse_str(code).expect("code is a process uuid");
        // keep the harness alive so the background workflow can run down
        drop(harness);
    }

    #[tokio::test]
    async fn setup_rejects_concurrent_environments_with_field_errors() {
        let (state, _harness) = test_state().await;
        let app = build_router(state);
        let body = serde_json::json!({
            "template": "spring-boot",
            "squad": "cd",
            "envs": [
                {"code": "qa", "replicas": {"min": 1, "max": 2}},
                {"code": "dev", "replicas": {"min": 1, "max": 2}}
            ],
            "manifests": ["aws-ecr"],
            "application": {
                "name": "Orders Svc",
                "rootPath": "/orders",
                "healthCheckPath": "/orders/actuator/health",
                "port": 8080,
                "resources": {"cpu": {"min": 0.05, "max": 0.3}, "memory": {"min": 256, "max": 512}}
            },
            "ingress": {"customHost": "", "customPath": "orders", "authentication": true}
        });
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/ci-cd/setup")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["message"], "Setup data is invalid, please check the errors");
        let errors = json["errors"].as_object().unwrap();
        assert!(errors.contains_key("env.qa") || errors.contains_key("env.dev"));
    }

    #[tokio::test]
    async fn setup_rejects_replicas_above_the_environment_ceiling() {
        let (state, _harness) = test_state().await;
        let app = build_router(state);
        let body = serde_json::json!({
            "template": "spring-boot",
            "squad": "cd",
            "envs": [{"code": "hml", "replicas": {"min": 6, "max": 10}}],
            "manifests": [],
            "application": {
                "name": "Orders Svc",
                "rootPath": "/orders",
                "healthCheckPath": "/orders/actuator/health",
                "port": 8080,
                "resources": {"cpu": {"min": 0.05, "max": 0.3}, "memory": {"min": 256, "max": 512}}
            },
            "ingress": {"customHost": "", "customPath": "orders", "authentication": true}
        });
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/ci-cd/setup")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(
            json["errors"]["env.hml.replicas.max"][0],
            "max cannot be greater than 5"
        );
    }

    #[test]
    fn format_errors_groups_messages_by_field() {
        let errors = vec![
            InputError::new("template", "template not found"),
            InputError::new("env.qa.replicas.min", "min cannot be greater than max"),
            InputError::new("env.qa.replicas.min", "min cannot be less than 1"),
        ];
        let grouped = format_errors(&errors);
        assert_eq!(grouped["template"], vec!["template not found"]);
        assert_eq!(grouped["env.qa.replicas.min"].len(), 2);
    }
}
