use crate::store::WorkspaceStore;
use crate::{mcp, proxy, services};
use axum::{
    Extension, Json, Router,
    response::IntoResponse,
    routing::{any, get, post, put},
};
use mcp_workspace_http_tools::runtime::HttpExecutor;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub store: Arc<dyn WorkspaceStore>,
    pub executor: HttpExecutor,
    /// Cancelled on shutdown; MCP transports run on child tokens.
    pub shutdown: CancellationToken,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn WorkspaceStore>, executor: HttpExecutor) -> Self {
        Self {
            store,
            executor,
            shutdown: CancellationToken::new(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .route(
            "/api/workspace/{wid}/mcp-services",
            get(services::get_services),
        )
        .route(
            "/api/workspace/{wid}/mcp-services/batch",
            put(services::put_services_batch),
        )
        .route("/api/workspace/{wid}/proxy/test", post(proxy::test_request))
        .route(
            "/api/workspace/{wid}/proxy/validate",
            post(proxy::validate_request),
        )
        .route(
            "/workspace/{wid_hash}/mcp/{service_id}",
            any(mcp::service_endpoint),
        )
        .layer(Extension(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn banner() -> &'static str {
    "MCP Workspace Backend"
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "time": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    }))
}
