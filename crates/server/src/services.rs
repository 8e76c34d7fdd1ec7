//! Workspace document routes (editor persistence).

use crate::app::AppState;
use crate::store::WorkspaceDocument;
use axum::{
    Extension, Json,
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    #[serde(default)]
    services: Value,
    #[serde(default)]
    wid_hash: Option<String>,
}

pub async fn get_services(
    Extension(state): Extension<Arc<AppState>>,
    Path(wid): Path<String>,
) -> Response {
    match state.store.get(&wid).await {
        Ok(Some(doc)) if doc.services.is_array() => Json(doc.services).into_response(),
        Ok(Some(_)) => {
            warn!(workspace = %wid, "stored services are not a list; returning empty");
            Json(json!([])).into_response()
        }
        Ok(None) => Json(json!([])).into_response(),
        Err(e) => {
            error!(workspace = %wid, error = %e, "failed to load workspace");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Full replace of a workspace's services (last write wins).
pub async fn put_services_batch(
    Extension(state): Extension<Arc<AppState>>,
    Path(wid): Path<String>,
    Json(req): Json<BatchRequest>,
) -> Response {
    let Some(count) = req.services.as_array().map(Vec::len) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "services must be an array" })),
        )
            .into_response();
    };

    let doc = WorkspaceDocument::new(&wid, req.wid_hash, req.services);
    let services = doc.services.clone();
    if let Err(e) = state.store.put(doc).await {
        error!(workspace = %wid, error = %e, "failed to store workspace");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response();
    }

    info!(workspace = %wid, services = count, "workspace services replaced");
    Json(services).into_response()
}
