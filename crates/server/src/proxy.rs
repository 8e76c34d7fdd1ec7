//! Interactive test surface used by the editor.

use crate::app::AppState;
use axum::{
    Extension, Json,
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mcp_workspace_http_tools::compile::compile_for_test;
use mcp_workspace_http_tools::contract::parse_schema_text;
use mcp_workspace_http_tools::model::ToolDefinition;
use mcp_workspace_http_tools::runtime::ExecutionResult;
use mcp_workspace_http_tools::template::validate_variables;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Execute a tool definition exactly as stored (placeholders are sent verbatim).
///
/// Execution failures answer `502` with a degraded result so the editor always has something
/// to render.
pub async fn test_request(
    Extension(state): Extension<Arc<AppState>>,
    Path(wid): Path<String>,
    Json(tool): Json<ToolDefinition>,
) -> Response {
    if tool.url.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "URL is required" })),
        )
            .into_response();
    }

    let request = compile_for_test(&tool);
    match state.executor.execute(tool.method_or_default(), &request).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => {
            warn!(workspace = %wid, tool = %tool.capability_name(), error = %e, "test request failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(ExecutionResult::degraded(e.to_string())),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    missing: Vec<String>,
}

/// Template variables referenced by the tool but not declared in its input schema.
pub async fn validate_request(Json(tool): Json<ToolDefinition>) -> Json<ValidateResponse> {
    let request = compile_for_test(&tool);
    let schema = parse_schema_text(&tool.input_schema);
    Json(ValidateResponse {
        missing: validate_variables(&request, schema.as_ref()),
    })
}
