//! Per-service MCP endpoint (streamable HTTP, stateless).
//!
//! Every inbound request rebuilds the service's tool surface from the stored document, so edits
//! are visible on the next call without any cache invalidation.

use crate::app::AppState;
use axum::{
    Extension, Json,
    body::Body,
    extract::{Path, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mcp_workspace_http_tools::model::{ServiceDefinition, services_from_value};
use mcp_workspace_http_tools::source::{ServiceToolSource, forwardable_headers};
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Implementation, JsonObject, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use rmcp::{ErrorData, RoleServer, ServerHandler};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// MCP server exposing one stored service's tools.
#[derive(Clone)]
pub struct ServiceMcpServer {
    source: ServiceToolSource,
}

impl ServiceMcpServer {
    #[must_use]
    pub fn new(source: ServiceToolSource) -> Self {
        Self { source }
    }
}

impl ServerHandler for ServiceMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: self.source.name().to_string(),
                version: self.source.version().to_string(),
                ..Default::default()
            },
            instructions: self.source.description().map(str::to_string),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: self.source.list_tools(),
            ..Default::default()
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        call_until_cancelled(&self.source, &request.name, request.arguments, &context.ct).await
    }
}

/// Run a tool call, giving up as soon as `ct` fires.
async fn call_until_cancelled(
    source: &ServiceToolSource,
    name: &str,
    arguments: Option<JsonObject>,
    ct: &CancellationToken,
) -> Result<CallToolResult, ErrorData> {
    // Dropping the call future aborts the upstream request.
    tokio::select! {
        () = ct.cancelled() => {
            debug!(tool = %name, "tool call cancelled");
            Err(ErrorData::internal_error("Request cancelled", None))
        }
        result = source.call_tool(name, arguments) => {
            result.map_err(|e| ErrorData::invalid_params(e.to_string(), None))
        }
    }
}

fn find_service(services: Vec<ServiceDefinition>, service_id: &str) -> Option<ServiceDefinition> {
    services.into_iter().find(|s| s.id == service_id)
}

fn service_not_found(service_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("Service \"{service_id}\" not found") })),
    )
        .into_response()
}

pub async fn service_endpoint(
    Extension(state): Extension<Arc<AppState>>,
    Path((wid_hash, service_id)): Path<(String, String)>,
    request: Request,
) -> Response {
    let doc = match state.store.get_by_hash(&wid_hash).await {
        Ok(Some(doc)) => doc,
        Ok(None) => return service_not_found(&service_id),
        Err(e) => {
            error!(wid_hash = %wid_hash, error = %e, "failed to load workspace");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };
    let Some(service) = find_service(services_from_value(&doc.services), &service_id) else {
        return service_not_found(&service_id);
    };

    let headers = forwardable_headers(request.headers());
    debug!(
        service = %service.id,
        tools = service.tools.len(),
        forwarded_headers = headers.len(),
        "serving MCP request"
    );
    let server = ServiceMcpServer::new(ServiceToolSource::new(&service, headers, &state.executor));

    let transport = StreamableHttpService::new(
        move || Ok(server.clone()),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig {
            stateful_mode: false,
            cancellation_token: state.shutdown.child_token(),
            ..Default::default()
        },
    );
    transport.handle(request).await.map(Body::new)
}
