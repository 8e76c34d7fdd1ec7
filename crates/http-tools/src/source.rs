//! Capability bridge: a stored service definition exposed as MCP tools.
//!
//! Each tool becomes a [`Capability`]: name, description, argument contract and an invoke
//! closure over that one tool definition. Invocation runs compile -> substitute -> execute and
//! always produces a `CallToolResult` (failures use `is_error`).

use crate::compile::compile_request;
use crate::contract::{ArgumentContract, contract_from_schema_text};
use crate::kv::StringMap;
use crate::model::{ServiceDefinition, ToolDefinition};
use crate::runtime::{HttpExecutor, HttpToolsError, Result};
use crate::semantics::{annotations_for_method, parse_method};
use crate::template::{substitute_payload, values_from_arguments};
use futures::future::BoxFuture;
use reqwest::header::HeaderMap;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool, ToolAnnotations};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Transport/protocol headers never forwarded to upstream APIs.
pub const EXCLUDED_TRANSPORT_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "content-type",
    "accept",
    "accept-encoding",
    "accept-language",
    "connection",
    "keep-alive",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "proxy-authorization",
    "proxy-connection",
    "mcp-session-id",
    "mcp-protocol-version",
    "last-event-id",
    "cf-connecting-ip",
    "cf-ipcountry",
    "cf-ray",
    "cf-visitor",
    "x-forwarded-for",
    "x-forwarded-host",
    "x-forwarded-proto",
    "x-real-ip",
    "forwarded",
    "via",
];

/// Inbound transport headers minus [`EXCLUDED_TRANSPORT_HEADERS`].
///
/// Repeated headers are joined with `", "`; non-UTF-8 values are dropped.
#[must_use]
pub fn forwardable_headers(headers: &HeaderMap) -> StringMap {
    let mut out = StringMap::new();
    for name in headers.keys() {
        if EXCLUDED_TRANSPORT_HEADERS.contains(&name.as_str()) {
            continue;
        }
        let values: Vec<&str> = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if !values.is_empty() {
            out.insert(name.as_str(), values.join(", "));
        }
    }
    out
}

type InvokeFn = Arc<dyn Fn(JsonObject) -> BoxFuture<'static, CallToolResult> + Send + Sync>;

/// The runtime-invocable form of one tool.
#[derive(Clone)]
pub struct Capability {
    name: String,
    tool_id: String,
    description: String,
    contract: Arc<dyn ArgumentContract>,
    annotations: Option<ToolAnnotations>,
    invoke: InvokeFn,
}

impl Capability {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn tool_id(&self) -> &str {
        &self.tool_id
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn contract(&self) -> &dyn ArgumentContract {
        self.contract.as_ref()
    }

    /// MCP tool descriptor advertised to callers.
    #[must_use]
    pub fn tool(&self) -> Tool {
        let mut tool = Tool::new(
            self.name.clone(),
            self.description.clone(),
            self.contract.input_schema(),
        );
        tool.annotations.clone_from(&self.annotations);
        tool
    }

    pub async fn invoke(&self, arguments: JsonObject) -> CallToolResult {
        (self.invoke)(arguments).await
    }
}

/// Build one capability per tool.
///
/// Later tools whose name collides with an earlier one are skipped.
#[must_use]
pub fn build_capabilities(
    service: &ServiceDefinition,
    external_headers: Option<Arc<StringMap>>,
    executor: &HttpExecutor,
) -> Vec<Capability> {
    let mut names: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(service.tools.len());

    for tool in &service.tools {
        let name = tool.capability_name().to_string();
        if name.is_empty() {
            warn!(service = %service.id, "tool without name or id; skipping");
            continue;
        }
        if !names.insert(name.clone()) {
            warn!(service = %service.id, tool = %name, "duplicate tool name; skipping");
            continue;
        }
        out.push(build_capability(
            tool,
            name,
            external_headers.clone(),
            executor.clone(),
        ));
    }

    out
}

fn build_capability(
    tool: &ToolDefinition,
    name: String,
    external_headers: Option<Arc<StringMap>>,
    executor: HttpExecutor,
) -> Capability {
    let contract = contract_from_schema_text(&name, &tool.input_schema);
    let annotations = parse_method(&tool.method)
        .map(|m| annotations_for_method(&m, Some(name.clone())));

    let invoke: InvokeFn = {
        let tool = Arc::new(tool.clone());
        let contract = contract.clone();
        Arc::new(move |arguments: JsonObject| -> BoxFuture<'static, CallToolResult> {
            let tool = tool.clone();
            let contract = contract.clone();
            let executor = executor.clone();
            let headers = external_headers.clone();
            Box::pin(async move {
                invoke_tool(
                    &tool,
                    contract.as_ref(),
                    &executor,
                    headers.as_deref(),
                    arguments,
                )
                .await
            })
        })
    };

    Capability {
        name,
        tool_id: tool.id.clone(),
        description: tool.description.clone(),
        contract,
        annotations,
        invoke,
    }
}

async fn invoke_tool(
    tool: &ToolDefinition,
    contract: &dyn ArgumentContract,
    executor: &HttpExecutor,
    external_headers: Option<&StringMap>,
    arguments: JsonObject,
) -> CallToolResult {
    let arguments = Value::Object(arguments);
    if let Err(violations) = contract.validate(&arguments) {
        debug!(tool = %tool.capability_name(), ?violations, "arguments rejected by input schema");
        return error_result(&format!("Invalid arguments: {}", violations.join("; ")));
    }

    let compiled = compile_request(tool, external_headers);
    let values = arguments
        .as_object()
        .map(values_from_arguments)
        .unwrap_or_default();
    let resolved = substitute_payload(&compiled, &values);

    match executor.execute(tool.method_or_default(), &resolved).await {
        Ok(result) => {
            debug!(tool = %tool.capability_name(), status = result.status, "capability call completed");
            CallToolResult::success(vec![Content::text(render_body(&result.body))])
        }
        Err(e) => {
            warn!(tool = %tool.capability_name(), error = %e, "capability call failed");
            error_result(&e.to_string())
        }
    }
}

fn error_result(message: &str) -> CallToolResult {
    CallToolResult::error(vec![Content::text(format!("Error: {message}"))])
}

/// Pretty-print JSON bodies (2-space indent); anything else passes through.
#[must_use]
pub fn render_body(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| body.to_string())
}

/// A service definition bridged into MCP tools for one inbound request.
///
/// Immutable and cheap to clone.
#[derive(Clone)]
pub struct ServiceToolSource {
    inner: Arc<ServiceToolSourceInner>,
}

struct ServiceToolSourceInner {
    name: String,
    version: String,
    description: Option<String>,
    capabilities: Vec<Capability>,
}

impl ServiceToolSource {
    #[must_use]
    pub fn new(
        service: &ServiceDefinition,
        external_headers: StringMap,
        executor: &HttpExecutor,
    ) -> Self {
        let headers = external_headers.non_empty().map(Arc::new);
        let capabilities = build_capabilities(service, headers, executor);

        let name = if service.name.trim().is_empty() {
            service.id.clone()
        } else {
            service.name.clone()
        };
        let version = if service.version.trim().is_empty() {
            "1.0.0".to_string()
        } else {
            service.version.clone()
        };
        let description = Some(service.description.clone()).filter(|d| !d.trim().is_empty());

        Self {
            inner: Arc::new(ServiceToolSourceInner {
                name,
                version,
                description,
                capabilities,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.inner.version
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.inner.description.as_deref()
    }

    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.inner.capabilities
    }

    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        self.inner.capabilities.iter().map(Capability::tool).collect()
    }

    /// Look up a capability by exposed name or stored tool id.
    #[must_use]
    pub fn find(&self, name_or_id: &str) -> Option<&Capability> {
        let caps = &self.inner.capabilities;
        caps.iter()
            .find(|c| c.name == name_or_id)
            .or_else(|| caps.iter().find(|c| c.tool_id == name_or_id))
    }

    /// Invoke a capability.
    ///
    /// # Errors
    ///
    /// Returns [`HttpToolsError::ToolNotFound`] for an unknown tool. Every other failure is
    /// reported inside the returned result.
    pub async fn call_tool(
        &self,
        name_or_id: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult> {
        let capability = self
            .find(name_or_id)
            .ok_or_else(|| HttpToolsError::ToolNotFound(name_or_id.to_string()))?;
        Ok(capability.invoke(arguments.unwrap_or_default()).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BodyType, KeyValueItem};
    use reqwest::header::HeaderValue;
    use mcp_workspace_test_support::{LocalServer, echo_router};
    use serde_json::json;
    use std::time::Duration;

    fn result_text(result: &CallToolResult) -> String {
        let v = serde_json::to_value(result).expect("CallToolResult serializes");
        v.get("content")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .and_then(|c| c.get("text"))
            .and_then(Value::as_str)
            .expect("content[0].text")
            .to_string()
    }

    fn args(v: Value) -> Option<JsonObject> {
        v.as_object().cloned()
    }

    fn executor() -> HttpExecutor {
        HttpExecutor::new(Some(Duration::from_secs(10))).expect("executor")
    }

    fn get_item_tool(base_url: &str) -> ToolDefinition {
        ToolDefinition {
            id: "tool-get-item".to_string(),
            name: "getItem".to_string(),
            description: "Fetch one item".to_string(),
            method: "GET".to_string(),
            url: format!("{base_url}/items/{{{{id}}}}"),
            body_type: BodyType::None,
            input_schema: r#"{"type":"object","properties":{"id":{"type":"string"}},"required":["id"]}"#
                .to_string(),
            ..ToolDefinition::default()
        }
    }

    fn service(tools: Vec<ToolDefinition>) -> ServiceDefinition {
        ServiceDefinition {
            id: "svc".to_string(),
            name: "Items".to_string(),
            version: String::new(),
            description: "Item API".to_string(),
            tools,
        }
    }

    #[tokio::test]
    async fn call_tool_substitutes_and_pretty_prints_json() {
        let server = LocalServer::start(echo_router()).await.expect("server");
        let source = ServiceToolSource::new(
            &service(vec![get_item_tool(&server.base_url())]),
            StringMap::new(),
            &executor(),
        );

        let result = source
            .call_tool("getItem", args(json!({"id": "42"})))
            .await
            .expect("known tool");
        assert_eq!(result.is_error, Some(false));

        let text = result_text(&result);
        assert!(text.contains("\n  \"method\": \"GET\""), "{text}");
        let echoed: Value = serde_json::from_str(&text).expect("json text");
        assert_eq!(echoed["path"], "/items/42");
        assert_eq!(echoed["body"], "");

        server.stop().await;
    }

    #[tokio::test]
    async fn external_headers_reach_upstream_and_win() {
        let server = LocalServer::start(echo_router()).await.expect("server");
        let tool = ToolDefinition {
            headers: vec![
                KeyValueItem::enabled("Authorization", "static"),
                KeyValueItem::enabled("X-Token", "{{token}}"),
            ],
            input_schema: r#"{"type":"object","properties":{"id":{},"token":{}}}"#.to_string(),
            ..get_item_tool(&server.base_url())
        };

        let mut inbound = HeaderMap::new();
        inbound.insert("authorization", HeaderValue::from_static("dynamic"));
        inbound.insert("mcp-session-id", HeaderValue::from_static("s-1"));
        inbound.insert("host", HeaderValue::from_static("gateway.local"));

        let source =
            ServiceToolSource::new(&service(vec![tool]), forwardable_headers(&inbound), &executor());
        let result = source
            .call_tool("getItem", args(json!({"id": 1, "token": "tok"})))
            .await
            .expect("known tool");

        let echoed: Value = serde_json::from_str(&result_text(&result)).expect("json text");
        assert_eq!(echoed["path"], "/items/1");
        assert_eq!(echoed["headers"]["authorization"], "dynamic");
        assert_eq!(echoed["headers"]["x-token"], "tok");
        assert!(echoed["headers"].get("mcp-session-id").is_none());

        server.stop().await;
    }

    #[tokio::test]
    async fn plain_text_body_passes_through() {
        let server = LocalServer::start(echo_router()).await.expect("server");
        let tool = ToolDefinition {
            url: format!("{}/text", server.base_url()),
            input_schema: String::new(),
            ..get_item_tool(&server.base_url())
        };
        let source = ServiceToolSource::new(&service(vec![tool]), StringMap::new(), &executor());
        let result = source.call_tool("getItem", None).await.expect("known tool");
        assert_eq!(result_text(&result), "plain text, not json");
        server.stop().await;
    }

    #[tokio::test]
    async fn invalid_url_becomes_error_result() {
        let tool = ToolDefinition {
            url: "not a url".to_string(),
            ..get_item_tool("unused")
        };
        let source = ServiceToolSource::new(&service(vec![tool]), StringMap::new(), &executor());
        let result = source
            .call_tool("getItem", args(json!({"id": "1"})))
            .await
            .expect("known tool");
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result_text(&result), "Error: Invalid URL: not a url");
    }

    #[tokio::test]
    async fn schema_violation_becomes_error_result() {
        let tool = get_item_tool("http://127.0.0.1:1");
        let source = ServiceToolSource::new(&service(vec![tool]), StringMap::new(), &executor());
        let result = source
            .call_tool("getItem", args(json!({"id": 5})))
            .await
            .expect("known tool");
        assert_eq!(result.is_error, Some(true));
        assert!(result_text(&result).starts_with("Error: Invalid arguments:"));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let source = ServiceToolSource::new(
            &service(vec![get_item_tool("http://127.0.0.1:1")]),
            StringMap::new(),
            &executor(),
        );
        let err = source.call_tool("nope", None).await.unwrap_err();
        assert!(matches!(err, HttpToolsError::ToolNotFound(name) if name == "nope"));
    }

    #[test]
    fn registration_uses_name_then_id_and_skips_duplicates() {
        let base = get_item_tool("http://127.0.0.1:1");
        let unnamed = ToolDefinition {
            id: "t-2".to_string(),
            name: String::new(),
            method: "DELETE".to_string(),
            ..base.clone()
        };
        let duplicate = ToolDefinition {
            id: "t-3".to_string(),
            ..base.clone()
        };
        let source = ServiceToolSource::new(
            &service(vec![base, unnamed, duplicate]),
            StringMap::new(),
            &executor(),
        );

        let tools = source.list_tools();
        let names: Vec<&str> = tools.iter().map(|t| &*t.name).collect();
        assert_eq!(names, vec!["getItem", "t-2"]);
        assert_eq!(tools[0].description.as_deref(), Some("Fetch one item"));
        assert_eq!(
            tools[1].annotations.as_ref().and_then(|a| a.destructive_hint),
            Some(true)
        );
        assert!(source.find("tool-get-item").is_some());
        assert_eq!(source.name(), "Items");
        assert_eq!(source.version(), "1.0.0");
        assert_eq!(source.description(), Some("Item API"));
    }

    #[test]
    fn forwardable_headers_drop_transport_headers() {
        let mut inbound = HeaderMap::new();
        inbound.insert("content-type", HeaderValue::from_static("application/json"));
        inbound.insert("accept", HeaderValue::from_static("text/event-stream"));
        inbound.insert("mcp-protocol-version", HeaderValue::from_static("2025-06-18"));
        inbound.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        for hop_by_hop in [
            "te",
            "upgrade",
            "keep-alive",
            "transfer-encoding",
            "proxy-authorization",
            "proxy-connection",
        ] {
            inbound.insert(hop_by_hop, HeaderValue::from_static("x"));
        }
        inbound.insert("x-api-key", HeaderValue::from_static("k"));
        inbound.append("x-multi", HeaderValue::from_static("a"));
        inbound.append("x-multi", HeaderValue::from_static("b"));

        let forwarded = forwardable_headers(&inbound);
        assert_eq!(
            forwarded.iter().collect::<Vec<_>>(),
            vec![("x-api-key", "k"), ("x-multi", "a, b")]
        );
    }

    #[test]
    fn render_body_pretty_prints_only_json() {
        assert_eq!(render_body(r#"{"a":[1]}"#), "{\n  \"a\": [\n    1\n  ]\n}");
        assert_eq!(render_body("not json"), "not json");
        assert_eq!(render_body(""), "");
    }
}
