//! Runtime for executing compiled HTTP tool requests.
//!
//! One call to [`HttpExecutor::execute`] issues exactly one upstream request and normalizes the
//! response. Non-2xx responses are results, not errors.

use crate::compile::{BodyPayload, RequestBody, RequestDescriptor};
use crate::kv::StringMap;
use crate::model::BodyType;
use crate::semantics::parse_method;
use reqwest::header::{COOKIE, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum HttpToolsError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),
    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },
    #[error("Request timed out after {0}ms")]
    Timeout(u128),
    #[error("{0}")]
    Transport(String),
    #[error("Tool not found: {0}")]
    ToolNotFound(String),
}

pub type Result<T> = std::result::Result<T, HttpToolsError>;

/// One cookie re-derived from the response `Set-Cookie` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseCookie {
    pub key: String,
    pub value: String,
}

/// Normalized outcome of one upstream HTTP call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub status: u16,
    pub status_text: String,
    #[serde(rename = "time")]
    pub elapsed_ms: u64,
    #[serde(rename = "size")]
    pub size_label: String,
    pub headers: StringMap,
    pub cookies: Vec<ResponseCookie>,
    pub body: String,
}

impl ExecutionResult {
    /// Result shown by the interactive test surface when execution failed.
    #[must_use]
    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: 0,
            status_text: message.into(),
            elapsed_ms: 0,
            size_label: format_size(0),
            headers: StringMap::new(),
            cookies: Vec::new(),
            body: String::new(),
        }
    }
}

/// Executes substituted request descriptors.
///
/// Cheap to clone; holds no per-call state.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
    timeout: Option<Duration>,
}

impl HttpExecutor {
    /// Build an executor with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed (e.g. TLS backend failure).
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| HttpToolsError::Transport(describe_reqwest_error(&e)))?;
        Ok(Self::with_client(client, timeout))
    }

    #[must_use]
    pub fn with_client(client: Client, timeout: Option<Duration>) -> Self {
        Self {
            client,
            timeout: timeout.filter(|t| !t.is_zero()),
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Execute one request.
    ///
    /// URL, method and header problems fail before any network activity.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid URL/method/header, a transport failure or a timeout.
    pub async fn execute(
        &self,
        method: &str,
        request: &RequestDescriptor,
    ) -> Result<ExecutionResult> {
        let method = parse_http_method(method)?;
        let url = build_url(&request.url, request.params.as_ref())?;
        let body = encode_body(&request.body);
        let headers = build_headers(request, body.as_ref().map(|(ct, _)| *ct))?;

        let mut builder = self
            .client
            .request(method.clone(), url.clone())
            .headers(headers);
        if let Some((_, payload)) = body {
            builder = builder.body(payload);
        }
        if let Some(t) = self.timeout {
            builder = builder.timeout(t);
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(|e| self.map_error(&e))?;
        let status = response.status();
        let (headers, set_cookie) = collect_response_headers(response.headers());
        let bytes = response.bytes().await.map_err(|e| self.map_error(&e))?;
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        debug!(
            method = %method,
            url = %redact_url(&url),
            status = status.as_u16(),
            elapsed_ms,
            bytes = bytes.len(),
            "upstream call completed"
        );

        Ok(ExecutionResult {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            elapsed_ms,
            size_label: format_size(bytes.len() as u64),
            headers,
            cookies: set_cookie.as_deref().map(parse_set_cookie).unwrap_or_default(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    fn map_error(&self, e: &reqwest::Error) -> HttpToolsError {
        if e.is_timeout() {
            let ms = self.timeout.map_or(0, |t| t.as_millis());
            return HttpToolsError::Timeout(ms);
        }
        HttpToolsError::Transport(describe_reqwest_error(e))
    }
}

fn parse_http_method(method: &str) -> Result<Method> {
    parse_method(method).ok_or_else(|| HttpToolsError::InvalidMethod(method.trim().to_string()))
}

/// Parse the URL and **set** each configured param (replacing same-named URL params).
fn build_url(raw: &str, params: Option<&StringMap>) -> Result<Url> {
    let mut url = Url::parse(raw).map_err(|_| HttpToolsError::InvalidUrl(raw.to_string()))?;
    if let Some(params) = params {
        for (k, v) in params.iter() {
            set_query_param(&mut url, k, v);
        }
    }
    Ok(url)
}

/// Replace the first `key` pair in place and drop later ones; append if absent.
fn set_query_param(url: &mut Url, key: &str, value: &str) {
    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    match pairs.iter().position(|(k, _)| k == key) {
        Some(first) => {
            pairs[first].1 = value.to_string();
            let mut idx = 0;
            pairs.retain(|(k, _)| {
                let keep = idx <= first || k != key;
                idx += 1;
                keep
            });
        }
        None => pairs.push((key.to_string(), value.to_string())),
    }
    url.query_pairs_mut().clear().extend_pairs(pairs);
}

fn encode_body(body: &RequestBody) -> Option<(&'static str, String)> {
    match (body.kind, body.payload.as_ref()?) {
        (BodyType::RawJson, BodyPayload::Raw(text)) => Some(("application/json", text.clone())),
        (BodyType::UrlEncoded, BodyPayload::Form(fields)) => {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(fields.iter())
                .finish();
            Some(("application/x-www-form-urlencoded", encoded))
        }
        _ => None,
    }
}

/// Headers in mapping order, then `Cookie`, then the body content type.
fn build_headers(
    request: &RequestDescriptor,
    content_type: Option<&'static str>,
) -> Result<HeaderMap> {
    let mut out = HeaderMap::new();
    for (k, v) in request.headers.iter().flat_map(StringMap::iter) {
        out.insert(header_name(k)?, header_value(k, v)?);
    }
    if let Some(cookies) = &request.cookies {
        let line = cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ");
        out.insert(COOKIE, header_value("Cookie", &line)?);
    }
    if let Some(ct) = content_type {
        out.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
    }
    Ok(out)
}

fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| HttpToolsError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| HttpToolsError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Response headers as a mapping (repeated values joined with `", "`), plus the joined
/// `set-cookie` line if any.
fn collect_response_headers(headers: &HeaderMap) -> (StringMap, Option<String>) {
    let mut out = StringMap::new();
    let mut set_cookie = None;
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        if *name == reqwest::header::SET_COOKIE {
            set_cookie = Some(joined.clone());
        }
        out.insert(name.as_str(), joined);
    }
    (out, set_cookie)
}

/// Lenient `Set-Cookie` parsing: split on commas, keep `key=value` up to the first `;`.
///
/// Mis-parses cookie values (and `Expires` dates) that contain commas.
#[must_use]
pub fn parse_set_cookie(line: &str) -> Vec<ResponseCookie> {
    line.split(',')
        .filter_map(|segment| {
            let trimmed = segment.trim();
            let eq = trimmed.find('=').filter(|&i| i > 0)?;
            let rest = &trimmed[eq + 1..];
            let value = rest.split_once(';').map_or(rest, |(v, _)| v);
            Some(ResponseCookie {
                key: trimmed[..eq].to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}

/// Binary-unit size label with up to two decimals (`0 B`, `2 KB`, `1.5 MB`).
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }

    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}

#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

/// Human-readable reqwest error (with its cause chain), URL redacted.
fn describe_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    let mut source = std::error::Error::source(e);
    while let Some(cause) = source {
        let text = cause.to_string();
        if !msg.contains(&text) {
            msg.push_str(": ");
            msg.push_str(&text);
        }
        source = cause.source();
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_workspace_test_support::{LocalServer, echo_router};
    use serde_json::Value;

    fn descriptor(url: &str) -> RequestDescriptor {
        RequestDescriptor {
            url: url.to_string(),
            ..RequestDescriptor::default()
        }
    }

    fn executor() -> HttpExecutor {
        HttpExecutor::new(Some(Duration::from_secs(10))).expect("executor")
    }

    #[test]
    fn configured_params_replace_url_params() {
        let params: StringMap = [("key", "456")].into_iter().collect();
        let url = build_url("https://x/y?key=123", Some(&params)).expect("url");
        assert_eq!(url.as_str(), "https://x/y?key=456");
    }

    #[test]
    fn set_param_keeps_position_and_drops_duplicates() {
        let params: StringMap = [("b", "new"), ("c", "3")].into_iter().collect();
        let url = build_url("https://x/y?a=1&b=2&a=4&b=5", Some(&params)).expect("url");
        assert_eq!(url.query(), Some("a=1&b=new&a=4&c=3"));
    }

    #[test]
    fn invalid_url_fails_fast() {
        let err = build_url("not a url", None).unwrap_err();
        assert_eq!(err.to_string(), "Invalid URL: not a url");
    }

    #[test]
    fn size_labels_use_binary_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1234), "1.21 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3 GB");
        assert_eq!(format_size(2048 * 1024 * 1024 * 1024), "2048 GB");
    }

    #[test]
    fn set_cookie_line_is_split_on_commas() {
        let cookies = parse_set_cookie("session=abc123; Path=/; HttpOnly, theme=dark");
        assert_eq!(
            cookies,
            vec![
                ResponseCookie {
                    key: "session".to_string(),
                    value: "abc123".to_string(),
                },
                ResponseCookie {
                    key: "theme".to_string(),
                    value: "dark".to_string(),
                },
            ]
        );
    }

    #[test]
    fn set_cookie_skips_segments_without_key() {
        let cookies = parse_set_cookie("id=1; Expires=Wed, 21 Oct 2015 07:28:00 GMT, =x, bare");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].key, "id");
        assert_eq!(cookies[0].value, "1");
    }

    #[test]
    fn cookies_header_wins_over_configured_cookie_header() {
        let request = RequestDescriptor {
            headers: Some([("Cookie", "stale=1"), ("X-A", "a")].into_iter().collect()),
            cookies: Some([("a", "1"), ("b", "2")].into_iter().collect()),
            ..descriptor("https://x/")
        };
        let headers = build_headers(&request, Some("application/json")).expect("headers");
        assert_eq!(headers.get(COOKIE).and_then(|v| v.to_str().ok()), Some("a=1; b=2"));
        assert_eq!(
            headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
        assert_eq!(headers.get("x-a").and_then(|v| v.to_str().ok()), Some("a"));
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        let request = RequestDescriptor {
            headers: Some([("bad header", "v")].into_iter().collect()),
            ..descriptor("https://x/")
        };
        let err = build_headers(&request, None).unwrap_err();
        assert!(matches!(err, HttpToolsError::InvalidHeader { .. }));
    }

    #[tokio::test]
    async fn invalid_method_fails_before_network() {
        let err = executor()
            .execute("NOT A METHOD", &descriptor("http://127.0.0.1:1/"))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpToolsError::InvalidMethod(_)));
    }

    #[tokio::test]
    async fn raw_json_body_is_sent_verbatim() {
        let server = LocalServer::start(echo_router()).await.expect("server");
        let request = RequestDescriptor {
            headers: Some(
                [("Content-Type", "text/plain"), ("X-Trace", "t-1")]
                    .into_iter()
                    .collect(),
            ),
            body: RequestBody {
                kind: BodyType::RawJson,
                payload: Some(BodyPayload::Raw(r#"{"a": 1}"#.to_string())),
            },
            ..descriptor(&format!("{}/things?key=123", server.base_url()))
        };

        let result = executor().execute("post", &request).await.expect("execute");
        assert_eq!(result.status, 200);
        assert_eq!(result.status_text, "OK");

        let echoed: Value = serde_json::from_str(&result.body).expect("echo json");
        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["path"], "/things");
        assert_eq!(echoed["query"], "key=123");
        assert_eq!(echoed["body"], r#"{"a": 1}"#);
        assert_eq!(echoed["headers"]["content-type"], "application/json");
        assert_eq!(echoed["headers"]["x-trace"], "t-1");
        assert_eq!(result.size_label, format_size(result.body.len() as u64));
        assert!(result.headers.get("content-type").is_some());

        server.stop().await;
    }

    #[tokio::test]
    async fn url_encoded_body_and_cookies_are_sent() {
        let server = LocalServer::start(echo_router()).await.expect("server");
        let request = RequestDescriptor {
            cookies: Some([("sid", "s1"), ("lang", "en")].into_iter().collect()),
            body: RequestBody {
                kind: BodyType::UrlEncoded,
                payload: Some(BodyPayload::Form(
                    [("user", "ann lee"), ("role", "a&b")].into_iter().collect(),
                )),
            },
            ..descriptor(&format!("{}/form", server.base_url()))
        };

        let result = executor().execute("PUT", &request).await.expect("execute");
        let echoed: Value = serde_json::from_str(&result.body).expect("echo json");
        assert_eq!(echoed["method"], "PUT");
        assert_eq!(echoed["body"], "user=ann+lee&role=a%26b");
        assert_eq!(
            echoed["headers"]["content-type"],
            "application/x-www-form-urlencoded"
        );
        assert_eq!(echoed["headers"]["cookie"], "sid=s1; lang=en");

        server.stop().await;
    }

    #[tokio::test]
    async fn non_success_status_is_a_result() {
        let server = LocalServer::start(echo_router()).await.expect("server");
        let result = executor()
            .execute("GET", &descriptor(&format!("{}/status/404", server.base_url())))
            .await
            .expect("404 is still a result");
        assert_eq!(result.status, 404);
        assert_eq!(result.status_text, "Not Found");
        server.stop().await;
    }

    #[tokio::test]
    async fn response_cookies_are_re_derived() {
        let server = LocalServer::start(echo_router()).await.expect("server");
        let result = executor()
            .execute("GET", &descriptor(&format!("{}/cookies", server.base_url())))
            .await
            .expect("execute");
        let keys: Vec<&str> = result.cookies.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["session", "theme"]);
        assert_eq!(result.cookies[0].value, "abc123");
        assert_eq!(
            result.headers.get("set-cookie"),
            Some("session=abc123; Path=/; HttpOnly, theme=dark")
        );
        server.stop().await;
    }

    #[tokio::test]
    async fn timeout_fails_instead_of_hanging() {
        let server = LocalServer::start(echo_router()).await.expect("server");
        let exec = HttpExecutor::new(Some(Duration::from_millis(200))).expect("executor");
        let err = exec
            .execute("GET", &descriptor(&format!("{}/slow", server.base_url())))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Request timed out after 200ms");
        server.stop().await;
    }

    #[tokio::test]
    async fn connection_failure_is_transport_error() {
        let port = mcp_workspace_test_support::pick_unused_port().expect("port");
        let err = executor()
            .execute(
                "GET",
                &descriptor(&format!("http://127.0.0.1:{port}/x?token=secret")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HttpToolsError::Transport(_)));
        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn zero_timeout_means_none() {
        let exec = HttpExecutor::with_client(Client::new(), Some(Duration::ZERO));
        assert_eq!(exec.timeout(), None);
    }
}
