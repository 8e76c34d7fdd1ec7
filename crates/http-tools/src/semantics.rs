//! HTTP method semantics for tool annotations.
//!
//! Capabilities carry MCP `ToolAnnotations` derived from RFC 9110-style method semantics so
//! callers can tell read-only tools from destructive ones.

use reqwest::Method;
use rmcp::model::ToolAnnotations;

/// Annotations for a tool issuing `method`.
///
/// `openWorldHint` is always `true` (every tool calls an external API). Unknown or extension
/// methods only get `openWorldHint` and the title.
#[must_use]
pub fn annotations_for_method(method: &Method, title: Option<String>) -> ToolAnnotations {
    // (read_only, destructive, idempotent)
    let hints = if method == Method::GET || method == Method::HEAD || method == Method::OPTIONS {
        (Some(true), Some(false), Some(true))
    } else if method == Method::POST {
        (Some(false), Some(false), Some(false))
    } else if method == Method::PUT || method == Method::DELETE {
        (Some(false), Some(true), Some(true))
    } else if method == Method::PATCH {
        // PATCH may or may not be idempotent; do not guess.
        (Some(false), Some(true), None)
    } else {
        (None, None, None)
    };

    ToolAnnotations {
        title,
        read_only_hint: hints.0,
        destructive_hint: hints.1,
        idempotent_hint: hints.2,
        open_world_hint: Some(true),
    }
}

/// Parse a stored method token (case-insensitive, blank = `GET`).
#[must_use]
pub fn parse_method(token: &str) -> Option<Method> {
    let t = token.trim();
    if t.is_empty() {
        return Some(Method::GET);
    }
    t.to_uppercase().parse().ok()
}
