//! Request compilation: stored tool definition -> request descriptor.
//!
//! The descriptor is fully resolved (projection, body selection, header merge) but still contains
//! `{{var}}` placeholders; see [`crate::template::substitute_payload`].

use crate::kv::{StringMap, project};
use crate::model::{BodyType, ToolDefinition};

/// Body payload of a compiled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyPayload {
    /// Sent verbatim (raw JSON text).
    Raw(String),
    /// Sent as `application/x-www-form-urlencoded`.
    Form(StringMap),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestBody {
    pub kind: BodyType,
    pub payload: Option<BodyPayload>,
}

/// Method-agnostic request shape produced by [`compile_request`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub url: String,
    pub params: Option<StringMap>,
    pub headers: Option<StringMap>,
    pub cookies: Option<StringMap>,
    pub body: RequestBody,
}

/// Compile a tool definition, overlaying `external_headers` on the tool's own headers.
///
/// External headers win on collision (names compared ignoring ASCII case).
#[must_use]
pub fn compile_request(
    tool: &ToolDefinition,
    external_headers: Option<&StringMap>,
) -> RequestDescriptor {
    let mut headers = project(&tool.headers).unwrap_or_default();
    for (k, v) in external_headers.into_iter().flat_map(StringMap::iter) {
        headers.insert_ignore_case(k, v);
    }

    RequestDescriptor {
        url: tool.url.clone(),
        params: project(&tool.params),
        headers: headers.non_empty(),
        cookies: project(&tool.cookies),
        body: RequestBody {
            kind: tool.body_type,
            payload: select_body_payload(tool),
        },
    }
}

/// Compile for the interactive test surface (no external headers).
#[must_use]
pub fn compile_for_test(tool: &ToolDefinition) -> RequestDescriptor {
    compile_request(tool, None)
}

fn select_body_payload(tool: &ToolDefinition) -> Option<BodyPayload> {
    match tool.body_type {
        BodyType::RawJson if !tool.body_content.is_empty() => {
            Some(BodyPayload::Raw(tool.body_content.clone()))
        }
        BodyType::UrlEncoded => project(&tool.body_url_encoded).map(BodyPayload::Form),
        _ => None,
    }
}
