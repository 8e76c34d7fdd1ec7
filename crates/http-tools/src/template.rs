//! `{{name}}` template variables: extraction, validation and substitution.
//!
//! Substitution is total: placeholders without a supplied value are left verbatim.

use crate::compile::{BodyPayload, RequestBody, RequestDescriptor};
use crate::kv::StringMap;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

static VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("valid variable pattern"));

/// Variable names referenced by `text`, de-duplicated, in first-seen order.
pub fn extract_variables(text: &str) -> impl Iterator<Item = &str> {
    let mut seen = HashSet::new();
    VAR_PATTERN
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(move |name| seen.insert(*name))
}

/// Union of all variables referenced by a descriptor (url, params, headers, cookies, body).
#[must_use]
pub fn collect_all_variables(descriptor: &RequestDescriptor) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut collect = |text: &str| {
        for name in extract_variables(text) {
            if !out.iter().any(|n| n == name) {
                out.push(name.to_string());
            }
        }
    };

    collect(descriptor.url.as_str());
    for map in [&descriptor.params, &descriptor.headers, &descriptor.cookies]
        .into_iter()
        .flatten()
    {
        map.values().for_each(&mut collect);
    }
    match &descriptor.body.payload {
        Some(BodyPayload::Raw(text)) => collect(text.as_str()),
        Some(BodyPayload::Form(fields)) => fields.values().for_each(&mut collect),
        None => {}
    }

    out
}

/// Referenced variables that are not declared in `input_schema.properties`.
///
/// A missing or malformed schema declares nothing. Empty result means valid.
#[must_use]
pub fn validate_variables(
    descriptor: &RequestDescriptor,
    input_schema: Option<&Value>,
) -> Vec<String> {
    let properties = input_schema
        .and_then(|s| s.get("properties"))
        .and_then(Value::as_object);
    collect_all_variables(descriptor)
        .into_iter()
        .filter(|name| !properties.is_some_and(|p| p.contains_key(name)))
        .collect()
}

/// Replace each `{{name}}` having a value in `values`; others stay as-is.
#[must_use]
pub fn substitute_string(text: &str, values: &HashMap<String, String>) -> String {
    VAR_PATTERN
        .replace_all(text, |caps: &Captures<'_>| match values.get(&caps[1]) {
            Some(v) => v.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[must_use]
pub fn substitute_record(
    record: Option<&StringMap>,
    values: &HashMap<String, String>,
) -> Option<StringMap> {
    record.map(|r| r.map_values(|v| substitute_string(v, values)))
}

/// Substitute every templated field of a descriptor.
#[must_use]
pub fn substitute_payload(
    descriptor: &RequestDescriptor,
    values: &HashMap<String, String>,
) -> RequestDescriptor {
    let payload = descriptor.body.payload.as_ref().map(|p| match p {
        BodyPayload::Raw(text) => BodyPayload::Raw(substitute_string(text, values)),
        BodyPayload::Form(fields) => {
            BodyPayload::Form(fields.map_values(|v| substitute_string(v, values)))
        }
    });

    RequestDescriptor {
        url: substitute_string(&descriptor.url, values),
        params: substitute_record(descriptor.params.as_ref(), values),
        headers: substitute_record(descriptor.headers.as_ref(), values),
        cookies: substitute_record(descriptor.cookies.as_ref(), values),
        body: RequestBody {
            kind: descriptor.body.kind,
            payload,
        },
    }
}

/// Convert protocol arguments into template values.
///
/// Strings are taken verbatim, other scalars use their JSON text, nested values are compact JSON.
/// `null` counts as not supplied.
#[must_use]
pub fn values_from_arguments(
    arguments: &serde_json::Map<String, Value>,
) -> HashMap<String, String> {
    arguments
        .iter()
        .filter_map(|(k, v)| {
            let s = match v {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((k.clone(), s))
        })
        .collect()
}
