//! Stored service/tool definitions.
//!
//! These mirror the JSON document the editor persists per workspace. Every field has a default so
//! partially-filled documents still load.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::warn;

/// Editors write `null` for fields they never filled in.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One named, togglable name/value entry (query param, header, cookie or form field).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValueItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub key: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl KeyValueItem {
    #[must_use]
    pub fn enabled(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            enabled: true,
            key: key.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn disabled(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            enabled: false,
            ..Self::enabled(key, value)
        }
    }
}

/// Request body kind selected in the editor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BodyType {
    #[default]
    None,
    RawJson,
    UrlEncoded,
    /// Stored but never sent.
    FormData,
    /// Stored but never sent.
    Binary,
}

impl BodyType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::RawJson => "raw-json",
            Self::UrlEncoded => "x-www-form-urlencoded",
            Self::FormData => "form-data",
            Self::Binary => "binary",
        }
    }

    /// Unknown body types load as `none`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "raw-json" => Self::RawJson,
            "x-www-form-urlencoded" => Self::UrlEncoded,
            "form-data" => Self::FormData,
            "binary" => Self::Binary,
            _ => Self::None,
        }
    }
}

impl Serialize for BodyType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BodyType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = Option::<String>::deserialize(deserializer)?;
        Ok(s.as_deref().map_or(Self::None, Self::parse))
    }
}

/// One HTTP-callable tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub method: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub params: Vec<KeyValueItem>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: Vec<KeyValueItem>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cookies: Vec<KeyValueItem>,
    #[serde(default)]
    pub body_type: BodyType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body_content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body_form_data: Vec<KeyValueItem>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body_url_encoded: Vec<KeyValueItem>,
    /// JSON Schema text describing the tool's arguments.
    #[serde(default, deserialize_with = "null_as_default")]
    pub input_schema: String,
    /// Informational only.
    #[serde(default, deserialize_with = "null_as_default")]
    pub output_schema: String,
}

impl ToolDefinition {
    /// Name exposed to protocol callers (falls back to the id).
    #[must_use]
    pub fn capability_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// HTTP method token, defaulting to `GET` when unset.
    #[must_use]
    pub fn method_or_default(&self) -> &str {
        let m = self.method.trim();
        if m.is_empty() { "GET" } else { m }
    }
}

/// A named, versioned group of tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tools: Vec<ToolDefinition>,
}

/// Parse a stored workspace document.
///
/// Malformed JSON is treated as "no services".
#[must_use]
pub fn parse_services(document: &str) -> Vec<ServiceDefinition> {
    match serde_json::from_str::<Value>(document) {
        Ok(value) => services_from_value(&value),
        Err(e) => {
            warn!(error = %e, "stored workspace document is not valid JSON; treating as empty");
            Vec::new()
        }
    }
}

/// Same as [`parse_services`] for an already-parsed document.
///
/// A document that is not a list means no services. Entries that fail to load are skipped so one
/// bad service does not hide the others.
#[must_use]
pub fn services_from_value(document: &Value) -> Vec<ServiceDefinition> {
    let Some(entries) = document.as_array() else {
        warn!("stored workspace document is not a service list; treating as empty");
        return Vec::new();
    };
    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| match ServiceDefinition::deserialize(entry) {
            Ok(service) => Some(service),
            Err(e) => {
                warn!(index, error = %e, "skipping unreadable service entry");
                None
            }
        })
        .collect()
}
