//! Argument contracts derived from stored JSON Schema text.
//!
//! Translation is fail-soft: an absent, unparsable or uncompilable schema yields a contract that
//! accepts any arguments.

use rmcp::model::JsonObject;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

/// Runtime validation contract for a capability's arguments.
pub trait ArgumentContract: Send + Sync {
    /// Schema advertised to protocol callers.
    fn input_schema(&self) -> Arc<JsonObject>;

    /// Validate call arguments; `Err` carries one message per violation.
    fn validate(&self, arguments: &Value) -> Result<(), Vec<String>>;
}

/// Accepts any arguments; advertises a bare object schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyArguments;

impl ArgumentContract for AnyArguments {
    fn input_schema(&self) -> Arc<JsonObject> {
        let mut obj = JsonObject::new();
        obj.insert("type".to_string(), json!("object"));
        Arc::new(obj)
    }

    fn validate(&self, _arguments: &Value) -> Result<(), Vec<String>> {
        Ok(())
    }
}

/// Validates against a compiled JSON Schema.
pub struct JsonSchemaContract {
    advertised: Arc<JsonObject>,
    validator: jsonschema::Validator,
}

impl JsonSchemaContract {
    /// Compile a schema object.
    ///
    /// # Errors
    ///
    /// Returns the compiler's message if the schema is not a valid JSON Schema.
    pub fn compile(schema: JsonObject) -> Result<Self, String> {
        let validator = jsonschema::validator_for(&Value::Object(schema.clone()))
            .map_err(|e| e.to_string())?;
        let mut advertised = schema;
        advertised
            .entry("type".to_string())
            .or_insert_with(|| json!("object"));
        Ok(Self {
            advertised: Arc::new(advertised),
            validator,
        })
    }
}

impl ArgumentContract for JsonSchemaContract {
    fn input_schema(&self) -> Arc<JsonObject> {
        self.advertised.clone()
    }

    fn validate(&self, arguments: &Value) -> Result<(), Vec<String>> {
        let violations: Vec<String> = self
            .validator
            .iter_errors(arguments)
            .map(|e| {
                let path = e.instance_path().to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{path}: {e}")
                }
            })
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// Parse a tool's stored `inputSchema` text into a contract.
#[must_use]
pub fn contract_from_schema_text(tool: &str, schema_text: &str) -> Arc<dyn ArgumentContract> {
    if schema_text.trim().is_empty() {
        debug!(tool = %tool, "no input schema; accepting any arguments");
        return Arc::new(AnyArguments);
    }

    let parsed = match serde_json::from_str::<Value>(schema_text) {
        Ok(Value::Object(obj)) => obj,
        Ok(_) => {
            warn!(tool = %tool, "input schema is not a JSON object; accepting any arguments");
            return Arc::new(AnyArguments);
        }
        Err(e) => {
            warn!(tool = %tool, error = %e, "input schema is not valid JSON; accepting any arguments");
            return Arc::new(AnyArguments);
        }
    };

    match JsonSchemaContract::compile(parsed) {
        Ok(contract) => Arc::new(contract),
        Err(e) => {
            warn!(tool = %tool, error = %e, "input schema failed to compile; accepting any arguments");
            Arc::new(AnyArguments)
        }
    }
}

/// Parse schema text leniently for variable validation (`None` when absent or malformed).
#[must_use]
pub fn parse_schema_text(schema_text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(schema_text)
        .ok()
        .filter(Value::is_object)
}
