//! Declarative REST tools: compile, execute, bridge into MCP.
//!
//! Pipeline per invocation: [`compile::compile_request`] projects a stored
//! [`model::ToolDefinition`] into a descriptor, [`template::substitute_payload`] resolves
//! `{{name}}` placeholders, [`runtime::HttpExecutor`] issues the upstream call and
//! [`source::ServiceToolSource`] wraps the outcome as an MCP tool result.
//!
//! It contains **no** storage logic and **no** transport plumbing.

pub mod compile;
pub mod contract;
pub mod kv;
pub mod model;
pub mod runtime;
pub mod semantics;
pub mod source;
pub mod template;

pub use runtime::{HttpToolsError, Result};
