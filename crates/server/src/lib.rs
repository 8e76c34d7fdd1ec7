//! Workspace backend: persists REST tool definitions, runs interactive test requests and exposes
//! each stored service as its own MCP endpoint.

pub mod app;
pub mod config;
pub mod mcp;
pub mod proxy;
pub mod services;
pub mod store;

pub use app::{AppState, router};
