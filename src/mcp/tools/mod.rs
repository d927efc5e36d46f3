// src/mcp/tools/mod.rs
// MCP tool implementations

pub mod catalog;
pub mod execute;

use crate::error::ToolError;
use crate::utils::ResultExt;
use serde_json::Value;

/// Pretty JSON text for a tool response
pub(crate) fn to_text(value: &Value) -> Result<String, String> {
    serde_json::to_string_pretty(value).str_err()
}

/// Structured error as the tool's error content
pub(crate) fn error_text(err: &ToolError) -> String {
    err.to_value().to_string()
}
