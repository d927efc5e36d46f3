// src/mcp/tools/execute.rs
// Execution tools: single call and bounded-concurrency batch

use super::{error_text, to_text};
use crate::executor::ExecuteRequest;
use crate::mcp::AstroServer;
use crate::mcp::requests;
use serde_json::{Map, Value, json};

pub async fn execute(
    server: &AstroServer,
    module_name: &str,
    function_name: &str,
    params: Option<Map<String, Value>>,
) -> Result<String, String> {
    match server
        .executor
        .execute(module_name, function_name, params.unwrap_or_default())
        .await
    {
        Ok(envelope) => to_text(&envelope),
        Err(e) => Err(error_text(&e)),
    }
}

/// Every call reports its own envelope or error; the batch itself never fails
pub async fn execute_batch(
    server: &AstroServer,
    calls: Vec<requests::ExecuteRequest>,
    max_concurrency: Option<usize>,
) -> Result<String, String> {
    let requests: Vec<ExecuteRequest> = calls.into_iter().map(Into::into).collect();
    let limit = max_concurrency.unwrap_or(server.registry().context().config.defaults.max_concurrency);

    let results: Vec<Value> = server
        .executor
        .execute_many(&requests, limit)
        .await
        .into_iter()
        .map(|r| r.unwrap_or_else(|e| e.to_value()))
        .collect();

    let succeeded = results.iter().filter(|r| r["success"] == true).count();
    to_text(&json!({
        "total": results.len(),
        "succeeded": succeeded,
        "failed": results.len() - succeeded,
        "results": results,
    }))
}
