// src/mcp/requests.rs
// MCP tool request types

use rmcp::schemars;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListFunctionsRequest {
    #[schemars(description = "Module to list (e.g. 'simbad'); omit for every module")]
    pub module_name: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetFunctionInfoRequest {
    #[schemars(description = "Module name (e.g. 'ads')")]
    pub module_name: String,
    #[schemars(description = "Function name within the module (e.g. 'search')")]
    pub function_name: String,
}

#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
pub struct ExecuteRequest {
    #[schemars(description = "Module name (e.g. 'simbad')")]
    pub module_name: String,
    #[schemars(description = "Function name (e.g. 'query_object')")]
    pub function_name: String,
    #[schemars(description = "Keyword arguments. Coordinates accept {ra, dec} or object names; radii accept numbers (arcmin) or {value, unit}")]
    pub params: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ExecuteBatchRequest {
    #[schemars(description = "Calls to run; results come back in the same order")]
    pub calls: Vec<ExecuteRequest>,
    #[schemars(description = "Calls in flight at once (default from config)")]
    pub max_concurrency: Option<usize>,
}

impl From<ExecuteRequest> for crate::executor::ExecuteRequest {
    fn from(req: ExecuteRequest) -> Self {
        Self::new(req.module_name, req.function_name, req.params.unwrap_or_default())
    }
}
