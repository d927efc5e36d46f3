// src/mcp/tools/catalog.rs
// Discovery tools: services, functions, function detail, credentials

use super::to_text;
use crate::mcp::AstroServer;
use crate::registry::catalog;
use serde_json::json;

pub fn list_services(server: &AstroServer) -> Result<String, String> {
    to_text(&catalog::list_modules(server.registry()))
}

pub fn list_functions(server: &AstroServer, module_name: Option<String>) -> Result<String, String> {
    to_text(&catalog::list_functions(server.registry(), module_name.as_deref()))
}

pub fn get_function_info(server: &AstroServer, module_name: &str, function_name: &str) -> Result<String, String> {
    to_text(&catalog::get_function_info(server.registry(), module_name, function_name))
}

pub fn auth_status(server: &AstroServer) -> Result<String, String> {
    let status = server.registry().context().credentials.status();
    to_text(&json!({ "services": status }))
}
