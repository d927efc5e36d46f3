// src/registry/catalog.rs
// JSON views over the registry for tool and CLI callers

use super::{OperationDescriptor, ParameterDescriptor, Registry};
use crate::utils::truncate_chars;
use serde_json::{Value, json};

/// Longest operation description in the function listing
const MAX_DESCRIPTION: usize = 200;
/// Longest stringified default in the function listing
const MAX_DEFAULT: usize = 50;

fn default_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parameter_view(p: &ParameterDescriptor, max_default: Option<usize>) -> Value {
    let default = p.default.as_ref().filter(|_| p.has_default).map(|d| {
        let text = default_text(d);
        match max_default {
            Some(max) => truncate_chars(&text, max),
            None => text,
        }
    });
    json!({
        "name": p.name,
        "type": p.type_label,
        "required": !p.has_default,
        "default": default,
        "description": p.description,
    })
}

fn function_view(op: &OperationDescriptor) -> Value {
    json!({
        "name": op.full_name,
        "module": op.service_name,
        "method": op.operation_name,
        "description": truncate_chars(&op.description, MAX_DESCRIPTION),
        "parameters": op.parameters.iter().map(|p| parameter_view(p, Some(MAX_DEFAULT))).collect::<Vec<_>>(),
    })
}

/// `{module_count, modules: [...]}`
pub fn list_modules(registry: &Registry) -> Value {
    let modules = registry.list_services();
    json!({
        "module_count": modules.len(),
        "modules": modules,
    })
}

/// `{function_count, functions: [...]}` for one module or all of them
pub fn list_functions(registry: &Registry, module: Option<&str>) -> Value {
    let catalog = registry.discover(module);
    if let Some(name) = module
        && !catalog.contains_key(name)
    {
        return json!({
            "functions": [],
            "error": format!("Module not found: {}", name),
        });
    }

    let functions: Vec<Value> = catalog.values().flatten().map(function_view).collect();
    json!({
        "function_count": functions.len(),
        "functions": functions,
    })
}

/// Untruncated description of one operation, or `{error}`
pub fn get_function_info(registry: &Registry, module: &str, function: &str) -> Value {
    let catalog = registry.discover(Some(module));
    let Some(operations) = catalog.get(module) else {
        return json!({ "error": format!("Module not found: {}", module) });
    };
    let Some(op) = operations.iter().find(|o| o.operation_name == function) else {
        return json!({ "error": format!("Function not found: {}.{}", module, function) });
    };
    json!({
        "name": op.full_name,
        "module": op.service_name,
        "class": op.class_name,
        "method": op.operation_name,
        "description": op.description,
        "documentation": op.documentation,
        "parameters": op.parameters.iter().map(|p| parameter_view(p, None)).collect::<Vec<_>>(),
    })
}
