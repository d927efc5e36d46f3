// src/registry/introspect.rs
// Operation discovery over a backend's member table

use crate::backends::{Backend, Member};
use crate::utils::truncate_chars;
use serde::Serialize;
use serde_json::Value;

/// Members never exposed, whatever their name
pub const SKIP_MEMBERS: &[&str] = &[
    "__init__",
    "__class__",
    "__repr__",
    "__str__",
    "_request",
    "_parse_result",
    "_args_to_payload",
];

/// Exposed even though no verb prefix matches
pub const ALWAYS_INCLUDE: &[&str] = &[
    "login",
    "logout",
    "login_gui",
    "authenticated",
    "auth",
    "help",
    "help_tap",
];

/// Verb prefixes of query-like operations.
///
/// A member matches when its name starts with the prefix or equals the
/// prefix without its trailing underscore (`search_` accepts `search`).
pub const QUERY_PREFIXES: &[&str] = &[
    // Core queries
    "query_", "get_", "list_", "search_", "download_", "fetch_", "resolve_", "cone_search", "locate_",
    // Cache management
    "clear_", "reset_",
    // TAP and async workflows
    "launch_", "load_", "save_", "upload_",
    // Analysis and filtering
    "cross_", "filter_",
    // Resource management
    "enable_", "disable_", "delete_", "remove_", "rename_",
    "share_",
    "add_", "find_",
];

/// Longest parameter description kept from documentation
const MAX_PARAM_DESCRIPTION: usize = 200;

/// Lines after a parameter's own line that may continue its description
const MAX_CONTINUATION_LINES: usize = 4;

const PARAM_HEADERS: &[&str] = &["parameters", "parameters:", "args:", "arguments:"];
const SECTION_ENDS: &[&str] = &["returns", "returns:", "raises", "raises:", "examples", "examples:"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub type_label: String,
    pub default: Option<Value>,
    pub has_default: bool,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationDescriptor {
    pub service_name: String,
    pub class_name: String,
    pub operation_name: String,
    pub full_name: String,
    /// First documentation line, or `Class.operation` when undocumented
    pub description: String,
    pub documentation: String,
    pub parameters: Vec<ParameterDescriptor>,
}

fn matches_prefix(name: &str) -> bool {
    QUERY_PREFIXES
        .iter()
        .any(|p| name.starts_with(p) || name == p.trim_end_matches('_'))
}

/// Whether discovery (and therefore execution) may see this member
pub fn is_exposed(member: &Member) -> bool {
    if member.name.starts_with('_') || SKIP_MEMBERS.contains(&member.name) {
        return false;
    }
    if !member.is_callable() {
        return false;
    }
    matches_prefix(member.name) || ALWAYS_INCLUDE.contains(&member.name) || member.is_class_level()
}

/// The exposed member called `operation`, if any
pub fn find_operation<'a>(backend: &'a dyn Backend, operation: &str) -> Option<&'a Member> {
    backend
        .members()
        .iter()
        .find(|m| m.name == operation && is_exposed(m))
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn starts_new_entry(line: &str) -> bool {
    line.chars().next().is_some_and(char::is_alphabetic) && line.chars().take(30).any(|c| c == ':')
}

/// Description of `param` from a documentation block, or "" when absent.
///
/// Scanning starts at a `Parameters`/`Args:` header. The parameter's line
/// is the one beginning with its name followed by a non-identifier
/// character; up to four following lines continue it, stopping at a blank
/// line or the next `name:` entry. A `Returns`/`Raises`/`Examples` header
/// ends the search.
pub fn extract_param_description(doc: &str, param: &str) -> String {
    if doc.is_empty() || param.is_empty() {
        return String::new();
    }

    let lines: Vec<&str> = doc.lines().collect();
    let mut in_params = false;

    for (i, line) in lines.iter().enumerate() {
        let stripped = line.trim();
        let lower = stripped.to_lowercase();

        if PARAM_HEADERS.contains(&lower.as_str()) {
            in_params = true;
            continue;
        }
        if !in_params {
            continue;
        }

        if let Some(rest) = stripped.strip_prefix(param)
            && !rest.starts_with(is_ident_char)
        {
            let mut parts: Vec<&str> = Vec::new();
            let rest = rest.trim_start_matches([':', ' ']);
            if !rest.is_empty() {
                parts.push(rest);
            }
            for next in lines.iter().skip(i + 1).take(MAX_CONTINUATION_LINES) {
                let next = next.trim();
                if next.is_empty() || starts_new_entry(next) {
                    break;
                }
                parts.push(next);
            }
            return truncate_chars(&parts.join(" "), MAX_PARAM_DESCRIPTION);
        }

        if SECTION_ENDS.contains(&lower.as_str()) {
            break;
        }
    }

    String::new()
}

/// Descriptors for every exposed operation of one backend
pub fn describe(service_name: &str, backend: &dyn Backend) -> Vec<OperationDescriptor> {
    let class_name = backend.class_name();
    backend
        .members()
        .iter()
        .filter(|m| is_exposed(m))
        .map(|m| {
            let parameters = m
                .params
                .iter()
                .filter(|p| p.name != "self" && p.name != "cls")
                .map(|p| ParameterDescriptor {
                    name: p.name.to_string(),
                    type_label: p.ty.to_string(),
                    default: p.default.clone(),
                    has_default: p.has_default(),
                    description: extract_param_description(m.doc, p.name),
                })
                .collect();
            let description = match m.doc.lines().next() {
                Some(first) if !first.trim().is_empty() => first.trim().to_string(),
                _ => format!("{}.{}", class_name, m.name),
            };
            OperationDescriptor {
                service_name: service_name.to_string(),
                class_name: class_name.to_string(),
                operation_name: m.name.to_string(),
                full_name: format!("{}_{}", service_name, m.name),
                description,
                documentation: m.doc.to_string(),
                parameters,
            }
        })
        .collect()
}
