// src/backends/mod.rs
// Service backends: explicit member tables plus invoke-by-name

pub mod ads;
pub mod args;
pub mod coordinates;
pub mod gcn;
pub mod mast;
pub mod ned;
pub mod simbad;
pub mod tap;
pub mod votable;

use crate::auth::CredentialProvider;
use crate::config::AstroConfig;
use crate::error::CallError;
use crate::resolver::NameResolver;
use crate::retry::BlockingPool;
use crate::value::Output;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub use args::CallArgs;

/// How a member is attached to its backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Method,
    ClassMethod,
    StaticMethod,
    /// Plain data; never callable
    Attribute,
}

/// One declared parameter of a member
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSig {
    pub name: &'static str,
    /// Declared type label (`str`, `SkyCoord`, `Quantity`, ...)
    pub ty: &'static str,
    /// `None` when the parameter is required; `Some(Value::Null)` for a null default
    pub default: Option<Value>,
}

impl ParamSig {
    pub fn required(name: &'static str, ty: &'static str) -> Self {
        Self { name, ty, default: None }
    }

    pub fn optional(name: &'static str, ty: &'static str, default: impl Into<Value>) -> Self {
        Self {
            name,
            ty,
            default: Some(default.into()),
        }
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

/// A named member of a backend, as discovery sees it
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: &'static str,
    pub kind: MemberKind,
    pub doc: &'static str,
    pub params: Vec<ParamSig>,
}

impl Member {
    pub fn method(name: &'static str, doc: &'static str, params: Vec<ParamSig>) -> Self {
        Self {
            name,
            kind: MemberKind::Method,
            doc,
            params,
        }
    }

    pub fn class_method(name: &'static str, doc: &'static str, params: Vec<ParamSig>) -> Self {
        Self {
            kind: MemberKind::ClassMethod,
            ..Self::method(name, doc, params)
        }
    }

    pub fn static_method(name: &'static str, doc: &'static str, params: Vec<ParamSig>) -> Self {
        Self {
            kind: MemberKind::StaticMethod,
            ..Self::method(name, doc, params)
        }
    }

    pub fn attribute(name: &'static str) -> Self {
        Self {
            name,
            kind: MemberKind::Attribute,
            doc: "",
            params: Vec::new(),
        }
    }

    pub fn is_callable(&self) -> bool {
        self.kind != MemberKind::Attribute
    }

    pub fn is_class_level(&self) -> bool {
        matches!(self.kind, MemberKind::ClassMethod | MemberKind::StaticMethod)
    }
}

/// A remote (or local) data service reachable by operation name
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name of the backing class, e.g. `Simbad`
    fn class_name(&self) -> &str;

    /// Every member, exposed or not; discovery filters this list
    fn members(&self) -> &[Member];

    async fn invoke(&self, operation: &str, args: CallArgs) -> Result<Output, CallError>;
}

/// Shared collaborators handed to every backend at construction
#[derive(Clone)]
pub struct BackendContext {
    pub client: reqwest::Client,
    pub config: Arc<AstroConfig>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub resolver: Arc<dyn NameResolver>,
    pub pool: BlockingPool,
}

/// Failure for an operation name the backend does not implement
pub(crate) fn unknown_operation(class_name: &str, operation: &str) -> CallError {
    CallError::invalid(format!("'{}' object has no operation '{}'", class_name, operation))
}

/// Escape a literal for inclusion in an ADQL string
pub(crate) fn adql_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
