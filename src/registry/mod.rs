// src/registry/mod.rs
// Service catalog: static table, lazily resolved backends, discovery

pub mod catalog;
pub mod introspect;

pub use introspect::{OperationDescriptor, ParameterDescriptor, describe, find_operation, is_exposed};

use crate::backends::ads::Ads;
use crate::backends::coordinates::Coordinates;
use crate::backends::gcn::Gcn;
use crate::backends::mast::Observations;
use crate::backends::ned::Ned;
use crate::backends::simbad::Simbad;
use crate::backends::tap::TapService;
use crate::backends::{Backend, BackendContext};
use crate::error::{ErrorCode, ToolError, validation_error};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Static description of one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub name: &'static str,
    pub class_path: &'static str,
    pub requires_auth: bool,
    pub category: &'static str,
}

const fn entry(name: &'static str, class_path: &'static str, requires_auth: bool, category: &'static str) -> ServiceEntry {
    ServiceEntry {
        name,
        class_path,
        requires_auth,
        category,
    }
}

/// Prefix of class paths served by the generic TAP backend
const TAP_CLASS_PREFIX: &str = "backends::tap::TapService/";

/// Every built-in service, in display order
pub const SERVICES: &[ServiceEntry] = &[
    entry("simbad", "backends::simbad::Simbad", false, "object_resolver"),
    entry("ned", "backends::ned::Ned", false, "object_resolver"),
    entry("vizier", "backends::tap::TapService/vizier", false, "catalog"),
    entry("ads", "backends::ads::Ads", true, "literature"),
    entry("mast", "backends::mast::Observations", true, "archive"),
    entry("mast_catalogs", "backends::tap::TapService/mast_catalogs", true, "catalog"),
    entry("heasarc", "backends::tap::TapService/heasarc", false, "archive"),
    entry("irsa", "backends::tap::TapService/irsa", false, "archive"),
    entry("nea", "backends::tap::TapService/nea", false, "catalog"),
    entry("gaia", "backends::tap::TapService/gaia", false, "catalog"),
    entry("sdss", "backends::tap::TapService/sdss", false, "catalog"),
    entry("alma", "backends::tap::TapService/alma", false, "archive"),
    entry("esa_hubble", "backends::tap::TapService/esa_hubble", false, "archive"),
    entry("esa_jwst", "backends::tap::TapService/esa_jwst", false, "archive"),
    entry("xmm_newton", "backends::tap::TapService/xmm_newton", false, "archive"),
    entry("gcn", "backends::gcn::Gcn", false, "alerts"),
    entry("coordinates", "backends::coordinates::Coordinates", false, "utility"),
];

/// One service as reported by `list_services`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub class_path: String,
    pub available: bool,
    pub requires_auth: bool,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Builds the backend behind a class path
pub type BackendFactory =
    Arc<dyn Fn(&ServiceEntry, &BackendContext) -> Result<Arc<dyn Backend>, ToolError> + Send + Sync>;

/// Resolve a built-in class path
pub fn construct(entry: &ServiceEntry, ctx: &BackendContext) -> Result<Arc<dyn Backend>, ToolError> {
    let ctx = ctx.clone();
    let backend: Arc<dyn Backend> = match entry.class_path {
        "backends::simbad::Simbad" => Arc::new(Simbad::new(ctx)?),
        "backends::ned::Ned" => Arc::new(Ned::new(ctx)?),
        "backends::ads::Ads" => Arc::new(Ads::new(ctx)?),
        "backends::mast::Observations" => Arc::new(Observations::new(ctx)?),
        "backends::gcn::Gcn" => Arc::new(Gcn::new(ctx)?),
        "backends::coordinates::Coordinates" => Arc::new(Coordinates::new(ctx.resolver.clone())),
        path => match path.strip_prefix(TAP_CLASS_PREFIX) {
            Some(service) => Arc::new(TapService::new(service, ctx)?),
            None => {
                return Err(ToolError::new(
                    ErrorCode::InternalError,
                    format!("Cannot resolve class path: {}", path),
                    entry.name,
                )
                .recoverable(false));
            }
        },
    };
    Ok(backend)
}

/// The fixed service catalog and its resolved backends.
///
/// Successful resolutions are cached for the life of the registry;
/// failures are not, so a later call tries again.
pub struct Registry {
    entries: Vec<ServiceEntry>,
    ctx: BackendContext,
    factory: BackendFactory,
    cache: RwLock<HashMap<String, Arc<dyn Backend>>>,
}

impl Registry {
    pub fn new(ctx: BackendContext) -> Self {
        Self::with_factory(SERVICES.to_vec(), ctx, Arc::new(construct))
    }

    pub fn with_factory(entries: Vec<ServiceEntry>, ctx: BackendContext, factory: BackendFactory) -> Self {
        Self {
            entries,
            ctx,
            factory,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &BackendContext {
        &self.ctx
    }

    pub fn entries(&self) -> &[ServiceEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&ServiceEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn service_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name).collect()
    }

    fn cached(&self, name: &str) -> Option<Arc<dyn Backend>> {
        match self.cache.read() {
            Ok(cache) => cache.get(name).cloned(),
            Err(poisoned) => poisoned.into_inner().get(name).cloned(),
        }
    }

    /// Backend for `name`, resolving it on first use
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Backend>, ToolError> {
        let entry = self.entry(name).ok_or_else(|| {
            validation_error(format!("Unknown module: {}", name), "executor")
                .suggestion(format!("Available modules: {}", self.service_names().join(", ")))
                .detail("module", name)
        })?;

        if let Some(backend) = self.cached(name) {
            return Ok(backend);
        }

        match (self.factory)(entry, &self.ctx) {
            Ok(backend) => {
                debug!(service = %name, class = %backend.class_name(), "Resolved service");
                let mut cache = match self.cache.write() {
                    Ok(cache) => cache,
                    Err(poisoned) => poisoned.into_inner(),
                };
                // A concurrent resolution may have won; either value is equivalent
                let backend = cache.entry(name.to_string()).or_insert(backend).clone();
                Ok(backend)
            }
            Err(e) => {
                warn!(service = %name, class_path = %entry.class_path, error = %e, "Service unavailable");
                Err(e)
            }
        }
    }

    /// One descriptor per configured service; never fails
    pub fn list_services(&self) -> Vec<ServiceDescriptor> {
        self.entries
            .iter()
            .map(|entry| {
                let error = self.resolve(entry.name).err().map(|e| e.message);
                ServiceDescriptor {
                    name: entry.name.to_string(),
                    class_path: entry.class_path.to_string(),
                    available: error.is_none(),
                    requires_auth: entry.requires_auth,
                    category: entry.category.to_string(),
                    error,
                }
            })
            .collect()
    }

    /// Operations per service; unavailable or unknown services are absent
    pub fn discover(&self, service: Option<&str>) -> BTreeMap<String, Vec<OperationDescriptor>> {
        let names: Vec<&str> = match service {
            Some(name) => self.entry(name).map(|e| e.name).into_iter().collect(),
            None => self.service_names(),
        };

        let mut catalog = BTreeMap::new();
        for name in names {
            let Ok(backend) = self.resolve(name) else {
                continue;
            };
            let operations = describe(name, backend.as_ref());
            debug!(service = %name, count = operations.len(), "Discovered operations");
            if !operations.is_empty() {
                catalog.insert(name.to_string(), operations);
            }
        }
        catalog
    }
}
