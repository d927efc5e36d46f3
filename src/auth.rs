// src/auth.rs
// Credential lookup for services that need API tokens

use crate::config::{AstroConfig, read_var};
use crate::error::{ToolError, authentication_error};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Services that cannot work at all without a token
const REQUIRED: &[&str] = &["ads"];

/// Token availability for one service, as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthStatus {
    pub configured: bool,
    pub env_var: String,
    pub required: bool,
}

/// Source of per-service API tokens
pub trait CredentialProvider: Send + Sync {
    fn get_token(&self, service: &str) -> Option<String>;

    /// Whether `service` has an auth entry at all
    fn handles(&self, service: &str) -> bool;

    /// Prepare credentials before a call; `Ok(true)` when a token is in place
    fn configure(&self, service: &str) -> Result<bool, ToolError>;

    fn status(&self) -> BTreeMap<String, AuthStatus>;

    /// Token or an `AUTHENTICATION_ERROR` naming the variable to set
    fn require_token(&self, service: &str) -> Result<String, ToolError>;
}

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Tokens read from the environment variables named in `[auth.<service>]`
#[derive(Clone)]
pub struct EnvCredentials {
    env_vars: BTreeMap<String, String>,
    lookup: Lookup,
}

impl EnvCredentials {
    pub fn from_config(config: &AstroConfig) -> Self {
        Self::with_lookup(config, read_var)
    }

    pub fn with_lookup(
        config: &AstroConfig,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        let env_vars = config
            .auth
            .iter()
            .map(|(service, auth)| (service.clone(), auth.token_env.clone()))
            .collect();
        Self {
            env_vars,
            lookup: Arc::new(lookup),
        }
    }

    fn env_var(&self, service: &str) -> String {
        self.env_vars
            .get(service)
            .cloned()
            .unwrap_or_else(|| format!("{}_TOKEN", service.to_uppercase()))
    }
}

impl CredentialProvider for EnvCredentials {
    fn get_token(&self, service: &str) -> Option<String> {
        let var = self.env_vars.get(service)?;
        (self.lookup)(var).filter(|t| !t.trim().is_empty())
    }

    fn handles(&self, service: &str) -> bool {
        self.env_vars.contains_key(service)
    }

    fn configure(&self, service: &str) -> Result<bool, ToolError> {
        if self.get_token(service).is_some() {
            debug!(service = %service, "Credentials configured");
            return Ok(true);
        }
        if REQUIRED.contains(&service) {
            return Err(authentication_error(service, &self.env_var(service)));
        }
        Ok(false)
    }

    fn status(&self) -> BTreeMap<String, AuthStatus> {
        self.env_vars
            .iter()
            .map(|(service, var)| {
                let status = AuthStatus {
                    configured: self.get_token(service).is_some(),
                    env_var: var.clone(),
                    required: REQUIRED.contains(&service.as_str()),
                };
                (service.clone(), status)
            })
            .collect()
    }

    fn require_token(&self, service: &str) -> Result<String, ToolError> {
        self.get_token(service)
            .ok_or_else(|| authentication_error(service, &self.env_var(service)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn creds(vars: &'static [(&'static str, &'static str)]) -> EnvCredentials {
        EnvCredentials::with_lookup(&AstroConfig::default(), move |name| {
            vars.iter().find(|(k, _)| *k == name).map(|(_, v)| v.to_string())
        })
    }

    #[test]
    fn test_token_lookup() {
        let c = creds(&[("ADS_TOKEN", "secret"), ("MAST_TOKEN", "  ")]);
        assert_eq!(c.get_token("ads"), Some("secret".into()));
        assert_eq!(c.get_token("mast"), None);
        assert_eq!(c.get_token("gaia"), None);
        assert!(c.handles("mast_catalogs"));
        assert!(!c.handles("gaia"));
    }

    #[test]
    fn test_require_token_names_env_var() {
        let c = creds(&[]);
        let err = c.require_token("ads").unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthenticationError);
        assert_eq!(err.details["env_var"], "ADS_TOKEN");

        let err = c.require_token("esa_jwst").unwrap_err();
        assert_eq!(err.details["env_var"], "ESA_JWST_TOKEN");
    }

    #[test]
    fn test_configure() {
        let c = creds(&[("MAST_TOKEN", "t")]);
        assert!(c.configure("mast").unwrap());
        assert!(c.configure("ads").is_err());

        let c = creds(&[]);
        assert!(!c.configure("mast").unwrap());
    }

    #[test]
    fn test_status() {
        let c = creds(&[("ADS_TOKEN", "x")]);
        let status = c.status();
        assert_eq!(status.len(), 3);
        assert_eq!(
            status["ads"],
            AuthStatus {
                configured: true,
                env_var: "ADS_TOKEN".into(),
                required: true
            }
        );
        assert!(!status["mast"].configured);
        assert!(!status["mast"].required);
    }
}
