// src/config/file.rs
// File-based configuration from ~/.astro-mcp/config.toml

use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Env var naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "ASTRO_MCP_CONFIG";

/// Top-level config structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstroConfig {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitConfig>,
    #[serde(default)]
    pub auth: BTreeMap<String, AuthConfig>,
    #[serde(default)]
    pub endpoints: EndpointConfig,
    #[serde(default)]
    pub resolvers: ResolverConfig,
}

/// `[defaults]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Overall per-call deadline, seconds
    pub timeout: u64,
    pub max_retries: u32,
    pub backoff_factor: f64,
    /// Upper bound on a single backoff delay, seconds
    pub max_backoff: u64,
    /// Batch fan-out and blocking-pool size
    pub max_concurrency: usize,
    /// Row cap applied to tabular archive queries
    pub max_rows: usize,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: 60,
            max_retries: 3,
            backoff_factor: 2.0,
            max_backoff: 60,
            max_concurrency: 4,
            max_rows: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Environment variable holding the token
    pub token_env: String,
}

/// `[endpoints]` section: per-service base URLs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EndpointConfig {
    pub tap: BTreeMap<String, String>,
    pub rest: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub fallback_order: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fallback_order: vec!["simbad".into(), "ned".into(), "vizier".into()],
        }
    }
}

const DEFAULT_TAP_ENDPOINTS: &[(&str, &str)] = &[
    ("simbad", "https://simbad.cds.unistra.fr/simbad/sim-tap"),
    ("ned", "https://ned.ipac.caltech.edu/tap"),
    ("vizier", "http://tapvizier.u-strasbg.fr/TAPVizieR/tap"),
    ("heasarc", "https://heasarc.gsfc.nasa.gov/xamin/vo/tap"),
    ("irsa", "https://irsa.ipac.caltech.edu/TAP"),
    ("nea", "https://exoplanetarchive.ipac.caltech.edu/TAP"),
    ("gaia", "https://gea.esac.esa.int/tap-server/tap"),
    ("mast", "https://mast.stsci.edu/vo-tap/api/v0.1/caom"),
    ("mast_catalogs", "https://mast.stsci.edu/vo-tap/api/v0.1/tic"),
    ("alma", "https://almascience.eso.org/tap"),
    ("esa_hubble", "https://hst.esac.esa.int/tap-server/tap"),
    ("esa_jwst", "https://jwst.esac.esa.int/server/tap"),
    ("xmm_newton", "https://nxsa.esac.esa.int/tap-server/tap"),
];

const DEFAULT_REST_ENDPOINTS: &[(&str, &str)] = &[
    ("ned", "https://ned.ipac.caltech.edu/srs/ObjectLookup"),
    ("ads", "https://api.adsabs.harvard.edu/v1"),
    ("gcn", "https://gcn.nasa.gov"),
];

impl Default for AstroConfig {
    fn default() -> Self {
        let pairs = |table: &[(&str, &str)]| {
            table
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>()
        };

        let rate_limits = [("simbad", 5.0), ("ads", 10.0)]
            .into_iter()
            .map(|(k, rps)| (k.to_string(), RateLimitConfig { requests_per_second: rps }))
            .collect();

        let auth = [("ads", "ADS_TOKEN"), ("mast", "MAST_TOKEN"), ("mast_catalogs", "MAST_TOKEN")]
            .into_iter()
            .map(|(k, env)| (k.to_string(), AuthConfig { token_env: env.to_string() }))
            .collect();

        Self {
            defaults: Defaults::default(),
            rate_limits,
            auth,
            endpoints: EndpointConfig {
                tap: pairs(DEFAULT_TAP_ENDPOINTS),
                rest: pairs(DEFAULT_REST_ENDPOINTS),
            },
            resolvers: ResolverConfig::default(),
        }
    }
}

impl AstroConfig {
    /// Load config, resolving the path from the CLI flag, then
    /// `ASTRO_MCP_CONFIG`, then `~/.astro-mcp/config.toml`.
    ///
    /// An explicit path that cannot be read or parsed is an error; a missing
    /// or broken default file falls back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config = Self::from_toml(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            debug!(path = %path.display(), "Loaded config from file");
            return Ok(config);
        }

        let path = super::env::read_var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(Self::config_path);
        Ok(Self::load_or_default(&path))
    }

    /// Load from `path`, logging and falling back to defaults on any failure
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
        }
    }

    /// Parse TOML and deep-merge it over the defaults
    pub fn from_toml(contents: &str) -> Result<Self> {
        let overlay: toml::Table = contents.parse().context("invalid TOML")?;
        let mut merged = toml::Value::try_from(Self::default()).context("failed to encode defaults")?;
        deep_merge(&mut merged, toml::Value::Table(overlay));
        merged.try_into().context("invalid configuration values")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".astro-mcp")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.defaults.timeout)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.defaults.max_retries,
            backoff_factor: self.defaults.backoff_factor,
            max_backoff: Duration::from_secs(self.defaults.max_backoff),
        }
    }

    /// Requests-per-second per service, for the limiter registry
    pub fn rate_limit_map(&self) -> HashMap<String, f64> {
        self.rate_limits
            .iter()
            .map(|(k, v)| (k.clone(), v.requests_per_second))
            .collect()
    }

    pub fn tap_endpoint(&self, service: &str) -> Option<&str> {
        self.endpoints
            .tap
            .get(service)
            .map(String::as_str)
            .filter(|u| !u.trim().is_empty())
    }

    pub fn rest_endpoint(&self, service: &str) -> Option<&str> {
        self.endpoints
            .rest
            .get(service)
            .map(String::as_str)
            .filter(|u| !u.trim().is_empty())
    }
}

fn deep_merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AstroConfig::default();
        assert_eq!(config.defaults.timeout, 60);
        assert_eq!(config.defaults.max_retries, 3);
        assert_eq!(config.defaults.backoff_factor, 2.0);
        assert_eq!(config.defaults.max_rows, 10_000);
        assert_eq!(config.rate_limits["simbad"].requests_per_second, 5.0);
        assert_eq!(config.auth["ads"].token_env, "ADS_TOKEN");
        assert_eq!(config.resolvers.fallback_order, vec!["simbad", "ned", "vizier"]);
        assert!(config.tap_endpoint("gaia").is_some());
        assert!(config.tap_endpoint("sdss").is_none());
    }

    #[test]
    fn test_parse_empty_config() {
        let config = AstroConfig::from_toml("").unwrap();
        assert_eq!(config, AstroConfig::default());
    }

    #[test]
    fn test_file_values_merge_over_defaults() {
        let toml = r#"
[defaults]
timeout = 120

[rate_limits.gaia]
requests_per_second = 2.5

[endpoints.tap]
sdss = "https://skyserver.sdss.org/tap"

[resolvers]
fallback_order = ["ned"]
"#;
        let config = AstroConfig::from_toml(toml).unwrap();
        assert_eq!(config.defaults.timeout, 120);
        // Untouched keys keep their defaults
        assert_eq!(config.defaults.max_retries, 3);
        assert_eq!(config.rate_limits["gaia"].requests_per_second, 2.5);
        assert_eq!(config.rate_limits["simbad"].requests_per_second, 5.0);
        assert_eq!(config.tap_endpoint("sdss"), Some("https://skyserver.sdss.org/tap"));
        assert!(config.tap_endpoint("gaia").is_some());
        assert_eq!(config.resolvers.fallback_order, vec!["ned"]);
    }

    #[test]
    fn test_blank_endpoint_disables_service() {
        let config = AstroConfig::from_toml("[endpoints.tap]\ngaia = \"\"\n").unwrap();
        assert!(config.tap_endpoint("gaia").is_none());
    }

    #[test]
    fn test_invalid_config_is_error() {
        assert!(AstroConfig::from_toml("[defaults\ntimeout = 1").is_err());
        assert!(AstroConfig::from_toml("[defaults]\ntimeout = \"soon\"").is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[defaults]\nmax_retries = 7").unwrap();
        let config = AstroConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.defaults.max_retries, 7);
        assert_eq!(config.retry_policy().max_retries, 7);
    }

    #[test]
    fn test_load_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AstroConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_load_or_default_tolerates_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml ===").unwrap();
        assert_eq!(AstroConfig::load_or_default(file.path()), AstroConfig::default());

        let dir = tempfile::tempdir().unwrap();
        assert_eq!(AstroConfig::load_or_default(&dir.path().join("missing.toml")), AstroConfig::default());
    }

    #[test]
    fn test_derived_values() {
        let config = AstroConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(60));
        let policy = config.retry_policy();
        assert_eq!(policy.max_backoff, Duration::from_secs(60));
        assert_eq!(config.rate_limit_map()["ads"], 10.0);
    }
}
