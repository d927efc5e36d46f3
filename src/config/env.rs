// src/config/env.rs
// Environment-based configuration: .env files and numeric overrides

use super::file::AstroConfig;
use tracing::{debug, warn};

/// Overall per-call timeout override, seconds
pub const TIMEOUT_ENV: &str = "ASTRO_MCP_TIMEOUT";
/// Retry ceiling override
pub const MAX_RETRIES_ENV: &str = "ASTRO_MCP_MAX_RETRIES";

/// Load .env files (global first, then project - project overrides)
pub fn load_dotenv() {
    let global = AstroConfig::config_dir().join(".env");
    if dotenvy::from_path(&global).is_ok() {
        debug!(path = %global.display(), "Loaded global .env");
    }
    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = %path.display(), "Loaded project .env");
    }
}

/// Read a single variable from the environment, filtering empty values
pub fn read_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Numeric overrides taken from the environment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub timeout: Option<u64>,
    pub max_retries: Option<u32>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(read_var)
    }

    /// Build from any variable source; unparsable values are ignored
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            timeout: parse_var(&lookup, TIMEOUT_ENV),
            max_retries: parse_var(&lookup, MAX_RETRIES_ENV),
        }
    }

    pub fn apply(&self, config: &mut AstroConfig) {
        if let Some(timeout) = self.timeout {
            debug!(timeout, "Timeout overridden from environment");
            config.defaults.timeout = timeout;
        }
        if let Some(max_retries) = self.max_retries {
            debug!(max_retries, "Retry ceiling overridden from environment");
            config.defaults.max_retries = max_retries;
        }
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "Ignoring non-numeric environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_overrides_apply() {
        let overrides = EnvOverrides::from_lookup(lookup(&[(TIMEOUT_ENV, "15"), (MAX_RETRIES_ENV, " 1 ")]));
        assert_eq!(overrides.timeout, Some(15));
        assert_eq!(overrides.max_retries, Some(1));

        let mut config = AstroConfig::default();
        overrides.apply(&mut config);
        assert_eq!(config.defaults.timeout, 15);
        assert_eq!(config.defaults.max_retries, 1);
    }

    #[test]
    fn test_bad_values_are_ignored() {
        let overrides = EnvOverrides::from_lookup(lookup(&[(TIMEOUT_ENV, "soon"), (MAX_RETRIES_ENV, "-2")]));
        assert_eq!(overrides, EnvOverrides::default());

        let mut config = AstroConfig::default();
        overrides.apply(&mut config);
        assert_eq!(config, AstroConfig::default());
    }

    #[test]
    fn test_read_var_missing() {
        assert_eq!(read_var("ASTRO_MCP_TEST_DEFINITELY_UNSET_VARIABLE"), None);
    }
}
