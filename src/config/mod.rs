// src/config/mod.rs
// Configuration: TOML file merged over defaults, plus environment overrides

pub mod env;
pub mod file;

pub use env::{EnvOverrides, load_dotenv, read_var};
pub use file::{AstroConfig, AuthConfig, Defaults, EndpointConfig, RateLimitConfig, ResolverConfig};
