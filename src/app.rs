// src/app.rs
// Assemble shared collaborators into a ready executor

use crate::auth::{CredentialProvider, EnvCredentials};
use crate::backends::BackendContext;
use crate::config::AstroConfig;
use crate::executor::Executor;
use crate::http::create_shared_client;
use crate::registry::Registry;
use crate::resolver::{NameResolver, ResolverChain};
use crate::retry::BlockingPool;
use std::sync::Arc;
use tracing::debug;

/// Collaborators shared by every backend, built from config
pub fn backend_context(config: AstroConfig) -> BackendContext {
    let client = create_shared_client(config.timeout());
    let credentials: Arc<dyn CredentialProvider> = Arc::new(EnvCredentials::from_config(&config));
    let chain = ResolverChain::sesame(&client, &config.resolvers.fallback_order);
    debug!(resolvers = chain.len(), "Name resolver chain ready");
    let resolver: Arc<dyn NameResolver> = Arc::new(chain);
    let pool = BlockingPool::new(config.defaults.max_concurrency);

    BackendContext {
        client,
        config: Arc::new(config),
        credentials,
        resolver,
        pool,
    }
}

/// Registry over the built-in services plus an executor configured from `config`
pub fn build_executor(config: AstroConfig) -> Arc<Executor> {
    let registry = Arc::new(Registry::new(backend_context(config)));
    Arc::new(Executor::new(registry))
}
