// src/executor.rs
// Uniform execution path: auth, resolution, coercion, pacing, retry, normalization

use crate::backends::CallArgs;
use crate::backends::args::check_names;
use crate::coerce::{Argument, Coercer};
use crate::error::{CallError, ErrorCode, ToolError, timeout_error, validation_error};
use crate::normalize::normalize;
use crate::registry::{Registry, find_operation};
use crate::retry::{RateLimiterRegistry, RetryPolicy, gather_with_concurrency, with_retry};
use crate::utils::{truncate, truncate_chars};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest echoed parameter value in a success envelope
const MAX_ECHO_CHARS: usize = 100;

/// Longest error text carried in `details.error`
const MAX_ERROR_DETAIL: usize = 500;

/// One call in a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub module: String,
    pub function: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl ExecuteRequest {
    pub fn new(module: impl Into<String>, function: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
            params,
        }
    }
}

/// Runs operations on registry services and wraps results in the success envelope
pub struct Executor {
    registry: Arc<Registry>,
    coercer: Coercer,
    limiters: RateLimiterRegistry,
    policy: RetryPolicy,
    timeout: Duration,
}

impl Executor {
    /// Executor configured from the registry's shared config
    pub fn new(registry: Arc<Registry>) -> Self {
        let ctx = registry.context();
        let config = ctx.config.clone();
        Self {
            coercer: Coercer::new(ctx.resolver.clone()),
            limiters: RateLimiterRegistry::new(config.rate_limit_map()),
            policy: config.retry_policy(),
            timeout: config.timeout(),
            registry,
        }
    }

    pub fn with_coercer(mut self, coercer: Coercer) -> Self {
        self.coercer = coercer;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Execute `service.operation` and return `{success, module, function, params, result}`
    pub async fn execute(
        &self,
        service: &str,
        operation: &str,
        params: Map<String, Value>,
    ) -> Result<Value, ToolError> {
        self.prepare_credentials(service);

        let backend = self.registry.resolve(service)?;
        let member = find_operation(backend.as_ref(), operation).ok_or_else(|| {
            validation_error(format!("Function not found: {}.{}", service, operation), "executor")
                .suggestion("Use list_functions to see available functions")
        })?;

        let param_names: Vec<String> = params.keys().cloned().collect();
        let echoed: Map<String, Value> = params
            .iter()
            .map(|(k, v)| {
                let text = Argument::Json(v.clone()).to_string();
                (k.clone(), Value::String(truncate_chars(&text, MAX_ECHO_CHARS)))
            })
            .collect();

        // Names are checked before coercion can reach the name resolver
        check_names(member, params.keys().map(String::as_str))
            .map_err(|e| invalid_parameters(service, operation, &e.to_string(), &param_names))?;

        let mut args = CallArgs::new();
        for (name, value) in params {
            let arg = self.coercer.coerce(&name, value).await;
            args.insert(name, arg);
        }

        let limiter = self.limiters.get(service);
        let call = with_retry(&self.policy, service, || {
            let backend = backend.clone();
            let limiter = limiter.clone();
            let args = args.clone();
            async move {
                limiter.acquire().await;
                backend.invoke(operation, args).await
            }
        });

        let output = match tokio::time::timeout(self.timeout, call).await {
            Err(_) => {
                warn!(service = %service, operation = %operation, "Execution timed out");
                return Err(timeout_error(self.timeout.as_secs_f64(), service));
            }
            Ok(result) => result.map_err(|e| classify(service, operation, e, &param_names))?,
        };

        info!(service = %service, operation = %operation, params = ?param_names, "Executed operation");

        Ok(json!({
            "success": true,
            "module": service,
            "function": operation,
            "params": echoed,
            "result": normalize(output),
        }))
    }

    /// Execute every request with at most `limit` in flight; results keep input order
    pub async fn execute_many(&self, requests: &[ExecuteRequest], limit: usize) -> Vec<Result<Value, ToolError>> {
        debug!(count = requests.len(), limit, "Executing batch");
        let futures: Vec<_> = requests
            .iter()
            .cloned()
            .map(|r| async move { self.execute(&r.module, &r.function, r.params).await })
            .collect();
        gather_with_concurrency(limit, futures).await
    }

    /// Configuration failure is logged and the call proceeds
    fn prepare_credentials(&self, service: &str) {
        let credentials = &self.registry.context().credentials;
        let requires_auth = self.registry.entry(service).is_some_and(|e| e.requires_auth);
        if !requires_auth && !credentials.handles(service) {
            return;
        }
        match credentials.configure(service) {
            Ok(true) => {}
            Ok(false) => debug!(service = %service, "No credentials configured"),
            Err(e) => warn!(service = %service, error = %e, "Credential configuration failed"),
        }
    }
}

fn invalid_parameters(service: &str, operation: &str, message: &str, params: &[String]) -> ToolError {
    validation_error(
        format!("Invalid parameters for {}.{}: {}", service, operation, message),
        "executor",
    )
    .suggestion("Check parameter names and types using get_function_info")
    .detail("params", params.to_vec())
}

/// Map an invocation failure onto the structured error returned to callers
fn classify(service: &str, operation: &str, err: CallError, params: &[String]) -> ToolError {
    match err {
        CallError::Domain(e) => e,
        CallError::InvalidArguments(message) => invalid_parameters(service, operation, &message, params),
        other => {
            let text = other.to_string();
            ToolError::new(ErrorCode::ServiceError, format!("Execution failed: {}", text), service)
                .suggestion("Check parameters and try again")
                .detail("function", operation)
                .detail("error", truncate(&text, MAX_ERROR_DETAIL))
        }
    }
}
