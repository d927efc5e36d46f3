// src/mcp/mod.rs
// MCP Server implementation

pub mod requests;
pub mod tools;

use crate::executor::Executor;
use crate::registry::Registry;
use requests::{ExecuteBatchRequest, ExecuteRequest, GetFunctionInfoRequest, ListFunctionsRequest};
use rmcp::{
    handler::server::{router::tool::ToolRouter, tool::ToolCallContext, wrapper::Parameters},
    model::{
        CallToolRequestParam, CallToolResult, ListToolsResult, PaginatedRequestParam,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router, ErrorData, ServerHandler,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

const INSTRUCTIONS: &str = "Astro MCP gives uniform access to astronomical data services \
(SIMBAD, NED, VizieR, ADS, MAST, Gaia, IRSA, HEASARC, ESA and other TAP archives). \
Workflow: astro_list_services to see which modules are available, astro_list_functions to \
browse their operations, astro_get_function_info for parameter details, then astro_execute \
(or astro_execute_batch for several independent calls). Coordinates may be given as \
{\"ra\": deg, \"dec\": deg}, a coordinate string, or an object name; radii as a number of \
arcminutes or {\"value\": v, \"unit\": \"arcsec\"}. Failures return a structured error with \
a code, a recoverable flag and a suggestion.";

/// MCP Server state
#[derive(Clone)]
pub struct AstroServer {
    pub executor: Arc<Executor>,
    tool_router: ToolRouter<Self>,
}

impl AstroServer {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self {
            executor,
            tool_router: Self::tool_router(),
        }
    }

    pub fn registry(&self) -> &Registry {
        self.executor.registry()
    }
}

#[tool_router]
impl AstroServer {
    #[tool(description = "List available astronomical data services with availability, category and auth requirements.")]
    async fn astro_list_services(&self) -> Result<String, String> {
        tools::catalog::list_services(self)
    }

    #[tool(description = "List callable functions, optionally for one module, with parameters and short descriptions.")]
    async fn astro_list_functions(
        &self,
        Parameters(req): Parameters<ListFunctionsRequest>,
    ) -> Result<String, String> {
        tools::catalog::list_functions(self, req.module_name)
    }

    #[tool(description = "Get full documentation and parameter details for one function.")]
    async fn astro_get_function_info(
        &self,
        Parameters(req): Parameters<GetFunctionInfoRequest>,
    ) -> Result<String, String> {
        tools::catalog::get_function_info(self, &req.module_name, &req.function_name)
    }

    #[tool(description = "Execute a function on a data service. Returns {success, module, function, params, result}.")]
    async fn astro_execute(&self, Parameters(req): Parameters<ExecuteRequest>) -> Result<String, String> {
        tools::execute::execute(self, &req.module_name, &req.function_name, req.params).await
    }

    #[tool(description = "Execute several independent calls concurrently. Per-service rate limits still apply.")]
    async fn astro_execute_batch(
        &self,
        Parameters(req): Parameters<ExecuteBatchRequest>,
    ) -> Result<String, String> {
        tools::execute::execute_batch(self, req.calls, req.max_concurrency).await
    }

    #[tool(description = "Show which services have API tokens configured and which environment variables to set.")]
    async fn astro_auth_status(&self) -> Result<String, String> {
        tools::catalog::auth_status(self)
    }
}

impl ServerHandler for AstroServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: rmcp::model::Implementation {
                name: "astro-mcp".into(),
                title: Some("Astro MCP - Astronomical Data Services".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(INSTRUCTIONS.into()),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        async move {
            let tool_name = request.name.to_string();
            let call_id = uuid::Uuid::new_v4().to_string();
            let start = std::time::Instant::now();
            debug!(tool = %tool_name, call_id = %call_id, "Tool call started");

            let ctx = ToolCallContext::new(self, request, context);
            let result = self.tool_router.call(ctx).await;

            let duration_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(r) if r.is_error != Some(true) => {
                    info!(tool = %tool_name, call_id = %call_id, duration_ms, "Tool call finished")
                }
                Ok(_) => warn!(tool = %tool_name, call_id = %call_id, duration_ms, "Tool call returned an error"),
                Err(e) => warn!(tool = %tool_name, call_id = %call_id, duration_ms, error = %e.message, "Tool call rejected"),
            }

            result
        }
    }
}
