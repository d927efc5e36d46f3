// src/backends/tap.rs
// Generic IVOA TAP archive client, configured per service

use super::votable::{self, parse_votable};
use super::{Backend, BackendContext, CallArgs, Member, ParamSig, adql_quote, unknown_operation};
use crate::coords::{Quantity, SkyCoord};
use crate::error::{CallError, ErrorCode, ToolError, not_found_error};
use crate::http;
use crate::retry::with_retry;
use crate::value::{Output, Table};
use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// First delay between async job phase polls
const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Ceiling for the growing poll delay
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default cone radius for `query_region`, arc-minutes
const DEFAULT_REGION_RADIUS: f64 = 2.0;
/// Default cone radius for `query_object`, arc-seconds
const DEFAULT_OBJECT_RADIUS: f64 = 5.0;

/// Per-archive table layout used by the cone helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapProfile {
    pub class_name: &'static str,
    pub default_table: Option<&'static str>,
    pub ra_column: &'static str,
    pub dec_column: &'static str,
}

const fn profile_of(
    class_name: &'static str,
    default_table: Option<&'static str>,
    ra_column: &'static str,
    dec_column: &'static str,
) -> TapProfile {
    TapProfile {
        class_name,
        default_table,
        ra_column,
        dec_column,
    }
}

/// Table layout for a service reached over TAP
pub fn profile(service: &str) -> Option<TapProfile> {
    let p = match service {
        "simbad" => profile_of("Simbad", Some("basic"), "ra", "dec"),
        "ned" => profile_of("Ned", Some("NEDTAP.objdir"), "ra", "dec"),
        "vizier" => profile_of("Vizier", None, "RAJ2000", "DEJ2000"),
        "heasarc" => profile_of("Heasarc", None, "ra", "dec"),
        "irsa" => profile_of("Irsa", Some("fp_psc"), "ra", "dec"),
        "nea" => profile_of("NasaExoplanetArchive", Some("ps"), "ra", "dec"),
        "gaia" => profile_of("Gaia", Some("gaiadr3.gaia_source"), "ra", "dec"),
        "mast" => profile_of("Observations", Some("ivoa.obscore"), "s_ra", "s_dec"),
        "mast_catalogs" => profile_of("Catalogs", Some("dbo.CatalogRecord"), "ra", "dec"),
        "alma" => profile_of("Alma", Some("ivoa.obscore"), "s_ra", "s_dec"),
        "esa_hubble" => profile_of("ESAHubble", Some("ivoa.obscore"), "s_ra", "s_dec"),
        "esa_jwst" => profile_of("Jwst", Some("ivoa.obscore"), "s_ra", "s_dec"),
        "xmm_newton" => profile_of("XMMNewton", Some("ivoa.obscore"), "s_ra", "s_dec"),
        "sdss" => profile_of("SDSS", Some("PhotoObj"), "ra", "dec"),
        _ => return None,
    };
    Some(p)
}

const QUERY_TAP_DOC: &str = "Run a synchronous ADQL query against the TAP service.

Args:
    query: ADQL query text.
    maxrec: Maximum number of rows the service should return.
        Defaults to the configured row ceiling.

Returns:
    Table of results.";

const LAUNCH_JOB_ASYNC_DOC: &str = "Submit an ADQL query as an asynchronous TAP job and wait for its results.

Args:
    query: ADQL query text.
    maxrec: Maximum number of rows the service should return.

Returns:
    Table of results once the job completes.";

const QUERY_REGION_DOC: &str = "Query a table for rows within a cone around a position.

Args:
    coordinates: Cone center, as coordinates or an object name.
    radius: Cone radius (default 2 arcmin).
    table: Table to search. Defaults to the service's main table.
    columns: Columns to return (default all).";

const QUERY_OBJECT_DOC: &str = "Query a table around the position of a named object.

Args:
    object_name: Object name, resolved through Sesame.
    radius: Match radius (default 5 arcsec).
    table: Table to search. Defaults to the service's main table.
    columns: Columns to return (default all).";

const LIST_TABLES_DOC: &str = "List the tables published by the service.

Args:
    schema: Only list tables in this schema.";

const GET_TABLE_SCHEMA_DOC: &str = "Describe the columns of one table.

Args:
    table_name: Fully qualified table name.";

const HELP_DOC: &str = "Summarize the operations offered by this service.";

/// Member table shared by every TAP-backed service
pub fn tap_members() -> Vec<Member> {
    vec![
        Member::method("__init__", "", vec![]),
        Member::method("_request", "Low-level HTTP request.", vec![ParamSig::required("method", "str"), ParamSig::required("url", "str")]),
        Member::method("_parse_result", "Decode a VOTable response.", vec![ParamSig::required("response", "str")]),
        Member::method("_args_to_payload", "Build the TAP form payload.", vec![ParamSig::required("query", "str")]),
        Member::attribute("ROW_LIMIT"),
        Member::attribute("TIMEOUT"),
        Member::method(
            "query_tap",
            QUERY_TAP_DOC,
            vec![ParamSig::required("query", "str"), ParamSig::optional("maxrec", "int", Value::Null)],
        ),
        Member::method(
            "launch_job_async",
            LAUNCH_JOB_ASYNC_DOC,
            vec![ParamSig::required("query", "str"), ParamSig::optional("maxrec", "int", Value::Null)],
        ),
        Member::method(
            "query_region",
            QUERY_REGION_DOC,
            vec![
                ParamSig::required("coordinates", "SkyCoord"),
                ParamSig::optional("radius", "Quantity", "2 arcmin"),
                ParamSig::optional("table", "str", Value::Null),
                ParamSig::optional("columns", "list", Value::Null),
            ],
        ),
        Member::method(
            "query_object",
            QUERY_OBJECT_DOC,
            vec![
                ParamSig::required("object_name", "str"),
                ParamSig::optional("radius", "Quantity", "5 arcsec"),
                ParamSig::optional("table", "str", Value::Null),
                ParamSig::optional("columns", "list", Value::Null),
            ],
        ),
        Member::method("list_tables", LIST_TABLES_DOC, vec![ParamSig::optional("schema", "str", Value::Null)]),
        Member::method("get_table_schema", GET_TABLE_SCHEMA_DOC, vec![ParamSig::required("table_name", "str")]),
        Member::method("help", HELP_DOC, vec![]),
    ]
}

/// Reject anything that is not a plain (optionally qualified or quoted) identifier
pub(crate) fn identifier(kind: &str, s: &str) -> Result<String, CallError> {
    let s = s.trim();
    let ok = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '"' | '/' | '+' | '-'));
    if ok {
        Ok(s.to_string())
    } else {
        Err(CallError::invalid(format!("invalid {} name: '{}'", kind, s)))
    }
}

/// ADQL cone search over one table
pub fn cone_adql(
    table: &str,
    columns: &[String],
    profile: &TapProfile,
    center: &SkyCoord,
    radius: &Quantity,
    top: usize,
) -> String {
    let icrs = center.to_icrs();
    let select = if columns.is_empty() {
        "*".to_string()
    } else {
        columns.join(", ")
    };
    format!(
        "SELECT TOP {} {} FROM {} WHERE 1=CONTAINS(POINT('ICRS', {}, {}), CIRCLE('ICRS', {}, {}, {}))",
        top,
        select,
        table,
        profile.ra_column,
        profile.dec_column,
        icrs.ra_deg(),
        icrs.dec_deg(),
        radius.to_degrees()
    )
}

/// Job identifier from a UWS job document
fn uws_job_id(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut in_id = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => in_id = e.local_name().as_ref() == b"jobId",
            Ok(Event::Text(t)) if in_id => {
                let id = t.decode().ok()?.trim().to_string();
                return (!id.is_empty()).then_some(id);
            }
            Ok(Event::End(_)) => in_id = false,
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

/// A TAP endpoint plus the table layout used by its cone helpers
pub struct TapService {
    service: String,
    profile: TapProfile,
    base_url: String,
    ctx: BackendContext,
    members: Vec<Member>,
}

impl TapService {
    /// Build from the configured endpoint; fails when the service has none
    pub fn new(service: &str, ctx: BackendContext) -> Result<Self, ToolError> {
        let profile = profile(service).ok_or_else(|| {
            ToolError::new(
                ErrorCode::ServiceUnavailable,
                format!("No TAP profile for service: {}", service),
                service,
            )
            .recoverable(false)
        })?;
        let base_url = ctx
            .config
            .tap_endpoint(service)
            .ok_or_else(|| {
                ToolError::new(
                    ErrorCode::ServiceUnavailable,
                    format!("No TAP endpoint configured for {}", service),
                    service,
                )
                .recoverable(false)
                .suggestion(format!("Set endpoints.tap.{} in config.toml", service))
            })?
            .to_string();
        Ok(Self::with_base_url(service, profile, base_url, ctx))
    }

    pub fn with_base_url(
        service: &str,
        profile: TapProfile,
        base_url: impl Into<String>,
        ctx: BackendContext,
    ) -> Self {
        Self {
            service: service.to_string(),
            profile,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ctx,
            members: tap_members(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn profile(&self) -> &TapProfile {
        &self.profile
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn context(&self) -> &BackendContext {
        &self.ctx
    }

    fn max_rows(&self) -> usize {
        self.ctx.config.defaults.max_rows
    }

    fn payload(&self, query: &str, maxrec: usize) -> Vec<(&'static str, String)> {
        vec![
            ("REQUEST", "doQuery".to_string()),
            ("LANG", "ADQL".to_string()),
            ("FORMAT", votable::FORMAT.to_string()),
            ("QUERY", query.to_string()),
            ("MAXREC", maxrec.to_string()),
        ]
    }

    /// Decode off the async scheduler; failures are attributed to this service
    async fn decode(&self, body: String) -> Result<Table, CallError> {
        let table = self.ctx.pool.run(move || parse_votable(&body)).await?;
        table.map_err(|e| match e {
            CallError::Domain(mut err) => {
                err.service = self.service.clone();
                CallError::Domain(err)
            }
            other => other,
        })
    }

    pub async fn query_tap(&self, query: &str, maxrec: Option<usize>) -> Result<Table, CallError> {
        let maxrec = maxrec.unwrap_or_else(|| self.max_rows());
        debug!(service = %self.service, query = %query, maxrec, "TAP sync query");
        let request = self
            .ctx
            .client
            .post(format!("{}/sync", self.base_url))
            .form(&self.payload(query, maxrec));
        let body = http::send_text(&self.service, request).await?;
        let mut table = self.decode(body).await?;
        table.truncate(maxrec);
        Ok(table)
    }

    pub async fn launch_job_async(&self, query: &str, maxrec: Option<usize>) -> Result<Table, CallError> {
        let maxrec = maxrec.unwrap_or_else(|| self.max_rows());
        let mut form = self.payload(query, maxrec);
        form.push(("PHASE", "RUN".to_string()));

        let response = self
            .ctx
            .client
            .post(format!("{}/async", self.base_url))
            .form(&form)
            .send()
            .await
            .map_err(http::classify_reqwest_error)?;
        let response = http::check_status(&self.service, response).await?;
        let final_url = response.url().to_string();
        let body = response.text().await.map_err(http::classify_reqwest_error)?;

        // Services that answer 200 instead of 303 name the job in the body
        let job_url = if final_url.trim_end_matches('/').ends_with("/async") {
            let id = uws_job_id(&body).ok_or_else(|| {
                CallError::Parse(format!("{}: async submission returned no job id", self.service))
            })?;
            format!("{}/async/{}", self.base_url, id)
        } else {
            final_url.trim_end_matches('/').to_string()
        };
        info!(service = %self.service, job = %job_url, "TAP async job submitted");

        let body = match self.await_job(&job_url).await {
            Ok(body) => body,
            Err(e) => {
                self.abandon_job(&job_url).await;
                return Err(e);
            }
        };
        let mut table = self.decode(body).await?;
        table.truncate(maxrec);
        Ok(table)
    }

    /// Poll a submitted job to completion and fetch its result.
    ///
    /// Each request is retried on its own so a transient failure never
    /// resubmits the job; whatever escapes is not transient.
    async fn await_job(&self, job_url: &str) -> Result<String, CallError> {
        let mut delay = POLL_INTERVAL;
        loop {
            let phase = self.get_with_retry(&format!("{}/phase", job_url)).await?;
            match phase.trim() {
                "COMPLETED" => break,
                "ERROR" | "ABORTED" => return Err(self.job_failure(job_url, phase.trim()).await),
                other => debug!(service = %self.service, phase = %other, "Waiting for async job"),
            }
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(MAX_POLL_INTERVAL);
        }
        self.get_with_retry(&format!("{}/results/result", job_url)).await
    }

    async fn get_with_retry(&self, url: &str) -> Result<String, CallError> {
        let policy = self.ctx.config.retry_policy();
        let service = self.service.as_str();
        let client = &self.ctx.client;
        with_retry(&policy, service, move || http::send_text(service, client.get(url))).await
    }

    /// Best-effort DELETE so a failed wait does not leave the job running
    async fn abandon_job(&self, job_url: &str) {
        match self.ctx.client.delete(job_url).send().await {
            Ok(response) => debug!(
                service = %self.service,
                job = %job_url,
                status = response.status().as_u16(),
                "Deleted async job"
            ),
            Err(e) => warn!(service = %self.service, job = %job_url, error = %e, "Could not delete async job"),
        }
    }

    async fn job_failure(&self, job_url: &str, phase: &str) -> CallError {
        let fallback = || -> CallError {
            ToolError::new(
                ErrorCode::InvalidQuery,
                format!("Async job ended in phase {}", phase),
                self.service.as_str(),
            )
            .recoverable(false)
            .detail("job", job_url)
            .into()
        };
        match http::send_text(&self.service, self.ctx.client.get(format!("{}/error", job_url))).await {
            Ok(body) => match self.decode(body).await {
                Err(e @ CallError::Domain(_)) => e,
                _ => fallback(),
            },
            Err(_) => fallback(),
        }
    }

    fn table_or_default(&self, table: Option<String>) -> Result<String, CallError> {
        match table.as_deref().or(self.profile.default_table) {
            Some(t) => identifier("table", t),
            None => Err(CallError::invalid(format!(
                "{} has no default table; pass 'table'",
                self.profile.class_name
            ))),
        }
    }

    pub async fn query_region(
        &self,
        center: &SkyCoord,
        radius: Option<Quantity>,
        table: Option<String>,
        columns: Option<Vec<String>>,
    ) -> Result<Table, CallError> {
        let table = self.table_or_default(table)?;
        let columns = columns
            .unwrap_or_default()
            .iter()
            .map(|c| identifier("column", c))
            .collect::<Result<Vec<_>, _>>()?;
        let radius = radius.unwrap_or(Quantity::arcmin(DEFAULT_REGION_RADIUS));
        let adql = cone_adql(&table, &columns, &self.profile, center, &radius, self.max_rows());
        self.query_tap(&adql, None).await
    }

    pub async fn query_object(
        &self,
        object_name: &str,
        radius: Option<Quantity>,
        table: Option<String>,
        columns: Option<Vec<String>>,
    ) -> Result<Table, CallError> {
        let center = self.ctx.resolver.resolve(object_name).await?;
        let radius = radius.or(Some(Quantity::new(DEFAULT_OBJECT_RADIUS, crate::coords::AngleUnit::Arcsec)));
        self.query_region(&center, radius, table, columns).await
    }

    pub async fn list_tables(&self, schema: Option<&str>) -> Result<Table, CallError> {
        let mut adql = "SELECT table_name, description FROM TAP_SCHEMA.tables".to_string();
        if let Some(schema) = schema {
            adql.push_str(&format!(" WHERE schema_name = {}", adql_quote(schema)));
        }
        self.query_tap(&adql, None).await
    }

    pub async fn get_table_schema(&self, table_name: &str) -> Result<Table, CallError> {
        let adql = format!(
            "SELECT column_name, datatype, unit, description FROM TAP_SCHEMA.columns WHERE table_name = {}",
            adql_quote(table_name)
        );
        let table = self.query_tap(&adql, None).await?;
        if table.is_empty() {
            return Err(not_found_error(
                ErrorCode::CatalogNotFound,
                format!("Table not found: {}", table_name),
                self.service.as_str(),
            )
            .suggestion("Use list_tables to see published tables")
            .into());
        }
        Ok(table)
    }

    /// One line per exposed operation
    pub fn help_text(&self, members: &[Member]) -> String {
        let mut lines = vec![format!("{} ({})", self.profile.class_name, self.base_url)];
        for m in members.iter().filter(|m| m.is_callable() && !m.name.starts_with('_')) {
            let summary = m.doc.lines().next().unwrap_or_default();
            lines.push(format!("  {}: {}", m.name, summary));
        }
        lines.join("\n")
    }

    /// Dispatch the TAP operations; `None` when `operation` is not one of them
    pub async fn invoke_tap(&self, operation: &str, mut args: CallArgs) -> Result<Option<Output>, CallError> {
        let table = match operation {
            "query_tap" => {
                let query = args.required_string("query")?;
                let maxrec = read_maxrec(&mut args)?;
                self.query_tap(&query, maxrec).await?
            }
            "launch_job_async" => {
                let query = args.required_string("query")?;
                let maxrec = read_maxrec(&mut args)?;
                self.launch_job_async(&query, maxrec).await?
            }
            "query_region" => {
                let center = args.required_coord("coordinates")?;
                let radius = args.quantity("radius")?;
                let table = args.string("table")?;
                let columns = args.strings("columns")?;
                self.query_region(&center, radius, table, columns).await?
            }
            "query_object" => {
                let name = args.required_string("object_name")?;
                let radius = args.quantity("radius")?;
                let table = args.string("table")?;
                let columns = args.strings("columns")?;
                self.query_object(&name, radius, table, columns).await?
            }
            "list_tables" => {
                let schema = args.string("schema")?;
                self.list_tables(schema.as_deref()).await?
            }
            "get_table_schema" => {
                let name = args.required_string("table_name")?;
                self.get_table_schema(&name).await?
            }
            "help" => return Ok(Some(Output::Str(self.help_text(&self.members)))),
            _ => return Ok(None),
        };
        Ok(Some(Output::Table(table)))
    }
}

fn read_maxrec(args: &mut CallArgs) -> Result<Option<usize>, CallError> {
    match args.integer("maxrec")? {
        Some(n) if n > 0 => Ok(Some(n as usize)),
        Some(n) => Err(CallError::invalid(format!("maxrec must be positive, got {}", n))),
        None => Ok(None),
    }
}

#[async_trait]
impl Backend for TapService {
    fn class_name(&self) -> &str {
        self.profile.class_name
    }

    fn members(&self) -> &[Member] {
        &self.members
    }

    async fn invoke(&self, operation: &str, args: CallArgs) -> Result<Output, CallError> {
        self.invoke_tap(operation, args)
            .await?
            .ok_or_else(|| unknown_operation(self.profile.class_name, operation))
    }
}
