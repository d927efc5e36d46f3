// src/backends/ads.rs
// NASA ADS literature search over the v1 search API

use super::{Backend, BackendContext, CallArgs, Member, ParamSig, unknown_operation};
use crate::coerce::Argument;
use crate::error::{CallError, ErrorCode, ToolError, not_found_error, validation_error};
use crate::http;
use crate::utils::truncate;
use crate::value::{Cell, Column, Output, Table};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

const CLASS_NAME: &str = "ADS";

/// Fields requested when the caller names none
pub const DEFAULT_FIELDS: &[&str] = &[
    "bibcode",
    "title",
    "author",
    "pub",
    "volume",
    "pubdate",
    "page",
    "citation_count",
    "abstract",
    "doi",
];

/// Field selections for `query_compact`
pub const FIELD_PRESETS: &[(&str, &[&str])] = &[
    ("minimal", &["bibcode", "title", "first_author", "year", "citation_count"]),
    (
        "standard",
        &[
            "bibcode", "title", "first_author", "author", "year", "pubdate", "citation_count", "doi", "pub",
            "abstract",
        ],
    ),
    (
        "extended",
        &[
            "bibcode", "title", "first_author", "author", "year", "pubdate", "citation_count", "doi", "pub",
            "volume", "page", "keyword", "abstract",
        ],
    ),
    (
        "full",
        &[
            "bibcode", "title", "first_author", "author", "aff", "year", "pubdate", "citation_count",
            "read_count", "doi", "pub", "bibstem", "volume", "issue", "page", "keyword", "doctype",
            "property", "identifier", "abstract",
        ],
    ),
];

const DEFAULT_PRESET: &str = "standard";
const COMPACT_MAX_RESULTS: u64 = 10;
const COMPACT_ROWS: u64 = 50;
const COMPACT_SORT: &str = "citation_count desc";
const MAX_ABSTRACT_CHARS: usize = 200;
const MAX_AUTHORS: usize = 10;

const DEFAULT_ROWS: u64 = 10;
const MAX_ROWS: u64 = 2000;
const DEFAULT_SORT: &str = "date desc";

const QUERY_SIMPLE_DOC: &str = "Search ADS with a free-form query string.

Args:
    query_string: ADS query syntax, e.g. 'author:\"Hubble, E\" year:1929'.
    fields: Fields to return. Defaults to bibcode, title, author, pub,
        volume, pubdate, page, citation_count, abstract and doi.
    rows: Maximum number of records (default 10).
    sort: Sort order (default \"date desc\").";

const SEARCH_DOC: &str = "Search ADS by keywords, restricted to refereed astronomy papers when asked.

Args:
    query: Search terms.
    refereed: Only return refereed papers.
    rows: Maximum number of records (default 10).";

const QUERY_COMPACT_DOC: &str = "Search ADS returning only the fields needed to pick papers.

Abstracts are cut to 200 characters and author lists to 10 names.

Args:
    query_string: ADS query syntax, e.g. \"black hole X-ray\".
    fields: Preset name (minimal, standard, extended, full) or a list of fields.
    max_results: Records kept after sorting (default 10).
    sort: Sort order (default \"citation_count desc\").
    rows: Records fetched before trimming (default 50).";

const GET_RECORD_DOC: &str = "Fetch a single ADS record by bibcode.

Args:
    bibcode: 19-character ADS bibliographic code.
    fields: Fields to return.";

/// Convert `response.docs` into a table with one column per requested field
pub fn docs_to_table(body: &Value, fields: &[String]) -> Result<Table, CallError> {
    let response = body
        .get("response")
        .ok_or_else(|| CallError::Parse("ads: response has no 'response' object".into()))?;
    let docs = response
        .get("docs")
        .and_then(Value::as_array)
        .ok_or_else(|| CallError::Parse("ads: response has no 'docs' list".into()))?;

    let mut table = Table::new(
        fields
            .iter()
            .map(|f| Column::new(f.as_str(), "object"))
            .collect(),
    );
    for doc in docs {
        table.push_row(fields.iter().map(|f| doc.get(f).map(Cell::from_json).unwrap_or(Cell::Masked)).collect());
    }
    if let Some(found) = response.get("numFound").and_then(Value::as_i64) {
        table.meta.push(("num_found".into(), Output::Int(found)));
    }
    Ok(table)
}

/// Field list for a preset name
pub fn preset_fields(name: &str) -> Result<Vec<String>, CallError> {
    match FIELD_PRESETS.iter().find(|(preset, _)| *preset == name) {
        Some((_, fields)) => Ok(fields.iter().map(|f| f.to_string()).collect()),
        None => {
            let names: Vec<&str> = FIELD_PRESETS.iter().map(|(preset, _)| *preset).collect();
            Err(validation_error(format!("Invalid field preset: {}", name), "ads")
                .suggestion(format!("Use one of: {}", names.join(", ")))
                .into())
        }
    }
}

fn shorten_abstract(cell: Cell, max_chars: usize) -> Cell {
    let cell = match cell {
        Cell::Array(items) => items.into_iter().next().unwrap_or(Cell::Masked),
        other => other,
    };
    match cell {
        Cell::Text(text) => Cell::Text(truncate(&text, max_chars)),
        other => other,
    }
}

fn cap_authors(cell: Cell, max_authors: usize) -> Cell {
    match cell {
        Cell::Array(mut names) if names.len() > max_authors => {
            let more = names.len() - max_authors;
            names.truncate(max_authors);
            names.push(Cell::Text(format!("... and {} more", more)));
            Cell::Array(names)
        }
        other => other,
    }
}

/// Keep the first `max_results` records with short abstracts and author lists.
///
/// Adds `total_found` and `truncated` to the table metadata.
pub fn compact_table(mut table: Table, max_results: usize, max_abstract: usize, max_authors: usize) -> Table {
    let total = table.len();
    table.truncate(max_results);
    let abstract_idx = table.column_index("abstract");
    let author_idx = table.column_index("author");
    for row in &mut table.rows {
        if let Some(cell) = abstract_idx.and_then(|i| row.get_mut(i)) {
            *cell = shorten_abstract(std::mem::replace(cell, Cell::Masked), max_abstract);
        }
        if let Some(cell) = author_idx.and_then(|i| row.get_mut(i)) {
            *cell = cap_authors(std::mem::replace(cell, Cell::Masked), max_authors);
        }
    }
    table.meta.push(("total_found".into(), Output::Int(total as i64)));
    table.meta.push(("truncated".into(), Output::Bool(total > max_results)));
    table
}

pub struct Ads {
    ctx: BackendContext,
    base_url: String,
    members: Vec<Member>,
}

impl Ads {
    pub fn new(ctx: BackendContext) -> Result<Self, ToolError> {
        let base_url = ctx
            .config
            .rest_endpoint("ads")
            .ok_or_else(|| {
                ToolError::new(ErrorCode::ServiceUnavailable, "No API endpoint configured for ads", "ads")
                    .recoverable(false)
                    .suggestion("Set endpoints.rest.ads in config.toml")
            })?
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            ctx,
            base_url,
            members: members(),
        })
    }

    async fn query(&self, q: &str, fields: &[String], rows: u64, sort: &str) -> Result<Table, CallError> {
        let token = self.ctx.credentials.require_token("ads")?;
        debug!(query = %q, rows, "ADS search");
        let request = self
            .ctx
            .client
            .get(format!("{}/search/query", self.base_url))
            .bearer_auth(token)
            .query(&[
                ("q", q.to_string()),
                ("fl", fields.join(",")),
                ("rows", rows.to_string()),
                ("sort", sort.to_string()),
            ]);
        let body = http::send_json("ads", request).await?;
        docs_to_table(&body, fields)
    }

    pub async fn query_simple(
        &self,
        query_string: &str,
        fields: Option<Vec<String>>,
        rows: Option<u64>,
        sort: Option<String>,
    ) -> Result<Table, CallError> {
        let fields = fields.unwrap_or_else(default_fields);
        let rows = rows.unwrap_or(DEFAULT_ROWS).clamp(1, MAX_ROWS);
        let sort = sort.unwrap_or_else(|| DEFAULT_SORT.to_string());
        self.query(query_string, &fields, rows, &sort).await
    }

    pub async fn search(&self, query: &str, refereed: bool, rows: Option<u64>) -> Result<Table, CallError> {
        let mut q = format!("{} collection:astronomy", query);
        if refereed {
            q.push_str(" property:refereed");
        }
        self.query_simple(&q, None, rows, None).await
    }

    pub async fn query_compact(
        &self,
        query_string: &str,
        preset: &str,
        fields: Vec<String>,
        max_results: Option<u64>,
        sort: Option<String>,
        rows: Option<u64>,
    ) -> Result<Table, CallError> {
        let max_results = max_results.unwrap_or(COMPACT_MAX_RESULTS);
        let rows = rows.unwrap_or(COMPACT_ROWS).max(max_results).clamp(1, MAX_ROWS);
        let sort = sort.unwrap_or_else(|| COMPACT_SORT.to_string());
        let table = self.query(query_string, &fields, rows, &sort).await?;
        let mut table = compact_table(table, max_results as usize, MAX_ABSTRACT_CHARS, MAX_AUTHORS);
        table.meta.push(("preset".into(), Output::Str(preset.to_string())));
        Ok(table)
    }

    pub async fn get_record(&self, bibcode: &str, fields: Option<Vec<String>>) -> Result<Table, CallError> {
        let q = format!("bibcode:\"{}\"", bibcode.replace('"', ""));
        let table = self.query_simple(&q, fields, Some(1), None).await?;
        if table.is_empty() {
            return Err(not_found_error(
                ErrorCode::BibcodeNotFound,
                format!("Bibcode not found: {}", bibcode),
                "ads",
            )
            .detail("bibcode", bibcode)
            .into());
        }
        Ok(table)
    }
}

fn default_fields() -> Vec<String> {
    DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect()
}

fn members() -> Vec<Member> {
    vec![
        Member::method("__init__", "", vec![]),
        Member::method("_parse_response", "Decode a search response.", vec![ParamSig::required("response", "dict")]),
        Member::attribute("ADS_FIELDS"),
        Member::attribute("NROWS"),
        Member::attribute("SORT"),
        Member::attribute("TOKEN"),
        Member::method(
            "query_simple",
            QUERY_SIMPLE_DOC,
            vec![
                ParamSig::required("query_string", "str"),
                ParamSig::optional("fields", "list", Value::Null),
                ParamSig::optional("rows", "int", DEFAULT_ROWS),
                ParamSig::optional("sort", "str", DEFAULT_SORT),
            ],
        ),
        Member::method(
            "search",
            SEARCH_DOC,
            vec![
                ParamSig::required("query", "str"),
                ParamSig::optional("refereed", "bool", false),
                ParamSig::optional("rows", "int", DEFAULT_ROWS),
            ],
        ),
        Member::method(
            "query_compact",
            QUERY_COMPACT_DOC,
            vec![
                ParamSig::required("query_string", "str"),
                ParamSig::optional("fields", "str | list", DEFAULT_PRESET),
                ParamSig::optional("max_results", "int", COMPACT_MAX_RESULTS),
                ParamSig::optional("sort", "str", COMPACT_SORT),
                ParamSig::optional("rows", "int", COMPACT_ROWS),
            ],
        ),
        Member::method(
            "get_record",
            GET_RECORD_DOC,
            vec![
                ParamSig::required("bibcode", "str"),
                ParamSig::optional("fields", "list", Value::Null),
            ],
        ),
    ]
}

fn read_positive(args: &mut CallArgs, name: &str) -> Result<Option<u64>, CallError> {
    match args.integer(name)? {
        Some(n) if n > 0 => Ok(Some(n as u64)),
        Some(n) => Err(CallError::invalid(format!("{} must be positive, got {}", name, n))),
        None => Ok(None),
    }
}

fn read_rows(args: &mut CallArgs) -> Result<Option<u64>, CallError> {
    read_positive(args, "rows")
}

/// A preset name, or a list of fields labelled `custom`
fn read_field_selection(args: &mut CallArgs) -> Result<(String, Vec<String>), CallError> {
    let listed = matches!(args.get("fields").and_then(Argument::as_json), Some(Value::Array(_)));
    if listed {
        let fields = args.strings("fields")?.unwrap_or_default();
        if !fields.is_empty() {
            return Ok(("custom".to_string(), fields));
        }
    }
    let preset = args.string("fields")?.unwrap_or_else(|| DEFAULT_PRESET.to_string());
    let fields = preset_fields(&preset)?;
    Ok((preset, fields))
}

#[async_trait]
impl Backend for Ads {
    fn class_name(&self) -> &str {
        CLASS_NAME
    }

    fn members(&self) -> &[Member] {
        &self.members
    }

    async fn invoke(&self, operation: &str, mut args: CallArgs) -> Result<Output, CallError> {
        let table = match operation {
            "query_simple" => {
                let q = args.required_string("query_string")?;
                let fields = args.strings("fields")?;
                let rows = read_rows(&mut args)?;
                let sort = args.string("sort")?;
                self.query_simple(&q, fields, rows, sort).await?
            }
            "search" => {
                let q = args.required_string("query")?;
                let refereed = args.boolean("refereed")?.unwrap_or(false);
                let rows = read_rows(&mut args)?;
                self.search(&q, refereed, rows).await?
            }
            "query_compact" => {
                let q = args.required_string("query_string")?;
                let (preset, fields) = read_field_selection(&mut args)?;
                let max_results = read_positive(&mut args, "max_results")?;
                let sort = args.string("sort")?;
                let rows = read_rows(&mut args)?;
                self.query_compact(&q, &preset, fields, max_results, sort, rows).await?
            }
            "get_record" => {
                let bibcode = args.required_string("bibcode")?;
                let fields = args.strings("fields")?;
                self.get_record(&bibcode, fields).await?
            }
            _ => return Err(unknown_operation(CLASS_NAME, operation)),
        };
        Ok(Output::Table(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::EnvCredentials;
    use crate::config::AstroConfig;
    use crate::resolver::ResolverChain;
    use crate::retry::BlockingPool;
    use serde_json::json;
    use std::sync::Arc;

    fn backend() -> Ads {
        let config = AstroConfig::default();
        Ads::new(BackendContext {
            client: reqwest::Client::new(),
            credentials: Arc::new(EnvCredentials::with_lookup(&config, |_| None)),
            config: Arc::new(config),
            resolver: Arc::new(ResolverChain::new(vec![])),
            pool: BlockingPool::default(),
        })
        .unwrap()
    }

    // ============================================================================
    // Response decoding
    // ============================================================================

    #[test]
    fn test_docs_to_table() {
        let body = json!({
            "response": {
                "numFound": 42,
                "docs": [
                    {"bibcode": "1929PNAS...15..168H", "title": ["A Relation between Distance and Radial Velocity"], "citation_count": 3000},
                    {"bibcode": "2020ApJ...900....1X"}
                ]
            }
        });
        let fields = vec!["bibcode".to_string(), "title".to_string(), "citation_count".to_string()];
        let table = docs_to_table(&body, &fields).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get(0, "title"),
            Some(&Cell::Array(vec![Cell::Text("A Relation between Distance and Radial Velocity".into())]))
        );
        assert_eq!(table.get(0, "citation_count"), Some(&Cell::Int(3000)));
        assert_eq!(table.get(1, "title"), Some(&Cell::Masked));
        assert_eq!(table.meta, vec![("num_found".to_string(), Output::Int(42))]);
    }

    #[test]
    fn test_docs_to_table_rejects_other_shapes() {
        assert!(matches!(docs_to_table(&json!({"error": "x"}), &[]), Err(CallError::Parse(_))));
        assert!(matches!(docs_to_table(&json!({"response": {}}), &[]), Err(CallError::Parse(_))));
    }

    // ============================================================================
    // Compact presets
    // ============================================================================

    #[test]
    fn test_presets_grow_monotonically() {
        let minimal = preset_fields("minimal").unwrap();
        let standard = preset_fields("standard").unwrap();
        let full = preset_fields("full").unwrap();
        assert_eq!(minimal, vec!["bibcode", "title", "first_author", "year", "citation_count"]);
        assert!(minimal.iter().all(|f| standard.contains(f)));
        assert!(standard.iter().all(|f| full.contains(f)));
        assert!(standard.contains(&"abstract".to_string()));
    }

    #[test]
    fn test_invalid_preset_is_validation_error() {
        let CallError::Domain(e) = preset_fields("tiny").unwrap_err() else { panic!("expected domain error") };
        assert_eq!(e.code, ErrorCode::ValidationError);
        assert_eq!(e.message, "Invalid field preset: tiny");
        assert_eq!(e.suggestion, "Use one of: minimal, standard, extended, full");
    }

    #[test]
    fn test_compact_table_trims_abstracts_and_authors() {
        let authors: Vec<String> = (1..=13).map(|i| format!("Author, {}.", i)).collect();
        let body = json!({
            "response": {
                "numFound": 3,
                "docs": [
                    {"bibcode": "2019ApJ...875L...1E", "author": authors, "abstract": "x".repeat(250)},
                    {"bibcode": "2016PhRvL.116f1102A", "author": ["Abbott, B. P."], "abstract": "Short."},
                    {"bibcode": "1998AJ....116.1009R"}
                ]
            }
        });
        let fields = vec!["bibcode".to_string(), "author".to_string(), "abstract".to_string()];
        let table = compact_table(docs_to_table(&body, &fields).unwrap(), 2, MAX_ABSTRACT_CHARS, MAX_AUTHORS);

        assert_eq!(table.len(), 2);
        let Some(Cell::Text(text)) = table.get(0, "abstract") else { panic!("expected abstract text") };
        assert_eq!(text.chars().count(), 203);
        assert!(text.ends_with("..."));
        let Some(Cell::Array(names)) = table.get(0, "author") else { panic!("expected author list") };
        assert_eq!(names.len(), 11);
        assert_eq!(names[10], Cell::Text("... and 3 more".into()));

        assert_eq!(table.get(1, "abstract"), Some(&Cell::Text("Short.".into())));
        assert_eq!(table.get(1, "author"), Some(&Cell::Array(vec![Cell::Text("Abbott, B. P.".into())])));
        assert!(table.meta.contains(&("total_found".to_string(), Output::Int(3))));
        assert!(table.meta.contains(&("truncated".to_string(), Output::Bool(true))));
    }

    #[test]
    fn test_field_selection() {
        let mut args = CallArgs::new();
        assert_eq!(read_field_selection(&mut args).unwrap().0, "standard");

        let mut args = CallArgs::new();
        args.insert("fields", Argument::Json(json!(["bibcode", "year"])));
        let (label, fields) = read_field_selection(&mut args).unwrap();
        assert_eq!(label, "custom");
        assert_eq!(fields, vec!["bibcode", "year"]);

        let mut args = CallArgs::new();
        args.insert("fields", Argument::Json(json!("minimal")));
        assert_eq!(read_field_selection(&mut args).unwrap().1.len(), 5);
    }

    // ============================================================================
    // Credentials
    // ============================================================================

    #[tokio::test]
    async fn test_missing_token_is_authentication_error() {
        let ads = backend();
        let err = ads.query_simple("dark energy", None, None, None).await.unwrap_err();
        let CallError::Domain(e) = err else { panic!("expected domain error") };
        assert_eq!(e.code, ErrorCode::AuthenticationError);
        assert_eq!(e.details["env_var"], "ADS_TOKEN");
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let err = backend().invoke("_parse_response", CallArgs::new()).await.unwrap_err();
        assert!(matches!(err, CallError::InvalidArguments(_)));
    }
}
