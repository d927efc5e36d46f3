// src/backends/gcn.rs
// NASA GCN circulars and notices, plus localization extraction from alert text

use super::{Backend, BackendContext, CallArgs, Member, ParamSig, unknown_operation};
use crate::coords::{AngleUnit, Quantity, SkyCoord};
use crate::error::{CallError, ErrorCode, ToolError};
use crate::http;
use crate::value::{Cell, Column, Output, Table};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};
use std::sync::LazyLock;
use tracing::{debug, warn};

const CLASS_NAME: &str = "Gcn";

const DEFAULT_SEARCH_LIMIT: i64 = 50;

/// Error radius assumed when the alert states none, degrees
const DEFAULT_ERROR_RADIUS: f64 = 0.1;

const FETCH_CIRCULAR_DOC: &str = "Fetch a GCN Circular by number.

Args:
    circular_id: Circular number, e.g. 40000.";

const SEARCH_CIRCULARS_DOC: &str = "Full-text search over GCN Circulars.

Args:
    query: Search terms.
    event_name: Restrict to one event, e.g. \"GRB 250101A\".
    limit: Maximum number of circulars (default 50).";

const FETCH_NOTICE_DOC: &str = "Fetch a machine-readable GCN Notice.

Args:
    notice_id: Notice identifier.
    notice_type: Notice type reported back in the result.";

const PARSE_LOCALIZATION_DOC: &str = "Extract a sky localization from alert content.

Args:
    content: Circular text or a JSON notice carrying ra/dec.";

static HMS_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(
        r#"(?i)RA[,\s]+Dec[^=]*=\s*(\d+)h\s*(\d+)m\s*([\d.]+)s[,\s]+([+-]?)(\d+)d\s*(\d+)['’]\s*([\d.]+)["”]?"#,
    )
    .expect("hms localization regex")
});

static DEGREES_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?i)RA\s*[=:]\s*([\d.]+)[^\d]*Dec\s*[=:]\s*([+-]?[\d.]+)").expect("degree localization regex")
});

static ERROR_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?i)error[^:=\n]*[:=]\s*([\d.]+)\s*(deg|arcmin|arcsec)?").expect("error radius regex")
});

fn localization(coord: &SkyCoord, error_radius: f64, source: &str) -> Value {
    json!({
        "ra": coord.ra_deg(),
        "dec": coord.dec_deg(),
        "error_radius": error_radius,
        "source": source,
    })
}

fn sexagesimal_to_degrees(caps: &regex::Captures<'_>) -> Option<(f64, f64)> {
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<f64>().ok());
    let ra = 15.0 * (num(1)? + num(2)? / 60.0 + num(3)? / 3600.0);
    let sign = if caps.get(4).is_some_and(|m| m.as_str() == "-") { -1.0 } else { 1.0 };
    let dec = sign * (num(5)? + num(6)? / 60.0 + num(7)? / 3600.0);
    Some((ra, dec))
}

/// Error radius stated in free text, converted to degrees
fn stated_error_radius(content: &str) -> Option<f64> {
    let caps = ERROR_RE.captures(content)?;
    let value = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let unit = caps
        .get(2)
        .and_then(|m| AngleUnit::from_name(m.as_str()))
        .unwrap_or(AngleUnit::Deg);
    Some(Quantity::new(value, unit).to_degrees())
}

/// Find a position in alert content.
///
/// JSON objects with `ra`/`dec` are read directly. Free text is scanned for
/// sexagesimal `RA, Dec (J2000) = ...` first, then `RA = x, Dec = y` in
/// degrees. Returns `{localization, warnings}`; `localization` is null when
/// nothing usable was found.
pub fn parse_localization(content: &str) -> Value {
    let mut warnings: Vec<String> = Vec::new();

    if let Ok(Value::Object(data)) = serde_json::from_str::<Value>(content) {
        let ra = data.get("ra").and_then(Value::as_f64);
        let dec = data.get("dec").and_then(Value::as_f64);
        if let (Some(ra), Some(dec)) = (ra, dec) {
            let error = data
                .get("error")
                .or_else(|| data.get("error_radius"))
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_ERROR_RADIUS);
            match SkyCoord::icrs(ra, dec) {
                Ok(coord) => {
                    return json!({ "localization": localization(&coord, error, "json"), "warnings": warnings });
                }
                Err(e) => warnings.push(format!("JSON position rejected: {}", e.message)),
            }
        }
    }

    let error = stated_error_radius(content).unwrap_or(DEFAULT_ERROR_RADIUS);

    if let Some(caps) = HMS_RE.captures(content) {
        match sexagesimal_to_degrees(&caps).map(|(ra, dec)| SkyCoord::icrs(ra, dec)) {
            Some(Ok(coord)) => {
                return json!({ "localization": localization(&coord, error, "text_hms"), "warnings": warnings });
            }
            Some(Err(e)) => warnings.push(format!("Failed to parse HMS coordinates: {}", e.message)),
            None => warnings.push("Failed to parse HMS coordinates".to_string()),
        }
    }

    if let Some(caps) = DEGREES_RE.captures(content) {
        let ra = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok());
        let dec = caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok());
        match (ra, dec) {
            (Some(ra), Some(dec)) if (0.0..=360.0).contains(&ra) && (-90.0..=90.0).contains(&dec) => {
                if let Ok(coord) = SkyCoord::icrs(ra, dec) {
                    return json!({ "localization": localization(&coord, error, "text_deg"), "warnings": warnings });
                }
            }
            (Some(_), Some(_)) => warnings.push("Degree coordinates out of range".to_string()),
            _ => warnings.push("Failed to parse degree coordinates".to_string()),
        }
    }

    warnings.push("No coordinates found in content".to_string());
    json!({ "localization": Value::Null, "warnings": warnings })
}

fn text(v: &Value, key: &str) -> String {
    v.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Circular listing from a search response (a bare list or `{items: [...]}`)
pub fn circulars_to_table(body: &Value, base_url: &str, limit: usize) -> Table {
    let items = match body {
        Value::Array(items) => items.as_slice(),
        other => other.get("items").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default(),
    };
    let mut table = Table::new(vec![
        Column::new("circular_id", "long"),
        Column::new("subject", "char"),
        Column::new("submitter", "char"),
        Column::new("submitted_at", "char"),
        Column::new("url", "char"),
    ]);
    for item in items.iter().take(limit) {
        let id = item.get("circularId").and_then(Value::as_i64);
        table.push_row(vec![
            id.into(),
            Cell::Text(text(item, "subject")),
            Cell::Text(text(item, "submitter")),
            item.get("createdAt").map(Cell::from_json).unwrap_or(Cell::Masked),
            id.map(|id| Cell::Text(format!("{}/circulars/{}", base_url, id))).unwrap_or(Cell::Masked),
        ]);
    }
    table
}

pub struct Gcn {
    ctx: BackendContext,
    base_url: String,
    members: Vec<Member>,
}

impl Gcn {
    pub fn new(ctx: BackendContext) -> Result<Self, ToolError> {
        let base_url = ctx
            .config
            .rest_endpoint("gcn")
            .ok_or_else(|| {
                ToolError::new(ErrorCode::ServiceUnavailable, "No API endpoint configured for gcn", "gcn")
                    .recoverable(false)
                    .suggestion("Set endpoints.rest.gcn in config.toml")
            })?
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            ctx,
            base_url,
            members: members(),
        })
    }

    pub async fn fetch_circular(&self, circular_id: i64) -> Result<Value, CallError> {
        let url = format!("{}/circulars/{}.json", self.base_url, circular_id);
        let data = http::send_json("gcn", self.ctx.client.get(url)).await?;
        Ok(json!({
            "event_id": circular_id.to_string(),
            "event_type": "GCN_CIRCULAR",
            "circular_id": circular_id,
            "subject": text(&data, "subject"),
            "submitter": text(&data, "submitter"),
            "submitted_at": data.get("createdAt").cloned().unwrap_or(Value::Null),
            "body": text(&data, "body"),
            "url": format!("{}/circulars/{}", self.base_url, circular_id),
        }))
    }

    pub async fn search_circulars(
        &self,
        query: &str,
        event_name: Option<&str>,
        limit: usize,
    ) -> Result<Table, CallError> {
        let search = match event_name {
            Some(event) => format!("{} {}", event, query),
            None => query.to_string(),
        };
        debug!(query = %search, limit, "GCN circular search");
        let request = self
            .ctx
            .client
            .get(format!("{}/circulars", self.base_url))
            .query(&[("query", search.clone()), ("limit", limit.to_string())]);
        let body = http::send_json("gcn", request).await?;
        let mut table = circulars_to_table(&body, &self.base_url, limit);
        table.meta.push(("query".into(), Output::Str(search)));
        Ok(table)
    }

    /// Notice metadata; falls back to the bare identifier when the API has none
    pub async fn fetch_notice(&self, notice_id: &str, notice_type: Option<String>) -> Result<Value, CallError> {
        let url = format!("{}/api/notices/{}", self.base_url, notice_id);
        let data = match http::send_json("gcn", self.ctx.client.get(url)).await {
            Ok(data) => data,
            Err(e) => {
                warn!(notice = %notice_id, error = %e, "GCN notice lookup failed");
                json!({ "id": notice_id })
            }
        };
        Ok(json!({
            "event_id": notice_id,
            "event_type": notice_type.unwrap_or_else(|| "GCN_NOTICE".to_string()),
            "notice_id": notice_id,
            "data": data,
            "url": format!("{}/notices/{}", self.base_url, notice_id),
        }))
    }
}

fn members() -> Vec<Member> {
    vec![
        Member::method("__init__", "", vec![]),
        Member::method("_request", "", vec![]),
        Member::attribute("API_URL"),
        Member::method(
            "fetch_circular",
            FETCH_CIRCULAR_DOC,
            vec![ParamSig::required("circular_id", "int")],
        ),
        Member::method(
            "search_circulars",
            SEARCH_CIRCULARS_DOC,
            vec![
                ParamSig::required("query", "str"),
                ParamSig::optional("event_name", "str", Value::Null),
                ParamSig::optional("limit", "int", DEFAULT_SEARCH_LIMIT),
            ],
        ),
        Member::method(
            "fetch_notice",
            FETCH_NOTICE_DOC,
            vec![
                ParamSig::required("notice_id", "str"),
                ParamSig::optional("notice_type", "str", Value::Null),
            ],
        ),
        Member::static_method(
            "parse_localization",
            PARSE_LOCALIZATION_DOC,
            vec![ParamSig::required("content", "str")],
        ),
    ]
}

#[async_trait]
impl Backend for Gcn {
    fn class_name(&self) -> &str {
        CLASS_NAME
    }

    fn members(&self) -> &[Member] {
        &self.members
    }

    async fn invoke(&self, operation: &str, mut args: CallArgs) -> Result<Output, CallError> {
        match operation {
            "fetch_circular" => {
                let id = args
                    .integer("circular_id")?
                    .ok_or_else(|| CallError::invalid("fetch_circular() missing required argument 'circular_id'"))?;
                Ok(Output::Json(self.fetch_circular(id).await?))
            }
            "search_circulars" => {
                let query = args.required_string("query")?;
                let event_name = args.string("event_name")?;
                let limit = match args.integer("limit")? {
                    Some(n) if n > 0 => n as usize,
                    Some(n) => return Err(CallError::invalid(format!("limit must be positive, got {}", n))),
                    None => DEFAULT_SEARCH_LIMIT as usize,
                };
                Ok(Output::Table(
                    self.search_circulars(&query, event_name.as_deref(), limit).await?,
                ))
            }
            "fetch_notice" => {
                let id = args.required_string("notice_id")?;
                let notice_type = args.string("notice_type")?;
                Ok(Output::Json(self.fetch_notice(&id, notice_type).await?))
            }
            "parse_localization" => {
                let content = args.required_string("content")?;
                Ok(Output::Json(parse_localization(&content)))
            }
            _ => Err(unknown_operation(CLASS_NAME, operation)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================================
    // Localization
    // ============================================================================

    #[test]
    fn test_json_notice_position() {
        let v = parse_localization(r#"{"ra": 123.45, "dec": -12.5, "error": 0.02}"#);
        let loc = &v["localization"];
        assert_eq!(loc["source"], "json");
        assert!((loc["ra"].as_f64().unwrap() - 123.45).abs() < 1e-9);
        assert!((loc["dec"].as_f64().unwrap() + 12.5).abs() < 1e-9);
        assert_eq!(loc["error_radius"], 0.02);
    }

    #[test]
    fn test_sexagesimal_circular_text() {
        let text = "Swift-XRT position: RA, Dec (J2000) = 12h 34m 56.7s, -12d 34' 56.7\" with an error radius of: 3.5 arcsec";
        let v = parse_localization(text);
        let loc = &v["localization"];
        assert_eq!(loc["source"], "text_hms");
        let ra = 15.0 * (12.0 + 34.0 / 60.0 + 56.7 / 3600.0);
        let dec = -(12.0 + 34.0 / 60.0 + 56.7 / 3600.0);
        assert!((loc["ra"].as_f64().unwrap() - ra).abs() < 1e-9);
        assert!((loc["dec"].as_f64().unwrap() - dec).abs() < 1e-9);
        assert!((loc["error_radius"].as_f64().unwrap() - 3.5 / 3600.0).abs() < 1e-12);
    }

    #[test]
    fn test_degree_text_uses_default_error() {
        let v = parse_localization("Fermi GBM localization RA = 201.3, Dec = +45.1 (J2000)");
        let loc = &v["localization"];
        assert_eq!(loc["source"], "text_deg");
        assert!((loc["ra"].as_f64().unwrap() - 201.3).abs() < 1e-9);
        assert_eq!(loc["error_radius"], DEFAULT_ERROR_RADIUS);
    }

    #[test]
    fn test_out_of_range_degrees_are_rejected() {
        let v = parse_localization("RA = 400.0, Dec = 10.0");
        assert!(v["localization"].is_null());
        let warnings: Vec<&str> = v["warnings"].as_array().unwrap().iter().filter_map(Value::as_str).collect();
        assert!(warnings.contains(&"Degree coordinates out of range"));
        assert!(warnings.contains(&"No coordinates found in content"));
    }

    #[test]
    fn test_no_position() {
        let v = parse_localization("Observations are ongoing; further circulars to follow.");
        assert!(v["localization"].is_null());
        assert_eq!(v["warnings"][0], "No coordinates found in content");
    }

    // ============================================================================
    // Circular listings
    // ============================================================================

    #[test]
    fn test_circulars_to_table() {
        let body = json!({"items": [
            {"circularId": 40001, "subject": "GRB 250101A: Swift detection", "submitter": "A. Person", "createdAt": 1735689600000_i64},
            {"circularId": 40002, "subject": "GRB 250101A: optical afterglow"},
            {"circularId": 40003}
        ]});
        let table = circulars_to_table(&body, "https://gcn.nasa.gov", 2);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "circular_id"), Some(&Cell::Int(40001)));
        assert_eq!(table.get(0, "submitted_at"), Some(&Cell::Int(1735689600000)));
        assert_eq!(table.get(1, "submitter"), Some(&Cell::Text(String::new())));
        assert_eq!(
            table.get(1, "url"),
            Some(&Cell::Text("https://gcn.nasa.gov/circulars/40002".into()))
        );
    }

    #[test]
    fn test_bare_list_response() {
        let body = json!([{"circularId": 1, "subject": "x"}]);
        assert_eq!(circulars_to_table(&body, "u", 50).len(), 1);
        assert!(circulars_to_table(&json!({"unexpected": true}), "u", 50).is_empty());
    }
}
