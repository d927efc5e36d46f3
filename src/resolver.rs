// src/resolver.rs
// Object-name resolution through CDS Sesame with ordered fallback

use crate::coords::SkyCoord;
use crate::error::{CallError, ErrorCode, ToolError, not_found_error};
use crate::http;
use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

/// CDS Sesame name resolver, XML output
pub const SESAME_URL: &str = "https://cds.unistra.fr/cgi-bin/nph-sesame/-ox";

/// Turns an astronomical object name into a sky position
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Short label used in logs and failure details
    fn name(&self) -> &str;

    async fn resolve(&self, object: &str) -> Result<SkyCoord, ToolError>;
}

/// Databases Sesame can be asked to consult
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SesameDatabase {
    Simbad,
    Ned,
    Vizier,
}

impl SesameDatabase {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "simbad" => Some(SesameDatabase::Simbad),
            "ned" => Some(SesameDatabase::Ned),
            "vizier" => Some(SesameDatabase::Vizier),
            _ => None,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            SesameDatabase::Simbad => "S",
            SesameDatabase::Ned => "N",
            SesameDatabase::Vizier => "V",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            SesameDatabase::Simbad => "simbad",
            SesameDatabase::Ned => "ned",
            SesameDatabase::Vizier => "vizier",
        }
    }
}

/// Sesame lookup restricted to a single database
pub struct SesameResolver {
    client: reqwest::Client,
    database: SesameDatabase,
    base_url: String,
}

impl SesameResolver {
    pub fn new(client: reqwest::Client, database: SesameDatabase) -> Self {
        Self {
            client,
            database,
            base_url: SESAME_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl NameResolver for SesameResolver {
    fn name(&self) -> &str {
        self.database.label()
    }

    async fn resolve(&self, object: &str) -> Result<SkyCoord, ToolError> {
        let encoded: String = url::form_urlencoded::byte_serialize(object.trim().as_bytes()).collect();
        let url = format!(
            "{}/{}?{}",
            self.base_url.trim_end_matches('/'),
            self.database.code(),
            encoded
        );
        let request = self.client.get(&url);
        let body = http::send_text("sesame", request)
            .await
            .map_err(|e| e.into_tool_error(self.name()))?;

        let (ra, dec) = parse_sesame(&body)
            .map_err(|e| e.into_tool_error(self.name()))?
            .ok_or_else(|| {
                not_found_error(
                    ErrorCode::ObjectNotFound,
                    format!("{} could not resolve '{}'", self.name(), object),
                    self.name(),
                )
            })?;

        debug!(resolver = %self.name(), object = %object, ra, dec, "Resolved object name");
        SkyCoord::icrs(ra, dec)
    }
}

/// Extract J2000 degrees (`jradeg`, `jdedeg`) from a Sesame XML answer.
///
/// `Ok(None)` means the document was well-formed but named no position.
pub fn parse_sesame(xml: &str) -> Result<Option<(f64, f64)>, CallError> {
    let mut reader = Reader::from_str(xml);
    let mut current: Option<&'static str> = None;
    let mut ra: Option<f64> = None;
    let mut dec: Option<f64> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                current = match e.local_name().as_ref() {
                    b"jradeg" => Some("ra"),
                    b"jdedeg" => Some("dec"),
                    _ => None,
                };
            }
            Ok(Event::Text(t)) => {
                if let Some(field) = current {
                    let text = t
                        .decode()
                        .map_err(|e| CallError::Parse(format!("sesame: {}", e)))?;
                    let value = text.trim().parse::<f64>().ok();
                    match field {
                        "ra" if ra.is_none() => ra = value,
                        "dec" if dec.is_none() => dec = value,
                        _ => {}
                    }
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(CallError::Parse(format!("sesame: {}", e))),
        }
        if ra.is_some() && dec.is_some() {
            break;
        }
    }

    Ok(ra.zip(dec))
}

/// Tries resolvers in order; the first success wins
pub struct ResolverChain {
    resolvers: Vec<Arc<dyn NameResolver>>,
}

impl ResolverChain {
    pub fn new(resolvers: Vec<Arc<dyn NameResolver>>) -> Self {
        Self { resolvers }
    }

    /// Build Sesame resolvers in the configured fallback order
    pub fn sesame(client: &reqwest::Client, order: &[String]) -> Self {
        let resolvers = order
            .iter()
            .filter_map(|name| match SesameDatabase::from_name(name) {
                Some(db) => Some(Arc::new(SesameResolver::new(client.clone(), db)) as Arc<dyn NameResolver>),
                None => {
                    warn!(resolver = %name, "Unknown resolver in fallback order, skipping");
                    None
                }
            })
            .collect();
        Self::new(resolvers)
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

#[async_trait]
impl NameResolver for ResolverChain {
    fn name(&self) -> &str {
        "resolver"
    }

    async fn resolve(&self, object: &str) -> Result<SkyCoord, ToolError> {
        let mut attempts: Vec<Value> = Vec::with_capacity(self.resolvers.len());

        for resolver in &self.resolvers {
            match resolver.resolve(object).await {
                Ok(coord) => return Ok(coord),
                Err(e) => {
                    debug!(resolver = %resolver.name(), object = %object, error = %e, "Resolver failed");
                    attempts.push(json!({
                        "resolver": resolver.name(),
                        "code": e.code.as_str(),
                        "error": e.message,
                    }));
                }
            }
        }

        Err(not_found_error(
            ErrorCode::ObjectNotFound,
            format!("Could not resolve object name: {}", object),
            "resolver",
        )
        .suggestion("Check the object name spelling or provide coordinates directly")
        .detail("object", object)
        .detail("attempts", attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const M31: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Sesame xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<Target option="S">
  <name>M31</name>
  <Resolver name="S=Simbad (via url):    1">
    <otype>G</otype>
    <jpos>00:42:44.33 +41:16:07.5</jpos>
    <jradeg>10.68470833</jradeg>
    <jdedeg>41.26875000</jdedeg>
    <oname>M  31</oname>
  </Resolver>
</Target>
</Sesame>"#;

    const NOTHING: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Sesame>
<Target option="S">
  <name>not-a-galaxy</name>
  <INFO>*** Nothing found *** </INFO>
</Target>
</Sesame>"#;

    struct Fixed {
        label: &'static str,
        result: Option<(f64, f64)>,
    }

    #[async_trait]
    impl NameResolver for Fixed {
        fn name(&self) -> &str {
            self.label
        }

        async fn resolve(&self, object: &str) -> Result<SkyCoord, ToolError> {
            match self.result {
                Some((ra, dec)) => SkyCoord::icrs(ra, dec),
                None => Err(not_found_error(
                    ErrorCode::ObjectNotFound,
                    format!("{} has no {}", self.label, object),
                    self.label,
                )),
            }
        }
    }

    fn fixed(label: &'static str, result: Option<(f64, f64)>) -> Arc<dyn NameResolver> {
        Arc::new(Fixed { label, result })
    }

    // ============================================================================
    // Sesame XML
    // ============================================================================

    #[test]
    fn test_parse_sesame_position() {
        let (ra, dec) = parse_sesame(M31).unwrap().unwrap();
        assert!((ra - 10.684_708_33).abs() < 1e-9);
        assert!((dec - 41.268_75).abs() < 1e-9);
    }

    #[test]
    fn test_parse_sesame_nothing_found() {
        assert_eq!(parse_sesame(NOTHING).unwrap(), None);
    }

    #[test]
    fn test_parse_sesame_malformed() {
        assert!(parse_sesame("<Sesame><jradeg>1</jdedeg>").is_err());
    }

    #[test]
    fn test_database_names() {
        assert_eq!(SesameDatabase::from_name("SIMBAD"), Some(SesameDatabase::Simbad));
        assert_eq!(SesameDatabase::from_name("vizier"), Some(SesameDatabase::Vizier));
        assert_eq!(SesameDatabase::from_name("gaia"), None);
    }

    // ============================================================================
    // Fallback chain
    // ============================================================================

    #[tokio::test]
    async fn test_chain_first_success_wins() {
        let chain = ResolverChain::new(vec![
            fixed("simbad", None),
            fixed("ned", Some((10.0, 20.0))),
            fixed("vizier", Some((30.0, 40.0))),
        ]);
        let c = chain.resolve("thing").await.unwrap();
        assert_eq!(c.ra_deg(), 10.0);
    }

    #[tokio::test]
    async fn test_chain_aggregates_failures() {
        let chain = ResolverChain::new(vec![fixed("simbad", None), fixed("ned", None)]);
        let err = chain.resolve("nowhere").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ObjectNotFound);
        assert!(!err.recoverable);
        let attempts = err.details["attempts"].as_array().unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0]["resolver"], "simbad");
        assert_eq!(attempts[1]["resolver"], "ned");
        assert_eq!(attempts[1]["error"], "ned has no nowhere");
    }

    #[tokio::test]
    async fn test_empty_chain_fails_cleanly() {
        let chain = ResolverChain::new(vec![]);
        assert!(chain.is_empty());
        let err = chain.resolve("M31").await.unwrap_err();
        assert_eq!(err.details["attempts"], json!([]));
    }

    #[test]
    fn test_sesame_chain_skips_unknown_names() {
        let client = reqwest::Client::new();
        let order = vec!["simbad".to_string(), "bogus".to_string(), "vizier".to_string()];
        assert_eq!(ResolverChain::sesame(&client, &order).len(), 2);
    }
}
