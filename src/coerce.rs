// src/coerce.rs
// Name-driven conversion of caller arguments into coordinates and quantities

use crate::coords::{AngleUnit, Frame, Quantity, SkyCoord};
use crate::resolver::NameResolver;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Parameter names treated as sky positions (exact match)
const COORD_PARAMS: &[&str] = &["coordinates", "coord", "coords", "position", "pos", "target"];

/// Parameter names treated as angular radii (exact match)
const RADIUS_PARAMS: &[&str] = &["radius", "rad", "search_radius", "cone_radius"];

/// A caller argument after coercion
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// Left as supplied
    Json(Value),
    Coord(SkyCoord),
    Quantity(Quantity),
}

impl Argument {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Argument::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Argument::Json(Value::Null))
    }
}

impl From<Value> for Argument {
    fn from(v: Value) -> Self {
        Argument::Json(v)
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Json(Value::String(s)) => f.write_str(s),
            Argument::Json(v) => write!(f, "{}", v),
            Argument::Coord(c) => write!(f, "<SkyCoord ({}): ({}, {}) deg>", c.frame(), c.ra_deg(), c.dec_deg()),
            Argument::Quantity(q) => write!(f, "{}", q),
        }
    }
}

fn is_coord_param(name: &str) -> bool {
    COORD_PARAMS.contains(&name) || name.contains("coord")
}

fn is_radius_param(name: &str) -> bool {
    RADIUS_PARAMS.contains(&name) || name.contains("radius")
}

fn is_box_param(name: &str) -> bool {
    name == "width" || name == "height"
}

/// Converts untyped arguments using parameter-name heuristics.
///
/// Rules apply first-match-wins: coordinate vocabulary, then radius
/// vocabulary, then exact `width`/`height`. A rule that cannot build its
/// typed value leaves the argument unchanged.
#[derive(Clone, Default)]
pub struct Coercer {
    resolver: Option<Arc<dyn NameResolver>>,
}

impl Coercer {
    pub fn new(resolver: Arc<dyn NameResolver>) -> Self {
        Self {
            resolver: Some(resolver),
        }
    }

    /// A coercer that never performs object-name lookups
    pub fn offline() -> Self {
        Self { resolver: None }
    }

    pub async fn coerce(&self, param_name: &str, value: Value) -> Argument {
        if value.is_null() {
            return Argument::Json(value);
        }

        let name = param_name.to_lowercase();

        if is_coord_param(&name) {
            match &value {
                Value::Object(map) if map.contains_key("ra") && map.contains_key("dec") => {
                    return match coord_from_map(map) {
                        Some(c) => Argument::Coord(c),
                        None => Argument::Json(value),
                    };
                }
                Value::String(s) => {
                    return match self.coord_from_str(s).await {
                        Some(c) => Argument::Coord(c),
                        None => Argument::Json(value),
                    };
                }
                _ => {}
            }
        }

        if is_radius_param(&name) || is_box_param(&name) {
            if let Some(q) = quantity_from(&value) {
                return Argument::Quantity(q);
            }
        }

        Argument::Json(value)
    }

    /// Object name first, then a literal coordinate string
    async fn coord_from_str(&self, s: &str) -> Option<SkyCoord> {
        if let Some(resolver) = &self.resolver {
            match resolver.resolve(s).await {
                Ok(c) => return Some(c),
                Err(e) => debug!(input = %s, error = %e, "Name resolution failed, trying literal parse"),
            }
        }
        SkyCoord::parse(s, Frame::Icrs).ok()
    }
}

fn coord_from_map(map: &Map<String, Value>) -> Option<SkyCoord> {
    let ra = map.get("ra")?.as_f64()?;
    let dec = map.get("dec")?.as_f64()?;
    let frame = match map.get("frame") {
        None | Some(Value::Null) => Frame::Icrs,
        Some(Value::String(f)) => f.parse().ok()?,
        Some(_) => return None,
    };
    SkyCoord::new(ra, dec, frame).ok()
}

/// Bare number = arc-minutes; mapping = `{value|v, unit|u}`
fn quantity_from(value: &Value) -> Option<Quantity> {
    match value {
        Value::Number(n) => n.as_f64().map(Quantity::arcmin),
        Value::Object(map) => {
            let amount = match map.get("value").or_else(|| map.get("v")) {
                None => 1.0,
                Some(v) => v.as_f64()?,
            };
            let unit = map
                .get("unit")
                .or_else(|| map.get("u"))
                .and_then(Value::as_str)
                .and_then(AngleUnit::from_name)
                .unwrap_or(AngleUnit::Arcmin);
            Some(Quantity::new(amount, unit))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, ToolError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubResolver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl NameResolver for StubResolver {
        fn name(&self) -> &str {
            "stub"
        }

        async fn resolve(&self, object: &str) -> Result<SkyCoord, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if object.eq_ignore_ascii_case("M31") {
                SkyCoord::icrs(10.684_708, 41.268_75)
            } else {
                Err(ToolError::new(ErrorCode::ObjectNotFound, "not found", "stub"))
            }
        }
    }

    fn coercer() -> (Coercer, Arc<StubResolver>) {
        let stub = Arc::new(StubResolver {
            calls: AtomicUsize::new(0),
        });
        (Coercer::new(stub.clone()), stub)
    }

    // ============================================================================
    // Coordinates
    // ============================================================================

    #[tokio::test]
    async fn test_ra_dec_mapping_becomes_coord() {
        let (c, _) = coercer();
        let arg = c.coerce("coordinates", json!({"ra": 10.68, "dec": 41.27})).await;
        let Argument::Coord(coord) = arg else { panic!("expected coord, got {:?}", arg) };
        assert!((coord.ra_deg() - 10.68).abs() < 1e-9);
        assert!((coord.dec_deg() - 41.27).abs() < 1e-9);
        assert_eq!(coord.frame(), Frame::Icrs);
    }

    #[tokio::test]
    async fn test_mapping_frame_is_honored() {
        let (c, _) = coercer();
        let arg = c.coerce("pos", json!({"ra": 1.0, "dec": 2.0, "frame": "galactic"})).await;
        let Argument::Coord(coord) = arg else { panic!("expected coord") };
        assert_eq!(coord.frame(), Frame::Galactic);
    }

    #[tokio::test]
    async fn test_bad_mapping_degrades_to_original() {
        let (c, _) = coercer();
        for v in [
            json!({"ra": "ten", "dec": 41.0}),
            json!({"ra": 10.0, "dec": 95.0}),
            json!({"ra": 10.0, "dec": 41.0, "frame": "fk4"}),
        ] {
            assert_eq!(c.coerce("coords", v.clone()).await, Argument::Json(v));
        }
    }

    #[tokio::test]
    async fn test_string_resolves_name_first() {
        let (c, stub) = coercer();
        let arg = c.coerce("target", json!("M31")).await;
        assert!(matches!(arg, Argument::Coord(_)));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_string_falls_back_to_literal_parse() {
        let (c, stub) = coercer();
        let arg = c.coerce("coordinates", json!("10.68 41.27")).await;
        let Argument::Coord(coord) = arg else { panic!("expected coord") };
        assert!((coord.ra_deg() - 10.68).abs() < 1e-9);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unresolvable_string_passes_through() {
        let (c, _) = coercer();
        let arg = c.coerce("coordinates", json!("not a real object")).await;
        assert_eq!(arg, Argument::Json(json!("not a real object")));
    }

    #[tokio::test]
    async fn test_substring_match_triggers_coercion() {
        // Ambiguous names still match; failure degrades to pass-through
        let c = Coercer::offline();
        assert!(matches!(c.coerce("coordinator", json!("1 2")).await, Argument::Coord(_)));
        assert!(matches!(c.coerce("CoordFrame", json!({"ra": 1, "dec": 2})).await, Argument::Coord(_)));
    }

    // ============================================================================
    // Quantities
    // ============================================================================

    #[tokio::test]
    async fn test_bare_number_radius_is_arcmin() {
        let c = Coercer::offline();
        assert_eq!(c.coerce("radius", json!(5)).await, Argument::Quantity(Quantity::arcmin(5.0)));
        assert_eq!(c.coerce("search_radius", json!(0.5)).await, Argument::Quantity(Quantity::arcmin(0.5)));
    }

    #[tokio::test]
    async fn test_radius_mapping() {
        let c = Coercer::offline();
        let q = c.coerce("radius", json!({"value": 2, "unit": "deg"})).await;
        assert_eq!(q, Argument::Quantity(Quantity::degrees(2.0)));

        let q = c.coerce("cone_radius", json!({"v": 30, "u": "arcsec"})).await;
        assert_eq!(q, Argument::Quantity(Quantity::new(30.0, AngleUnit::Arcsec)));

        let q = c.coerce("radius", json!({"value": 3, "unit": "parsec"})).await;
        assert_eq!(q, Argument::Quantity(Quantity::arcmin(3.0)));

        let q = c.coerce("radius", json!({})).await;
        assert_eq!(q, Argument::Quantity(Quantity::arcmin(1.0)));
    }

    #[tokio::test]
    async fn test_width_height_exact_only() {
        let c = Coercer::offline();
        assert_eq!(c.coerce("width", json!(10)).await, Argument::Quantity(Quantity::arcmin(10.0)));
        assert_eq!(c.coerce("Height", json!(4)).await, Argument::Quantity(Quantity::arcmin(4.0)));
        assert_eq!(c.coerce("box_width", json!(10)).await, Argument::Json(json!(10)));
    }

    #[tokio::test]
    async fn test_coordinate_rule_wins_over_radius() {
        let c = Coercer::offline();
        let arg = c.coerce("radius_coord", json!("10 20")).await;
        assert!(matches!(arg, Argument::Coord(_)));
        // A number is not a coordinate, so the radius rule still applies
        let arg = c.coerce("radius_coord", json!(3)).await;
        assert_eq!(arg, Argument::Quantity(Quantity::arcmin(3.0)));
    }

    // ============================================================================
    // Pass-through
    // ============================================================================

    #[tokio::test]
    async fn test_null_and_unmatched_pass_through() {
        let c = Coercer::offline();
        assert!(c.coerce("coordinates", Value::Null).await.is_null());
        assert_eq!(c.coerce("catalog", json!("I/239")).await, Argument::Json(json!("I/239")));
        assert_eq!(c.coerce("radius", json!("5 arcmin")).await, Argument::Json(json!("5 arcmin")));
    }

    #[test]
    fn test_display() {
        assert_eq!(Argument::Json(json!("M31")).to_string(), "M31");
        assert_eq!(Argument::Json(json!({"a": 1})).to_string(), r#"{"a":1}"#);
        assert_eq!(Argument::Quantity(Quantity::arcmin(5.0)).to_string(), "5 arcmin");
    }
}
