// src/backends/args.rs
// Keyword arguments for a backend call, with typed accessors

use super::Member;
use crate::coerce::Argument;
use crate::coords::{AngleUnit, Frame, Quantity, SkyCoord};
use crate::error::CallError;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static QUANTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^\s*([+-]?\d+(?:\.\d*)?(?:[eE][+-]?\d+)?|[+-]?\.\d+)\s*([A-Za-z]*)\s*$").expect("quantity regex")
});

/// Coerced keyword arguments for one invocation.
///
/// Accessors remove the value they read. A JSON `null` reads as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    values: BTreeMap<String, Argument>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, arg: Argument) {
        self.values.insert(name.into(), arg);
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with(mut self, name: impl Into<String>, arg: impl Into<Argument>) -> Self {
        self.insert(name, arg.into());
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Argument> {
        self.values.get(name)
    }

    fn take(&mut self, name: &str) -> Option<Argument> {
        match self.values.remove(name)? {
            Argument::Json(Value::Null) => None,
            other => Some(other),
        }
    }

    fn take_json(&mut self, name: &str) -> Result<Option<Value>, CallError> {
        match self.take(name) {
            None => Ok(None),
            Some(Argument::Json(v)) => Ok(Some(v)),
            Some(other) => Err(type_error(name, "a plain value", &other)),
        }
    }

    pub fn string(&mut self, name: &str) -> Result<Option<String>, CallError> {
        match self.take_json(name)? {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(type_error(name, "a string", &Argument::Json(other))),
        }
    }

    pub fn required_string(&mut self, name: &str) -> Result<String, CallError> {
        self.string(name)?.ok_or_else(|| missing(name))
    }

    /// A string, a comma-separated string, or an array of strings
    pub fn strings(&mut self, name: &str) -> Result<Option<Vec<String>>, CallError> {
        match self.take_json(name)? {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(
                s.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect(),
            )),
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    other => Err(type_error(name, "a list of strings", &Argument::Json(other))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(other) => Err(type_error(name, "a string or list of strings", &Argument::Json(other))),
        }
    }

    pub fn float(&mut self, name: &str) -> Result<Option<f64>, CallError> {
        match self.take_json(name)? {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| type_error(name, "a number", &Argument::Json(Value::String(s)))),
            Some(other) => Err(type_error(name, "a number", &Argument::Json(other))),
        }
    }

    pub fn integer(&mut self, name: &str) -> Result<Option<i64>, CallError> {
        match self.take_json(name)? {
            None => Ok(None),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(i) => Ok(Some(i)),
                None => Err(type_error(name, "an integer", &Argument::Json(Value::Number(n)))),
            },
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| type_error(name, "an integer", &Argument::Json(Value::String(s)))),
            Some(other) => Err(type_error(name, "an integer", &Argument::Json(other))),
        }
    }

    pub fn boolean(&mut self, name: &str) -> Result<Option<bool>, CallError> {
        match self.take_json(name)? {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(b)),
            Some(other) => Err(type_error(name, "a boolean", &Argument::Json(other))),
        }
    }

    /// A coerced sky position, an `{ra, dec}` mapping, or a coordinate string
    pub fn coord(&mut self, name: &str) -> Result<Option<SkyCoord>, CallError> {
        match self.take(name) {
            None => Ok(None),
            Some(Argument::Coord(c)) => Ok(Some(c)),
            Some(Argument::Json(Value::String(s))) => Ok(Some(SkyCoord::parse(&s, Frame::Icrs)?)),
            Some(Argument::Json(Value::Object(map))) => {
                let ra = map.get("ra").and_then(Value::as_f64);
                let dec = map.get("dec").and_then(Value::as_f64);
                match (ra, dec) {
                    (Some(ra), Some(dec)) => Ok(Some(SkyCoord::icrs(ra, dec)?)),
                    _ => Err(type_error(name, "coordinates", &Argument::Json(Value::Object(map)))),
                }
            }
            Some(other) => Err(type_error(name, "coordinates", &other)),
        }
    }

    pub fn required_coord(&mut self, name: &str) -> Result<SkyCoord, CallError> {
        self.coord(name)?.ok_or_else(|| missing(name))
    }

    /// A coerced quantity, a bare number (arc-minutes), or a string like `"5 arcmin"`
    pub fn quantity(&mut self, name: &str) -> Result<Option<Quantity>, CallError> {
        match self.take(name) {
            None => Ok(None),
            Some(Argument::Quantity(q)) => Ok(Some(q)),
            Some(Argument::Json(Value::Number(n))) => Ok(n.as_f64().map(Quantity::arcmin)),
            Some(Argument::Json(Value::String(s))) => {
                parse_quantity(&s).ok_or_else(|| type_error(name, "an angle", &Argument::Json(Value::String(s)))).map(Some)
            }
            Some(other) => Err(type_error(name, "an angle", &other)),
        }
    }
}

fn parse_quantity(s: &str) -> Option<Quantity> {
    let caps = QUANTITY_RE.captures(s)?;
    let value: f64 = caps[1].parse().ok()?;
    let unit = match &caps[2] {
        "" => AngleUnit::Arcmin,
        u => AngleUnit::from_name(u)?,
    };
    Some(Quantity::new(value, unit))
}

fn type_error(name: &str, expected: &str, got: &Argument) -> CallError {
    CallError::invalid(format!(
        "argument '{}' must be {}, got {}",
        name,
        expected,
        crate::utils::truncate(&got.to_string(), 60)
    ))
}

fn missing(name: &str) -> CallError {
    CallError::invalid(format!("missing required argument: '{}'", name))
}

/// Reject unexpected names and report required parameters that are absent
pub fn check_names<'a, I>(member: &Member, names: I) -> Result<(), CallError>
where
    I: IntoIterator<Item = &'a str>,
{
    let names: Vec<&str> = names.into_iter().collect();
    if let Some(unexpected) = names
        .iter()
        .find(|k| !member.params.iter().any(|p| p.name == **k))
    {
        return Err(CallError::invalid(format!(
            "{}() got an unexpected keyword argument '{}'",
            member.name, unexpected
        )));
    }

    let missing: Vec<&str> = member
        .params
        .iter()
        .filter(|p| !p.has_default() && !names.contains(&p.name))
        .map(|p| p.name)
        .collect();
    if !missing.is_empty() {
        return Err(CallError::invalid(format!(
            "{}() missing {} required argument{}: {}",
            member.name,
            missing.len(),
            if missing.len() == 1 { "" } else { "s" },
            missing.iter().map(|m| format!("'{}'", m)).collect::<Vec<_>>().join(", ")
        )));
    }
    Ok(())
}
