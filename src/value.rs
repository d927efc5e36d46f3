// src/value.rs
// Values returned by backend operations, before normalization

use crate::coords::{Quantity, SkyCoord};
use serde_json::Value;

/// One cell of a tabular result
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Missing or masked value
    Masked,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// Array-valued cell (VOTable `arraysize`)
    Array(Vec<Cell>),
}

impl Cell {
    /// Cell for a JSON value from a REST response; objects keep their JSON text
    pub fn from_json(v: &Value) -> Cell {
        match v {
            Value::Null => Cell::Masked,
            Value::Bool(b) => Cell::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Cell::Int(i),
                None => n.as_f64().map(Cell::Float).unwrap_or(Cell::Masked),
            },
            Value::String(s) => Cell::Text(s.clone()),
            Value::Array(items) => Cell::Array(items.iter().map(Cell::from_json).collect()),
            Value::Object(_) => Cell::Text(v.to_string()),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Cell::Masked)
    }
}

/// Column metadata of a tabular result
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub dtype: String,
    pub unit: Option<String>,
    pub description: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, dtype: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dtype: dtype.into(),
            unit: None,
            description: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// A 2-D labeled dataset
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
    pub meta: Vec<(String, Output)>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            meta: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Cell at (row, named column)
    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    pub fn truncate(&mut self, max_rows: usize) {
        self.rows.truncate(max_rows);
    }
}

/// Anything a backend operation can hand back
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Table(Table),
    Coord(SkyCoord),
    Quantity(Quantity),
    List(Vec<Output>),
    Map(Vec<(String, Output)>),
    /// Payload that is already JSON (REST APIs)
    Json(Value),
}

impl Output {
    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Output)>,
        K: Into<String>,
    {
        Output::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<Value> for Output {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Output::Null,
            Value::Bool(b) => Output::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Output::Int(i),
                None => Output::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Output::Str(s),
            Value::Array(items) => Output::List(items.into_iter().map(Output::from).collect()),
            Value::Object(map) => Output::Map(map.into_iter().map(|(k, v)| (k, Output::from(v))).collect()),
        }
    }
}

impl From<Table> for Output {
    fn from(t: Table) -> Self {
        Output::Table(t)
    }
}

impl From<SkyCoord> for Output {
    fn from(c: SkyCoord) -> Self {
        Output::Coord(c)
    }
}

impl From<String> for Output {
    fn from(s: String) -> Self {
        Output::Str(s)
    }
}

impl From<f64> for Output {
    fn from(v: f64) -> Self {
        Output::Float(v)
    }
}
