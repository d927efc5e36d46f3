// src/normalize.rs
// Convert backend return values into JSON-safe primitives

use crate::coords::{Quantity, SkyCoord};
use crate::value::{Cell, Output, Table};
use serde_json::{Map, Number, Value, json};

/// Recursively convert a backend value into JSON.
///
/// Total: every input produces a value. NaN and infinities become `null`,
/// bytes are decoded as UTF-8 with replacement characters.
pub fn normalize(value: Output) -> Value {
    match value {
        Output::Null => Value::Null,
        Output::Bool(b) => Value::Bool(b),
        Output::Int(i) => Value::Number(i.into()),
        Output::Float(f) => float(f),
        Output::Str(s) => Value::String(s),
        Output::Bytes(b) => Value::String(String::from_utf8_lossy(&b).into_owned()),
        Output::Table(t) => table(t),
        Output::Coord(c) => coord(&c),
        Output::Quantity(q) => quantity(&q),
        Output::List(items) => Value::Array(items.into_iter().map(normalize).collect()),
        Output::Map(entries) => Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .collect(),
        ),
        Output::Json(v) => v,
    }
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

fn coord(c: &SkyCoord) -> Value {
    json!({
        "ra_deg": c.ra_deg(),
        "dec_deg": c.dec_deg(),
        "frame": c.frame().name(),
    })
}

fn quantity(q: &Quantity) -> Value {
    json!({
        "value": float(q.value),
        "unit": q.unit.symbol(),
    })
}

fn cell(c: Cell) -> Value {
    match c {
        Cell::Masked => Value::Null,
        Cell::Bool(b) => Value::Bool(b),
        Cell::Int(i) => Value::Number(i.into()),
        Cell::Float(f) => float(f),
        Cell::Text(s) => Value::String(s),
        Cell::Bytes(b) => Value::String(String::from_utf8_lossy(&b).into_owned()),
        Cell::Array(items) => Value::Array(items.into_iter().map(cell).collect()),
    }
}

/// `{columns, rows, meta, row_count}` with one object per row
fn table(t: Table) -> Value {
    let row_count = t.rows.len();

    let columns: Vec<Value> = t
        .columns
        .iter()
        .map(|c| {
            let mut info = Map::new();
            info.insert("name".into(), Value::String(c.name.clone()));
            info.insert("dtype".into(), Value::String(c.dtype.clone()));
            if let Some(unit) = &c.unit {
                info.insert("unit".into(), Value::String(unit.clone()));
            }
            if let Some(desc) = &c.description {
                info.insert("description".into(), Value::String(desc.clone()));
            }
            Value::Object(info)
        })
        .collect();

    let names: Vec<&str> = t.columns.iter().map(|c| c.name.as_str()).collect();
    let rows: Vec<Value> = t
        .rows
        .into_iter()
        .map(|row| {
            let record: Map<String, Value> = names
                .iter()
                .zip(row)
                .map(|(name, value)| (name.to_string(), cell(value)))
                .collect();
            Value::Object(record)
        })
        .collect();

    let meta: Map<String, Value> = t.meta.into_iter().map(|(k, v)| (k, normalize(v))).collect();

    json!({
        "columns": columns,
        "rows": rows,
        "meta": meta,
        "row_count": row_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{AngleUnit, Frame};
    use crate::value::Column;

    fn sample_table() -> Table {
        let mut t = Table::new(vec![
            Column::new("main_id", "char"),
            Column::new("ra", "double").with_unit("deg"),
            Column::new("flux", "float"),
            Column::new("bands", "int"),
        ]);
        t.push_row(vec![
            "M 31".into(),
            Cell::Float(10.684),
            Cell::Float(f64::NAN),
            Cell::Array(vec![Cell::Int(1), Cell::Int(2)]),
        ]);
        t.push_row(vec![Cell::Masked, Cell::Float(83.82), Cell::Float(2.5), Cell::Array(vec![])]);
        t.meta.push(("query".into(), Output::Str("SELECT".into())));
        t
    }

    // ============================================================================
    // Tables
    // ============================================================================

    #[test]
    fn test_table_shape() {
        let v = normalize(Output::Table(sample_table()));
        assert_eq!(v["row_count"], 2);
        assert_eq!(v["columns"][1]["name"], "ra");
        assert_eq!(v["columns"][1]["unit"], "deg");
        assert!(v["columns"][0].get("unit").is_none());
        assert_eq!(v["rows"][0]["main_id"], "M 31");
        assert_eq!(v["rows"][0]["flux"], Value::Null);
        assert_eq!(v["rows"][0]["bands"], json!([1, 2]));
        assert_eq!(v["rows"][1]["main_id"], Value::Null);
        assert_eq!(v["meta"]["query"], "SELECT");
    }

    #[test]
    fn test_list_of_tables() {
        let v = normalize(Output::List(vec![
            Output::Table(sample_table()),
            Output::Table(Table::default()),
        ]));
        assert_eq!(v[0]["row_count"], 2);
        assert_eq!(v[1]["row_count"], 0);
        assert_eq!(v[1]["rows"], json!([]));
    }

    // ============================================================================
    // Domain values
    // ============================================================================

    #[test]
    fn test_coord() {
        let c = SkyCoord::new(10.68, 41.27, Frame::Fk5).unwrap();
        let v = normalize(Output::Coord(c));
        assert_eq!(v["ra_deg"], 10.68);
        assert_eq!(v["dec_deg"], 41.27);
        assert_eq!(v["frame"], "fk5");
    }

    #[test]
    fn test_quantity() {
        let v = normalize(Output::Quantity(Quantity::new(5.0, AngleUnit::Arcmin)));
        assert_eq!(v, json!({"value": 5.0, "unit": "arcmin"}));
    }

    // ============================================================================
    // Primitive edge cases
    // ============================================================================

    #[test]
    fn test_non_finite_floats_become_null() {
        for f in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(normalize(Output::Float(f)), Value::Null);
        }
        let nested = Output::List(vec![Output::map([("x", Output::Float(f64::NAN))])]);
        assert_eq!(normalize(nested), json!([{"x": null}]));
    }

    #[test]
    fn test_bytes_decode_lossy() {
        assert_eq!(normalize(Output::Bytes(b"abc".to_vec())), "abc");
        let v = normalize(Output::Bytes(vec![0x61, 0xff, 0x62]));
        assert_eq!(v, "a\u{fffd}b");
    }

    #[test]
    fn test_nested_containers() {
        let out = Output::map([
            ("list", Output::List(vec![Output::Int(1), Output::Null, Output::Bytes(vec![0x80])])),
            ("inner", Output::map([("ok", Output::Bool(true))])),
        ]);
        let v = normalize(out);
        assert_eq!(v["list"], json!([1, null, "\u{fffd}"]));
        assert_eq!(v["inner"]["ok"], true);
    }

    #[test]
    fn test_idempotent_on_json_safe_input() {
        let inputs = [
            json!(null),
            json!({"a": [1, 2.5, "x", null, true], "b": {"c": -3}}),
            json!([[], {}, "", 0]),
        ];
        for x in inputs {
            let once = normalize(Output::from(x.clone()));
            assert_eq!(once, x);
            let twice = normalize(Output::from(once.clone()));
            assert_eq!(twice, once);
        }
    }
}
