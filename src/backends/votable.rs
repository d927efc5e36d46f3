// src/backends/votable.rs
// VOTable TABLEDATA reader for TAP responses

use crate::error::{CallError, ErrorCode, ToolError};
use crate::value::{Cell, Column, Table};
use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};

/// Serialization requested from TAP services
pub const FORMAT: &str = "votable/td";

#[derive(Debug, Default)]
struct Field {
    name: String,
    datatype: String,
    arraysize: Option<String>,
    unit: Option<String>,
    description: Option<String>,
    null: Option<String>,
}

impl Field {
    fn is_text(&self) -> bool {
        matches!(self.datatype.as_str(), "char" | "unicodeChar")
    }

    fn is_array(&self) -> bool {
        !self.is_text() && self.arraysize.as_deref().is_some_and(|a| a != "1")
    }

    fn convert(&self, raw: &str) -> Cell {
        let trimmed = raw.trim();
        if trimmed.is_empty() || self.null.as_deref() == Some(trimmed) {
            return Cell::Masked;
        }
        if self.is_text() {
            return Cell::Text(trimmed.to_string());
        }
        if self.is_array() {
            return Cell::Array(trimmed.split_whitespace().map(|v| self.scalar(v)).collect());
        }
        self.scalar(trimmed)
    }

    fn scalar(&self, v: &str) -> Cell {
        match self.datatype.as_str() {
            "boolean" => match v.to_ascii_lowercase().as_str() {
                "t" | "true" | "1" => Cell::Bool(true),
                "f" | "false" | "0" => Cell::Bool(false),
                _ => Cell::Masked,
            },
            "short" | "int" | "long" | "unsignedByte" => match v.parse::<i64>() {
                Ok(i) => Cell::Int(i),
                Err(_) => v.parse::<f64>().map(Cell::Float).unwrap_or(Cell::Masked),
            },
            "float" | "double" => v.parse::<f64>().map(Cell::Float).unwrap_or(Cell::Masked),
            _ => Cell::Text(v.to_string()),
        }
    }

    fn into_column(self) -> Column {
        Column {
            name: self.name,
            dtype: self.datatype,
            unit: self.unit,
            description: self.description,
        }
    }
}

/// What the reader is collecting text for
#[derive(Debug, PartialEq)]
enum Capture {
    None,
    FieldDescription,
    Info,
    Cell,
}

fn parse_err(e: impl std::fmt::Display) -> CallError {
    CallError::Parse(format!("votable: {}", e))
}

fn attr(e: &BytesStart, name: &[u8]) -> Result<Option<String>, CallError> {
    match e.try_get_attribute(name).map_err(parse_err)? {
        Some(a) => Ok(Some(a.unescape_value().map_err(parse_err)?.into_owned())),
        None => Ok(None),
    }
}

/// Parse the first table of a VOTable document.
///
/// A `QUERY_STATUS` of `ERROR` becomes `INVALID_QUERY` carrying the
/// service's message. Binary serializations are rejected.
pub fn parse_votable(xml: &str) -> Result<Table, CallError> {
    let mut reader = Reader::from_str(xml);

    let mut fields: Vec<Field> = Vec::new();
    let mut rows: Vec<Vec<Cell>> = Vec::new();
    let mut infos: Vec<(String, String)> = Vec::new();
    let mut query_error: Option<String> = None;

    let mut capture = Capture::None;
    let mut text = String::new();
    let mut in_field = false;
    let mut info: Option<(String, String)> = None;
    let mut row: Option<Vec<String>> = None;
    let mut tables_seen = 0usize;
    let mut table_done = false;

    loop {
        let event = reader.read_event().map_err(parse_err)?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let empty = matches!(event, Event::Empty(_));
                match e.local_name().as_ref() {
                    b"TABLE" => {
                        tables_seen += 1;
                        if tables_seen > 1 {
                            table_done = true;
                        }
                    }
                    b"FIELD" if !table_done => {
                        fields.push(Field {
                            name: attr(e, b"name")?.unwrap_or_default(),
                            datatype: attr(e, b"datatype")?.unwrap_or_else(|| "char".into()),
                            arraysize: attr(e, b"arraysize")?,
                            unit: attr(e, b"unit")?,
                            ..Default::default()
                        });
                        in_field = !empty;
                    }
                    b"DESCRIPTION" if in_field => {
                        capture = Capture::FieldDescription;
                        text.clear();
                    }
                    b"VALUES" if in_field => {
                        if let Some(null) = attr(e, b"null")?
                            && let Some(field) = fields.last_mut()
                        {
                            field.null = Some(null);
                        }
                    }
                    b"INFO" => {
                        let name = attr(e, b"name")?.unwrap_or_default();
                        let value = attr(e, b"value")?.unwrap_or_default();
                        if empty {
                            record_info(&mut infos, &mut query_error, name, value, String::new());
                        } else {
                            info = Some((name, value));
                            capture = Capture::Info;
                            text.clear();
                        }
                    }
                    b"TR" if !table_done => row = Some(Vec::new()),
                    b"TD" if !table_done => {
                        if empty {
                            if let Some(r) = row.as_mut() {
                                r.push(String::new());
                            }
                        } else {
                            capture = Capture::Cell;
                            text.clear();
                        }
                    }
                    b"BINARY" | b"BINARY2" | b"FITS" => {
                        return Err(CallError::Parse(
                            "votable: binary serialization is not supported".into(),
                        ));
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                if capture != Capture::None {
                    text.push_str(&t.decode().map_err(parse_err)?);
                }
            }
            Event::CData(t) => {
                if capture != Capture::None {
                    text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::GeneralRef(r) => {
                if capture != Capture::None {
                    if let Some(ch) = r.resolve_char_ref().map_err(parse_err)? {
                        text.push(ch);
                    } else {
                        let name = r.decode().map_err(parse_err)?;
                        match resolve_predefined_entity(&name) {
                            Some(s) => text.push_str(s),
                            None => {
                                text.push('&');
                                text.push_str(&name);
                                text.push(';');
                            }
                        }
                    }
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"FIELD" => in_field = false,
                b"DESCRIPTION" if capture == Capture::FieldDescription => {
                    if let Some(field) = fields.last_mut() {
                        let d = text.trim();
                        if !d.is_empty() {
                            field.description = Some(d.to_string());
                        }
                    }
                    capture = Capture::None;
                }
                b"INFO" => {
                    if let Some((name, value)) = info.take() {
                        let body = text.trim().to_string();
                        record_info(&mut infos, &mut query_error, name, value, body);
                    }
                    capture = Capture::None;
                }
                b"TD" if capture == Capture::Cell => {
                    if let Some(r) = row.as_mut() {
                        r.push(std::mem::take(&mut text));
                    }
                    capture = Capture::None;
                }
                b"TR" => {
                    if let Some(raw) = row.take() {
                        let cells = fields
                            .iter()
                            .enumerate()
                            .map(|(i, f)| raw.get(i).map(|v| f.convert(v)).unwrap_or(Cell::Masked))
                            .collect();
                        rows.push(cells);
                    }
                }
                b"TABLE" => table_done = true,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(message) = query_error {
        return Err(ToolError::new(ErrorCode::InvalidQuery, message, "tap")
            .recoverable(false)
            .suggestion("Check the ADQL syntax and table names")
            .into());
    }

    let mut table = Table::new(fields.into_iter().map(Field::into_column).collect());
    table.rows = rows;
    table.meta = infos
        .into_iter()
        .map(|(name, value)| (name, value.into()))
        .collect();
    Ok(table)
}

fn record_info(
    infos: &mut Vec<(String, String)>,
    query_error: &mut Option<String>,
    name: String,
    value: String,
    body: String,
) {
    if name == "QUERY_STATUS" && value.eq_ignore_ascii_case("ERROR") {
        *query_error = Some(if body.is_empty() {
            "Query failed".to_string()
        } else {
            body
        });
        return;
    }
    if !name.is_empty() {
        infos.push((name, if value.is_empty() { body } else { value }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Output;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<VOTABLE version="1.4" xmlns="http://www.ivoa.net/xml/VOTable/v1.3">
  <RESOURCE type="results">
    <INFO name="QUERY_STATUS" value="OK"/>
    <TABLE>
      <FIELD name="main_id" datatype="char" arraysize="*">
        <DESCRIPTION>Main identifier &amp; name</DESCRIPTION>
      </FIELD>
      <FIELD name="ra" datatype="double" unit="deg"/>
      <FIELD name="nbref" datatype="int">
        <VALUES null="-999"/>
      </FIELD>
      <FIELD name="pm" datatype="float" arraysize="2"/>
      <FIELD name="flag" datatype="boolean"/>
      <DATA>
        <TABLEDATA>
          <TR><TD>M  31</TD><TD>10.684708</TD><TD>12</TD><TD>1.5 -2.5</TD><TD>T</TD></TR>
          <TR><TD>&lt;b&gt; &#65;</TD><TD></TD><TD>-999</TD><TD/><TD>F</TD></TR>
        </TABLEDATA>
      </DATA>
    </TABLE>
  </RESOURCE>
</VOTABLE>"#;

    // ============================================================================
    // TABLEDATA parsing
    // ============================================================================

    #[test]
    fn test_columns_and_metadata() {
        let table = parse_votable(SAMPLE).unwrap();
        let names: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["main_id", "ra", "nbref", "pm", "flag"]);
        assert_eq!(table.columns[0].description.as_deref(), Some("Main identifier & name"));
        assert_eq!(table.columns[1].unit.as_deref(), Some("deg"));
        assert_eq!(table.columns[1].dtype, "double");
        assert_eq!(table.meta, vec![("QUERY_STATUS".to_string(), Output::Str("OK".into()))]);
    }

    #[test]
    fn test_cell_types() {
        let table = parse_votable(SAMPLE).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][0], Cell::Text("M  31".into()));
        assert_eq!(table.rows[0][1], Cell::Float(10.684708));
        assert_eq!(table.rows[0][2], Cell::Int(12));
        assert_eq!(table.rows[0][3], Cell::Array(vec![Cell::Float(1.5), Cell::Float(-2.5)]));
        assert_eq!(table.rows[0][4], Cell::Bool(true));
    }

    #[test]
    fn test_masked_and_entities() {
        let table = parse_votable(SAMPLE).unwrap();
        assert_eq!(table.rows[1][0], Cell::Text("<b> A".into()));
        assert_eq!(table.rows[1][1], Cell::Masked);
        assert_eq!(table.rows[1][2], Cell::Masked);
        assert_eq!(table.rows[1][3], Cell::Masked);
        assert_eq!(table.rows[1][4], Cell::Bool(false));
    }

    #[test]
    fn test_short_rows_are_padded() {
        let xml = r#"<VOTABLE><RESOURCE><TABLE>
            <FIELD name="a" datatype="int"/><FIELD name="b" datatype="int"/>
            <DATA><TABLEDATA><TR><TD>1</TD></TR></TABLEDATA></DATA>
            </TABLE></RESOURCE></VOTABLE>"#;
        let table = parse_votable(xml).unwrap();
        assert_eq!(table.rows[0], vec![Cell::Int(1), Cell::Masked]);
    }

    #[test]
    fn test_empty_result() {
        let xml = r#"<VOTABLE><RESOURCE><TABLE><FIELD name="a" datatype="int"/>
            <DATA><TABLEDATA></TABLEDATA></DATA></TABLE></RESOURCE></VOTABLE>"#;
        let table = parse_votable(xml).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.columns.len(), 1);
    }

    // ============================================================================
    // Failures
    // ============================================================================

    #[test]
    fn test_query_status_error() {
        let xml = r#"<VOTABLE><RESOURCE type="results">
            <INFO name="QUERY_STATUS" value="ERROR">Table 'nope' does not exist</INFO>
            </RESOURCE></VOTABLE>"#;
        let err = parse_votable(xml).unwrap_err();
        let CallError::Domain(e) = err else { panic!("expected domain error") };
        assert_eq!(e.code, ErrorCode::InvalidQuery);
        assert_eq!(e.message, "Table 'nope' does not exist");
    }

    #[test]
    fn test_binary_rejected() {
        let xml = r#"<VOTABLE><RESOURCE><TABLE><FIELD name="a" datatype="int"/>
            <DATA><BINARY2><STREAM encoding="base64">AAAA</STREAM></BINARY2></DATA>
            </TABLE></RESOURCE></VOTABLE>"#;
        assert!(matches!(parse_votable(xml), Err(CallError::Parse(_))));
    }

    #[test]
    fn test_malformed_xml() {
        assert!(matches!(parse_votable("<VOTABLE><TABLE></VOTABLE>"), Err(CallError::Parse(_))));
    }
}
