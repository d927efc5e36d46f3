// src/backends/simbad.rs
// SIMBAD: identifier lookups over the basic/ident tables, plus generic TAP

use super::tap::{TapService, tap_members};
use super::{Backend, BackendContext, CallArgs, Member, ParamSig, adql_quote, unknown_operation};
use crate::error::{CallError, ErrorCode, ToolError, not_found_error};
use crate::value::{Output, Table};
use async_trait::async_trait;
use serde_json::Value;

const CLASS_NAME: &str = "Simbad";

/// Columns returned for object lookups
const OBJECT_COLUMNS: &str = "basic.main_id, basic.ra, basic.dec, basic.otype, basic.sp_type, \
     basic.rvz_redshift, basic.plx_value, basic.coo_bibcode, ident.id AS matched_id";

const QUERY_OBJECT_DOC: &str = "Query SIMBAD for the basic data of one object.

Parameters
----------
object_name: Identifier known to SIMBAD, e.g. \"M 31\" or \"HD 1\".

Returns
-------
Table with one row per matching object.";

const QUERY_OBJECTS_DOC: &str = "Query SIMBAD for several objects at once.

Parameters
----------
object_names: List of identifiers.";

const QUERY_OBJECTIDS_DOC: &str = "List every identifier SIMBAD knows for an object.

Parameters
----------
object_name: Any identifier of the object.";

/// Basic data for one identifier
pub fn object_adql(object_name: &str) -> String {
    format!(
        "SELECT {} FROM basic JOIN ident ON ident.oidref = basic.oid WHERE ident.id = {}",
        OBJECT_COLUMNS,
        adql_quote(object_name)
    )
}

/// Basic data for a list of identifiers
pub fn objects_adql(object_names: &[String]) -> String {
    let list = object_names
        .iter()
        .map(|n| adql_quote(n))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT {} FROM basic JOIN ident ON ident.oidref = basic.oid WHERE ident.id IN ({})",
        OBJECT_COLUMNS, list
    )
}

/// All identifiers sharing an object with `object_name`
pub fn objectids_adql(object_name: &str) -> String {
    format!(
        "SELECT alias.id FROM ident AS given JOIN ident AS alias ON alias.oidref = given.oidref WHERE given.id = {}",
        adql_quote(object_name)
    )
}

fn object_not_found(object_name: &str) -> ToolError {
    not_found_error(
        ErrorCode::ObjectNotFound,
        format!("Object not found in SIMBAD: {}", object_name),
        "simbad",
    )
    .suggestion("Check the identifier spelling, e.g. 'M 31' rather than 'M31'")
    .detail("object", object_name)
}

pub struct Simbad {
    tap: TapService,
    members: Vec<Member>,
}

impl Simbad {
    pub fn new(ctx: BackendContext) -> Result<Self, ToolError> {
        Ok(Self::from_tap(TapService::new("simbad", ctx)?))
    }

    pub fn from_tap(tap: TapService) -> Self {
        let mut members = tap_members();
        members.retain(|m| m.name != "query_object");
        members.extend([
            Member::method(
                "query_object",
                QUERY_OBJECT_DOC,
                vec![ParamSig::required("object_name", "str")],
            ),
            Member::method(
                "query_objects",
                QUERY_OBJECTS_DOC,
                vec![ParamSig::required("object_names", "list")],
            ),
            Member::method(
                "query_objectids",
                QUERY_OBJECTIDS_DOC,
                vec![ParamSig::required("object_name", "str")],
            ),
            Member::method("list_votable_fields", "", vec![]),
            Member::attribute("SIMBAD_URL"),
        ]);
        Self { tap, members }
    }

    pub async fn query_object(&self, object_name: &str) -> Result<Table, CallError> {
        let table = self.tap.query_tap(&object_adql(object_name), None).await?;
        if table.is_empty() {
            return Err(object_not_found(object_name).into());
        }
        Ok(table)
    }

    pub async fn query_objects(&self, object_names: &[String]) -> Result<Table, CallError> {
        if object_names.is_empty() {
            return Err(CallError::invalid("object_names must not be empty"));
        }
        self.tap.query_tap(&objects_adql(object_names), None).await
    }

    pub async fn query_objectids(&self, object_name: &str) -> Result<Table, CallError> {
        let table = self.tap.query_tap(&objectids_adql(object_name), None).await?;
        if table.is_empty() {
            return Err(object_not_found(object_name).into());
        }
        Ok(table)
    }
}

#[async_trait]
impl Backend for Simbad {
    fn class_name(&self) -> &str {
        CLASS_NAME
    }

    fn members(&self) -> &[Member] {
        &self.members
    }

    async fn invoke(&self, operation: &str, mut args: CallArgs) -> Result<Output, CallError> {
        let table = match operation {
            "query_object" => self.query_object(&args.required_string("object_name")?).await?,
            "query_objects" => {
                let names = args.strings("object_names")?.unwrap_or_default();
                self.query_objects(&names).await?
            }
            "query_objectids" => self.query_objectids(&args.required_string("object_name")?).await?,
            "list_votable_fields" => {
                let mut t = self.tap.get_table_schema("basic").await?;
                t.meta.push(("table".into(), Value::from("basic").into()));
                t
            }
            "help" => return Ok(Output::Str(self.tap.help_text(&self.members))),
            _ => {
                return self
                    .tap
                    .invoke_tap(operation, args)
                    .await?
                    .ok_or_else(|| unknown_operation(CLASS_NAME, operation));
            }
        };
        Ok(Output::Table(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_adql_joins_ident() {
        let adql = object_adql("M 31");
        assert!(adql.starts_with("SELECT basic.main_id, basic.ra"));
        assert!(adql.contains("FROM basic JOIN ident ON ident.oidref = basic.oid"));
        assert!(adql.ends_with("WHERE ident.id = 'M 31'"));
    }

    #[test]
    fn test_objects_adql_quotes_each_name() {
        let adql = objects_adql(&["M 1".into(), "Barnard's star".into()]);
        assert!(adql.ends_with("WHERE ident.id IN ('M 1', 'Barnard''s star')"));
    }

    #[test]
    fn test_objectids_adql() {
        assert_eq!(
            objectids_adql("Vega"),
            "SELECT alias.id FROM ident AS given JOIN ident AS alias ON alias.oidref = given.oidref WHERE given.id = 'Vega'"
        );
    }

    #[test]
    fn test_object_not_found_shape() {
        let err = object_not_found("Nonexistent 1");
        assert_eq!(err.code, ErrorCode::ObjectNotFound);
        assert!(!err.recoverable);
        assert_eq!(err.details["object"], "Nonexistent 1");
    }
}
