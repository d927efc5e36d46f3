// src/backends/ned.rs
// NED: REST object lookup plus cone searches over NEDTAP

use super::tap::{TapService, tap_members};
use super::{Backend, BackendContext, CallArgs, Member, ParamSig, unknown_operation};
use crate::error::{CallError, ErrorCode, ToolError, not_found_error, validation_error};
use crate::http;
use crate::value::{Cell, Column, Output, Table};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

const CLASS_NAME: &str = "Ned";

const QUERY_OBJECT_DOC: &str = "Look up an object by name in the NASA/IPAC Extragalactic Database.

Args:
    object_name: Name of the object, e.g. \"M81\".

Returns:
    Table with the preferred name, position, type and redshift.";

fn number(v: &Value) -> Cell {
    match v.as_f64() {
        Some(f) => Cell::Float(f),
        None => Cell::Masked,
    }
}

/// Decode an ObjectLookup answer into a one-row table.
///
/// `ResultCode` 0 means the name is unknown and 1 that it is ambiguous.
pub fn parse_object_lookup(body: &Value, object_name: &str) -> Result<Table, ToolError> {
    match body.get("ResultCode").and_then(Value::as_i64) {
        Some(0) | None => {
            return Err(not_found_error(
                ErrorCode::ObjectNotFound,
                format!("Object not found in NED: {}", object_name),
                "ned",
            )
            .detail("object", object_name));
        }
        Some(1) => {
            return Err(validation_error(format!("Ambiguous object name: {}", object_name), "ned")
                .suggestion("Use a more specific identifier")
                .detail("object", object_name));
        }
        Some(_) => {}
    }

    let preferred = body.get("Preferred").cloned().unwrap_or(Value::Null);
    let name = preferred
        .get("Name")
        .and_then(Value::as_str)
        .unwrap_or(object_name)
        .to_string();
    let position = &preferred["Position"];

    let mut table = Table::new(vec![
        Column::new("Object Name", "char"),
        Column::new("RA", "double").with_unit("deg"),
        Column::new("DEC", "double").with_unit("deg"),
        Column::new("Type", "char"),
        Column::new("Redshift", "double"),
    ]);
    table.push_row(vec![
        Cell::Text(name),
        number(&position["RA"]),
        number(&position["Dec"]),
        preferred["ObjType"]["Value"].as_str().map(Cell::from).unwrap_or(Cell::Masked),
        number(&preferred["Redshift"]["Value"]),
    ]);
    Ok(table)
}

pub struct Ned {
    tap: TapService,
    lookup_url: String,
    members: Vec<Member>,
}

impl Ned {
    pub fn new(ctx: BackendContext) -> Result<Self, ToolError> {
        let lookup_url = ctx
            .config
            .rest_endpoint("ned")
            .ok_or_else(|| {
                ToolError::new(ErrorCode::ServiceUnavailable, "No object lookup endpoint configured for ned", "ned")
                    .recoverable(false)
                    .suggestion("Set endpoints.rest.ned in config.toml")
            })?
            .to_string();
        let tap = TapService::new("ned", ctx)?;

        let mut members = tap_members();
        members.retain(|m| m.name != "query_object");
        members.push(Member::method(
            "query_object",
            QUERY_OBJECT_DOC,
            vec![ParamSig::required("object_name", "str")],
        ));
        members.push(Member::attribute("URL"));

        Ok(Self {
            tap,
            lookup_url,
            members,
        })
    }

    pub async fn query_object(&self, object_name: &str) -> Result<Table, CallError> {
        let payload = json!({ "name": { "v": object_name } }).to_string();
        debug!(object = %object_name, "NED object lookup");
        let request = self
            .tap
            .context()
            .client
            .post(&self.lookup_url)
            .form(&[("json", payload)]);
        let body = http::send_json("ned", request).await?;
        Ok(parse_object_lookup(&body, object_name)?)
    }
}

#[async_trait]
impl Backend for Ned {
    fn class_name(&self) -> &str {
        CLASS_NAME
    }

    fn members(&self) -> &[Member] {
        &self.members
    }

    async fn invoke(&self, operation: &str, mut args: CallArgs) -> Result<Output, CallError> {
        match operation {
            "query_object" => {
                let name = args.required_string("object_name")?;
                Ok(Output::Table(self.query_object(&name).await?))
            }
            "help" => Ok(Output::Str(self.tap.help_text(&self.members))),
            _ => self
                .tap
                .invoke_tap(operation, args)
                .await?
                .ok_or_else(|| unknown_operation(CLASS_NAME, operation)),
        }
    }
}
