// src/backends/mast.rs
// MAST observation search over the CAOM ObsCore TAP service

use super::tap::{TapService, cone_adql};
use super::{Backend, BackendContext, CallArgs, Member, ParamSig, adql_quote, unknown_operation};
use crate::coords::{AngleUnit, Quantity, SkyCoord};
use crate::error::{CallError, ToolError};
use crate::value::{Output, Table};
use async_trait::async_trait;
use serde_json::Value;

const CLASS_NAME: &str = "Observations";
const OBSCORE: &str = "ivoa.obscore";

/// Searchable ObsCore columns accepted by `query_criteria`
const CRITERIA: &[&str] = &[
    "obs_collection",
    "instrument_name",
    "target_name",
    "dataproduct_type",
    "proposal_id",
    "filters",
    "obs_id",
];

const PRODUCT_COLUMNS: &str = "obs_id, obs_collection, dataproduct_type, access_url, access_format, access_estsize";

const QUERY_REGION_DOC: &str = "Find observations whose footprint center lies within a cone.

Args:
    coordinates: Cone center.
    radius: Cone radius (default 0.2 deg).";

const QUERY_OBJECT_DOC: &str = "Find observations around a named target.

Args:
    objectname: Target name, resolved through Sesame.
    radius: Cone radius (default 0.2 deg).";

const QUERY_CRITERIA_DOC: &str = "Find observations matching column criteria.

At least one criterion is required. Each accepts a value or a list of values.

Args:
    obs_collection: Mission, e.g. \"HST\" or \"JWST\".
    instrument_name: Instrument, e.g. \"NIRCAM/IMAGE\".
    target_name: Target name as recorded by the observer.
    dataproduct_type: \"image\", \"spectrum\", \"cube\", ...
    proposal_id: Proposal identifier.
    filters: Filter names.
    obs_id: Observation identifiers.
    coordinates: Optional cone center.
    radius: Cone radius when coordinates are given (default 0.2 deg).";

const GET_PRODUCT_LIST_DOC: &str = "List data products for one or more observations.

Args:
    obs_id: Observation identifier or list of identifiers.";

fn default_radius() -> Quantity {
    Quantity::new(0.2, AngleUnit::Deg)
}

/// `column = 'v'` or `column IN ('a', 'b')`
fn criterion(column: &str, values: &[String]) -> String {
    match values {
        [single] => format!("{} = {}", column, adql_quote(single)),
        many => format!(
            "{} IN ({})",
            column,
            many.iter().map(|v| adql_quote(v)).collect::<Vec<_>>().join(", ")
        ),
    }
}

/// ObsCore query for a set of column criteria and an optional cone
pub fn criteria_adql(
    criteria: &[(&str, Vec<String>)],
    cone: Option<(&SkyCoord, &Quantity)>,
    top: usize,
) -> Result<String, CallError> {
    let mut clauses: Vec<String> = criteria
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(column, values)| criterion(column, values))
        .collect();
    if let Some((center, radius)) = cone {
        let icrs = center.to_icrs();
        clauses.push(format!(
            "1=CONTAINS(POINT('ICRS', s_ra, s_dec), CIRCLE('ICRS', {}, {}, {}))",
            icrs.ra_deg(),
            icrs.dec_deg(),
            radius.to_degrees()
        ));
    }
    if clauses.is_empty() {
        return Err(CallError::invalid("Please provide at least one criterion"));
    }
    Ok(format!(
        "SELECT TOP {} * FROM {} WHERE {}",
        top,
        OBSCORE,
        clauses.join(" AND ")
    ))
}

pub struct Observations {
    tap: TapService,
    members: Vec<Member>,
}

impl Observations {
    pub fn new(ctx: BackendContext) -> Result<Self, ToolError> {
        Ok(Self {
            tap: TapService::new("mast", ctx)?,
            members: members(),
        })
    }

    fn max_rows(&self) -> usize {
        self.tap.context().config.defaults.max_rows
    }

    pub async fn query_region(&self, center: &SkyCoord, radius: Option<Quantity>) -> Result<Table, CallError> {
        let radius = radius.unwrap_or_else(default_radius);
        let adql = cone_adql(OBSCORE, &[], self.tap.profile(), center, &radius, self.max_rows());
        self.tap.query_tap(&adql, None).await
    }

    pub async fn query_object(&self, objectname: &str, radius: Option<Quantity>) -> Result<Table, CallError> {
        let center = self.tap.context().resolver.resolve(objectname).await?;
        self.query_region(&center, radius).await
    }

    pub async fn query_criteria(
        &self,
        criteria: &[(&str, Vec<String>)],
        cone: Option<(SkyCoord, Quantity)>,
    ) -> Result<Table, CallError> {
        let adql = criteria_adql(criteria, cone.as_ref().map(|(c, r)| (c, r)), self.max_rows())?;
        self.tap.query_tap(&adql, None).await
    }

    pub async fn get_product_list(&self, obs_ids: &[String]) -> Result<Table, CallError> {
        if obs_ids.is_empty() {
            return Err(CallError::invalid("obs_id must name at least one observation"));
        }
        let adql = format!(
            "SELECT {} FROM {} WHERE {}",
            PRODUCT_COLUMNS,
            OBSCORE,
            criterion("obs_id", obs_ids)
        );
        self.tap.query_tap(&adql, None).await
    }
}

fn members() -> Vec<Member> {
    let mut criteria_params: Vec<ParamSig> = CRITERIA
        .iter()
        .map(|name| ParamSig::optional(*name, "str", Value::Null))
        .collect();
    criteria_params.push(ParamSig::optional("coordinates", "SkyCoord", Value::Null));
    criteria_params.push(ParamSig::optional("radius", "Quantity", "0.2 deg"));

    vec![
        Member::method("__init__", "", vec![]),
        Member::method("_portal_api_connection", "", vec![]),
        Member::attribute("PAGESIZE"),
        Member::method(
            "query_region",
            QUERY_REGION_DOC,
            vec![
                ParamSig::required("coordinates", "SkyCoord"),
                ParamSig::optional("radius", "Quantity", "0.2 deg"),
            ],
        ),
        Member::method(
            "query_object",
            QUERY_OBJECT_DOC,
            vec![
                ParamSig::required("objectname", "str"),
                ParamSig::optional("radius", "Quantity", "0.2 deg"),
            ],
        ),
        Member::method("query_criteria", QUERY_CRITERIA_DOC, criteria_params),
        Member::method(
            "get_product_list",
            GET_PRODUCT_LIST_DOC,
            vec![ParamSig::required("obs_id", "str")],
        ),
    ]
}

#[async_trait]
impl Backend for Observations {
    fn class_name(&self) -> &str {
        CLASS_NAME
    }

    fn members(&self) -> &[Member] {
        &self.members
    }

    async fn invoke(&self, operation: &str, mut args: CallArgs) -> Result<Output, CallError> {
        let table = match operation {
            "query_region" => {
                let center = args.required_coord("coordinates")?;
                let radius = args.quantity("radius")?;
                self.query_region(&center, radius).await?
            }
            "query_object" => {
                let name = args.required_string("objectname")?;
                let radius = args.quantity("radius")?;
                self.query_object(&name, radius).await?
            }
            "query_criteria" => {
                let mut criteria = Vec::new();
                for column in CRITERIA {
                    if let Some(values) = args.strings(column)? {
                        criteria.push((*column, values));
                    }
                }
                let cone = match args.coord("coordinates")? {
                    Some(center) => Some((center, args.quantity("radius")?.unwrap_or_else(default_radius))),
                    None => None,
                };
                self.query_criteria(&criteria, cone).await?
            }
            "get_product_list" => {
                let ids = args.strings("obs_id")?.unwrap_or_default();
                self.get_product_list(&ids).await?
            }
            _ => return Err(unknown_operation(CLASS_NAME, operation)),
        };
        Ok(Output::Table(table))
    }
}
