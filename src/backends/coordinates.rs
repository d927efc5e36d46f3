// src/backends/coordinates.rs
// Local sky-coordinate helpers exposed as a service (no network)

use super::{Backend, CallArgs, Member, ParamSig, unknown_operation};
use crate::coords::{Frame, Quantity, SkyCoord, format_coordinates};
use crate::error::CallError;
use crate::resolver::NameResolver;
use crate::value::Output;
use async_trait::async_trait;
use std::sync::Arc;

const CLASS_NAME: &str = "SkyCoord";

const FROM_NAME_DOC: &str = "Resolve an object name to ICRS coordinates.

Parameters
----------
name: Object name, e.g. \"M31\" or \"Betelgeuse\".";

const SEPARATION_DOC: &str = "Angular separation between two positions, in degrees.

Parameters
----------
coord1: First position.
coord2: Second position.";

const TO_GALACTIC_DOC: &str = "Convert a position to galactic coordinates.

Parameters
----------
coordinates: Position to convert.";

const PARSE_DOC: &str = "Parse a coordinate string and describe it in several notations.

Parameters
----------
text: Decimal degrees or sexagesimal, e.g. \"00h42m44.3s +41d16m09s\".
frame: Reference frame of the input (icrs, fk5, galactic).";

pub struct Coordinates {
    resolver: Arc<dyn NameResolver>,
    members: Vec<Member>,
}

impl Coordinates {
    pub fn new(resolver: Arc<dyn NameResolver>) -> Self {
        let members = vec![
            Member::method("__init__", "", vec![]),
            Member::method("__repr__", "", vec![]),
            Member::method("_sky_coord_frame", "", vec![]),
            Member::attribute("frame"),
            Member::method("to_string", "String form of this position.", vec![]),
            Member::class_method("from_name", FROM_NAME_DOC, vec![ParamSig::required("name", "str")]),
            Member::static_method(
                "separation",
                SEPARATION_DOC,
                vec![
                    ParamSig::required("coord1", "SkyCoord"),
                    ParamSig::required("coord2", "SkyCoord"),
                ],
            ),
            Member::static_method(
                "to_galactic",
                TO_GALACTIC_DOC,
                vec![ParamSig::required("coordinates", "SkyCoord")],
            ),
            Member::static_method(
                "parse",
                PARSE_DOC,
                vec![
                    ParamSig::required("text", "str"),
                    ParamSig::optional("frame", "str", "icrs"),
                ],
            ),
        ];
        Self { resolver, members }
    }
}

#[async_trait]
impl Backend for Coordinates {
    fn class_name(&self) -> &str {
        CLASS_NAME
    }

    fn members(&self) -> &[Member] {
        &self.members
    }

    async fn invoke(&self, operation: &str, mut args: CallArgs) -> Result<Output, CallError> {
        match operation {
            "from_name" => {
                let name = args.required_string("name")?;
                Ok(Output::Coord(self.resolver.resolve(&name).await?))
            }
            "separation" => {
                let a = args.required_coord("coord1")?;
                let b = args.required_coord("coord2")?;
                Ok(Output::Quantity(Quantity::degrees(a.separation(&b))))
            }
            "to_galactic" => {
                let c = args.required_coord("coordinates")?;
                Ok(Output::Coord(c.to_galactic()))
            }
            "parse" => {
                let text = args.required_string("text")?;
                let frame = match args.string("frame")? {
                    Some(f) => f.parse::<Frame>().map_err(CallError::invalid)?,
                    None => Frame::Icrs,
                };
                let coord = SkyCoord::parse(&text, frame)?;
                Ok(Output::Json(format_coordinates(&coord)))
            }
            _ => Err(unknown_operation(CLASS_NAME, operation)),
        }
    }
}
