// src/coords.rs
// Sky positions, angular quantities, and coordinate-string parsing

use crate::error::{ErrorCode, ToolError};
use regex::Regex;
use serde_json::{Value, json};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// ICRS -> Galactic rotation (Hipparcos definition of the galactic pole)
const ICRS_TO_GALACTIC: [[f64; 3]; 3] = [
    [-0.054_875_560_416_215_4, -0.873_437_090_234_885_0, -0.483_835_015_548_713_2],
    [0.494_109_427_875_583_7, -0.444_829_629_960_011_2, 0.746_982_244_497_218_9],
    [-0.867_666_149_019_004_7, -0.198_076_373_431_201_5, 0.455_983_776_175_066_9],
];

/// Reference frame of a sky position.
///
/// FK5 (J2000) is treated as coincident with ICRS; the two differ by well
/// under the precision any of the wrapped services report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Frame {
    #[default]
    Icrs,
    Fk5,
    Galactic,
}

impl Frame {
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Icrs => "icrs",
            Frame::Fk5 => "fk5",
            Frame::Galactic => "galactic",
        }
    }
}

impl FromStr for Frame {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "icrs" => Ok(Frame::Icrs),
            "fk5" | "j2000" => Ok(Frame::Fk5),
            "galactic" | "gal" => Ok(Frame::Galactic),
            other => Err(format!("unsupported frame: {}", other)),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A position on the celestial sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyCoord {
    lon_deg: f64,
    lat_deg: f64,
    frame: Frame,
}

impl SkyCoord {
    /// Build a position, wrapping longitude into [0, 360) and rejecting
    /// latitudes outside [-90, 90].
    pub fn new(lon_deg: f64, lat_deg: f64, frame: Frame) -> Result<Self, ToolError> {
        if !lon_deg.is_finite() || !lat_deg.is_finite() {
            return Err(invalid_coordinates(format!(
                "Coordinates must be finite, got ({}, {})",
                lon_deg, lat_deg
            )));
        }
        if !(-90.0..=90.0).contains(&lat_deg) {
            return Err(invalid_coordinates(format!(
                "Dec must be between -90 and 90 degrees, got {}",
                lat_deg
            ))
            .detail("dec", lat_deg));
        }
        Ok(Self {
            lon_deg: lon_deg.rem_euclid(360.0),
            lat_deg,
            frame,
        })
    }

    pub fn icrs(ra_deg: f64, dec_deg: f64) -> Result<Self, ToolError> {
        Self::new(ra_deg, dec_deg, Frame::Icrs)
    }

    /// Longitude in degrees (right ascension for equatorial frames)
    pub fn ra_deg(&self) -> f64 {
        self.lon_deg
    }

    /// Latitude in degrees (declination for equatorial frames)
    pub fn dec_deg(&self) -> f64 {
        self.lat_deg
    }

    pub fn frame(&self) -> Frame {
        self.frame
    }

    /// Parse a decimal-degree or sexagesimal coordinate string.
    ///
    /// Accepted forms: `"10.68 41.27"`, `"10.68, 41.27"`,
    /// `"00h42m44.3s +41d16m09s"`, `"00:42:44.3 +41:16:09"`,
    /// `"00 42 44.3 +41 16 09"`. Sexagesimal right ascension is in hours.
    pub fn parse(input: &str, frame: Frame) -> Result<Self, ToolError> {
        if let Some(caps) = DECIMAL_RE.captures(input) {
            let lon = parse_f64(&caps[1])?;
            let lat = parse_f64(&caps[2])?;
            return Self::new(lon, lat, frame);
        }

        if let Some(caps) = SEXAGESIMAL_RE.captures(input) {
            let hours = parse_f64(&caps[1])?;
            let minutes = parse_f64(&caps[2])?;
            let seconds = parse_f64(&caps[3])?;
            if hours >= 24.0 || minutes >= 60.0 || seconds >= 60.0 {
                return Err(invalid_coordinates(format!("Right ascension out of range: {}", input)));
            }
            let lon = 15.0 * (hours + minutes / 60.0 + seconds / 3600.0);

            let negative = &caps[4] == "-";
            let degrees = parse_f64(&caps[5])?;
            let arcmin = parse_f64(&caps[6])?;
            let arcsec = parse_f64(&caps[7])?;
            if arcmin >= 60.0 || arcsec >= 60.0 {
                return Err(invalid_coordinates(format!("Declination out of range: {}", input)));
            }
            let magnitude = degrees + arcmin / 60.0 + arcsec / 3600.0;
            let lat = if negative { -magnitude } else { magnitude };
            return Self::new(lon, lat, frame);
        }

        Err(invalid_coordinates(format!("Cannot parse coordinates: {}", input))
            .suggestion("Provide RA/Dec in degrees (\"10.68 41.27\") or sexagesimal (\"00h42m44.3s +41d16m09s\")"))
    }

    /// Express this position in ICRS
    pub fn to_icrs(&self) -> SkyCoord {
        match self.frame {
            Frame::Icrs => *self,
            Frame::Fk5 => SkyCoord { frame: Frame::Icrs, ..*self },
            Frame::Galactic => {
                let v = unit_vector(self.lon_deg, self.lat_deg);
                let (lon, lat) = from_unit_vector(mat_t_mul(&ICRS_TO_GALACTIC, v));
                SkyCoord { lon_deg: lon, lat_deg: lat, frame: Frame::Icrs }
            }
        }
    }

    /// Express this position in galactic coordinates
    pub fn to_galactic(&self) -> SkyCoord {
        if self.frame == Frame::Galactic {
            return *self;
        }
        let v = unit_vector(self.lon_deg, self.lat_deg);
        let (lon, lat) = from_unit_vector(mat_mul(&ICRS_TO_GALACTIC, v));
        SkyCoord { lon_deg: lon, lat_deg: lat, frame: Frame::Galactic }
    }

    /// Angular separation in degrees (Vincenty formula, stable at all distances)
    pub fn separation(&self, other: &SkyCoord) -> f64 {
        let a = self.to_icrs();
        let b = other.to_icrs();
        let (l1, b1) = (a.lon_deg.to_radians(), a.lat_deg.to_radians());
        let (l2, b2) = (b.lon_deg.to_radians(), b.lat_deg.to_radians());
        let dl = l2 - l1;

        let num1 = b2.cos() * dl.sin();
        let num2 = b1.cos() * b2.sin() - b1.sin() * b2.cos() * dl.cos();
        let den = b1.sin() * b2.sin() + b1.cos() * b2.cos() * dl.cos();
        num1.hypot(num2).atan2(den).to_degrees()
    }

    /// Right ascension as `HH:MM:SS.ss`
    pub fn ra_hms(&self) -> String {
        let total = self.lon_deg / 15.0 * 3600.0;
        let total = (total * 100.0).round() / 100.0;
        let hours = (total / 3600.0).floor();
        let minutes = ((total - hours * 3600.0) / 60.0).floor();
        let seconds = total - hours * 3600.0 - minutes * 60.0;
        format!("{:02}:{:02}:{:05.2}", hours as u32 % 24, minutes as u32, seconds)
    }

    /// Declination as `+DD:MM:SS.s`
    pub fn dec_dms(&self) -> String {
        let sign = if self.lat_deg < 0.0 { '-' } else { '+' };
        let total = (self.lat_deg.abs() * 3600.0 * 10.0).round() / 10.0;
        let degrees = (total / 3600.0).floor();
        let minutes = ((total - degrees * 3600.0) / 60.0).floor();
        let seconds = total - degrees * 3600.0 - minutes * 60.0;
        format!("{}{:02}:{:02}:{:04.1}", sign, degrees as u32, minutes as u32, seconds)
    }
}

/// Full description of a position: degrees, sexagesimal, galactic
pub fn format_coordinates(coord: &SkyCoord) -> Value {
    let icrs = coord.to_icrs();
    let galactic = coord.to_galactic();
    json!({
        "ra_deg": icrs.ra_deg(),
        "dec_deg": icrs.dec_deg(),
        "ra_hms": icrs.ra_hms(),
        "dec_dms": icrs.dec_dms(),
        "galactic_l": galactic.ra_deg(),
        "galactic_b": galactic.dec_deg(),
        "frame": coord.frame().name(),
    })
}

fn invalid_coordinates(message: String) -> ToolError {
    ToolError::new(ErrorCode::InvalidCoordinates, message, "coordinates")
        .recoverable(false)
        .suggestion("Provide RA in degrees (0-360) and Dec in degrees (-90 to 90)")
}

fn parse_f64(s: &str) -> Result<f64, ToolError> {
    s.parse::<f64>()
        .map_err(|e| invalid_coordinates(format!("Invalid number '{}': {}", s, e)))
}

static DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^\s*([+-]?\d+(?:\.\d*)?)\s*(?:,\s*|\s+)([+-]?\d+(?:\.\d*)?)\s*$")
        .expect("decimal coordinate regex")
});

static SEXAGESIMAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(
        r#"^\s*(\d{1,2})(?:h|:|\s+)\s*(\d{1,2})(?:m|:|\s+)\s*(\d{1,2}(?:\.\d*)?)s?\s*,?\s*([+-]?)\s*(\d{1,2})(?:d|°|:|\s+)\s*(\d{1,2})(?:m|'|:|\s+)\s*(\d{1,2}(?:\.\d*)?)(?:s|")?\s*$"#,
    )
    .expect("sexagesimal coordinate regex")
});

fn unit_vector(lon_deg: f64, lat_deg: f64) -> [f64; 3] {
    let (lon, lat) = (lon_deg.to_radians(), lat_deg.to_radians());
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

fn from_unit_vector(v: [f64; 3]) -> (f64, f64) {
    let lon = v[1].atan2(v[0]).to_degrees().rem_euclid(360.0);
    let lat = v[2].clamp(-1.0, 1.0).asin().to_degrees();
    (lon, lat)
}

fn mat_mul(m: &[[f64; 3]; 3], v: [f64; 3]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (i, row) in m.iter().enumerate() {
        out[i] = row[0] * v[0] + row[1] * v[1] + row[2] * v[2];
    }
    out
}

fn mat_t_mul(m: &[[f64; 3]; 3], v: [f64; 3]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = m[0][i] * v[0] + m[1][i] * v[1] + m[2][i] * v[2];
    }
    out
}

// ============================================================================
// Angular quantities
// ============================================================================

/// Angular units understood by the coercion layer and backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleUnit {
    Deg,
    Arcmin,
    Arcsec,
    Mas,
    Rad,
    Hourangle,
}

impl AngleUnit {
    /// Look up a unit by any of its common spellings
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "deg" | "degree" | "degrees" | "d" => Some(AngleUnit::Deg),
            "arcmin" | "arcminute" | "arcminutes" | "amin" => Some(AngleUnit::Arcmin),
            "arcsec" | "arcsecond" | "arcseconds" | "asec" => Some(AngleUnit::Arcsec),
            "mas" | "milliarcsec" | "milliarcsecond" => Some(AngleUnit::Mas),
            "rad" | "radian" | "radians" => Some(AngleUnit::Rad),
            "hourangle" | "hour" | "h" => Some(AngleUnit::Hourangle),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            AngleUnit::Deg => "deg",
            AngleUnit::Arcmin => "arcmin",
            AngleUnit::Arcsec => "arcsec",
            AngleUnit::Mas => "mas",
            AngleUnit::Rad => "rad",
            AngleUnit::Hourangle => "hourangle",
        }
    }

    fn degrees_per_unit(&self) -> f64 {
        match self {
            AngleUnit::Deg => 1.0,
            AngleUnit::Arcmin => 1.0 / 60.0,
            AngleUnit::Arcsec => 1.0 / 3600.0,
            AngleUnit::Mas => 1.0 / 3_600_000.0,
            AngleUnit::Rad => 180.0 / PI,
            AngleUnit::Hourangle => 15.0,
        }
    }
}

impl fmt::Display for AngleUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A numeric value paired with an angular unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: AngleUnit,
}

impl Quantity {
    pub fn new(value: f64, unit: AngleUnit) -> Self {
        Self { value, unit }
    }

    pub fn arcmin(value: f64) -> Self {
        Self::new(value, AngleUnit::Arcmin)
    }

    pub fn degrees(value: f64) -> Self {
        Self::new(value, AngleUnit::Deg)
    }

    pub fn to_degrees(&self) -> f64 {
        self.value * self.unit.degrees_per_unit()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}
