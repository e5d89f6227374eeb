//! Spatial reference systems and projections between them.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::TypesError;
use crate::Point2d;

/// Conversion between a geographic (longitude, latitude in degrees) and a projected coordinate system.
pub trait Projection: Send + Sync {
    /// Projects geographic coordinates. Returns `None` if the point is outside the projection domain.
    fn project(&self, input: &Point2d) -> Option<Point2d>;
    /// Inverse of [`Projection::project`].
    fn unproject(&self, input: &Point2d) -> Option<Point2d>;
}

/// Reference ellipsoid parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Datum {
    semimajor: f64,
    inv_flattening: f64,
}

impl Datum {
    /// WGS84 ellipsoid.
    pub const WGS84: Self = Datum {
        semimajor: 6_378_137.0,
        inv_flattening: 298.257223563,
    };

    /// Semimajor axis in meters.
    pub fn semimajor(&self) -> f64 {
        self.semimajor
    }

    /// Inverse flattening.
    pub fn inv_flattening(&self) -> f64 {
        self.inv_flattening
    }
}

impl Default for Datum {
    fn default() -> Self {
        Self::WGS84
    }
}

/// Latitude at which the web mercator square world ends.
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_779_806_59;

/// Spherical (web) mercator projection.
///
/// Latitudes beyond [`MAX_MERCATOR_LATITUDE`] are clamped to it, so every finite geographic point can be
/// projected.
#[derive(Debug, Copy, Clone, Default)]
pub struct WebMercator {
    datum: Datum,
}

impl WebMercator {
    /// Creates a new projection with the given datum.
    pub fn new(datum: Datum) -> Self {
        Self { datum }
    }

    /// Half of the projected world width in meters.
    pub fn max_extent(&self) -> f64 {
        self.datum.semimajor() * std::f64::consts::PI
    }
}

impl Projection for WebMercator {
    fn project(&self, input: &Point2d) -> Option<Point2d> {
        let lat = input
            .y
            .clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE)
            .to_radians();
        let x = self.datum.semimajor() * input.x.to_radians();
        let y = self.datum.semimajor() * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln();

        if x.is_finite() && y.is_finite() {
            Some(Point2d::new(x, y))
        } else {
            None
        }
    }

    fn unproject(&self, input: &Point2d) -> Option<Point2d> {
        if !input.x.is_finite() || !input.y.is_finite() {
            return None;
        }

        let lat = 2.0 * (input.y / self.datum.semimajor()).exp().atan() - std::f64::consts::FRAC_PI_2;
        let lon = input.x / self.datum.semimajor();

        Some(Point2d::new(lon.to_degrees(), lat.to_degrees()))
    }
}

/// Spatial reference system of a map or a layer.
///
/// Two systems are known to the renderer: geographic WGS84 and web mercator. Any other definition
/// is kept as is and can only be used together with an identical definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub enum Srs {
    /// Longitude/latitude in degrees (EPSG:4326).
    Wgs84,
    /// Spherical mercator in meters (EPSG:3857).
    WebMercator,
    /// Unrecognized definition.
    Other(String),
}

impl Srs {
    /// Returns true if the coordinates of the system are angular (degrees).
    pub fn is_geographic(&self) -> bool {
        match self {
            Srs::Wgs84 => true,
            Srs::WebMercator => false,
            Srs::Other(definition) => {
                definition.contains("+proj=longlat") || definition.contains("+proj=latlong")
            }
        }
    }
}

impl FromStr for Srs {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let definition = s.trim();
        if definition.is_empty() {
            return Err(TypesError::UnknownSrs(s.to_string()));
        }

        let normalized = definition.to_ascii_lowercase();
        let srs = match normalized.as_str() {
            "epsg:4326" | "wgs84" => Srs::Wgs84,
            "epsg:3857" | "epsg:900913" | "epsg:3785" | "epsg:102100" => Srs::WebMercator,
            proj if proj.starts_with("+proj=longlat") && proj.contains("+datum=wgs84") => Srs::Wgs84,
            proj if proj.starts_with("+proj=merc")
                && proj.contains("+a=6378137")
                && proj.contains("+b=6378137") =>
            {
                Srs::WebMercator
            }
            _ => Srs::Other(definition.to_string()),
        };

        Ok(srs)
    }
}

impl TryFrom<String> for Srs {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Srs> for String {
    fn from(value: Srs) -> Self {
        value.to_string()
    }
}

impl Display for Srs {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Srs::Wgs84 => write!(f, "epsg:4326"),
            Srs::WebMercator => write!(f, "epsg:3857"),
            Srs::Other(definition) => write!(f, "{definition}"),
        }
    }
}
