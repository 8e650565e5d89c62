//! Coordinates, great-circle distance, and the location record returned by
//! the IP lookup service.

use crate::error::{FwdError, FwdResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Earth radius used for all distance calculations, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_378_100.0;

/// Meters in one statute mile.
pub const METERS_PER_MILE: f64 = 1609.344;

/// Body fragment the lookup service returns instead of JSON once the
/// caller's quota is spent.
pub const RATE_LIMIT_MARKER: &str = "Rate limit exceeded";

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in miles.
    pub fn distance_miles(&self, other: &Coordinates) -> f64 {
        haversine_miles(*self, *other)
    }
}

/// Parses the `"LATITUDE,LONGITUDE"` form used both by the lookup service's
/// `loc` field and by the `--loc` flag, e.g. `"36.0525,-79.107"`.
impl FromStr for Coordinates {
    type Err = FwdError;

    fn from_str(s: &str) -> FwdResult<Self> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| FwdError::Coordinates(format!("expected LATITUDE,LONGITUDE, got {s:?}")))?;

        let latitude = parse_degrees(lat)
            .ok_or_else(|| FwdError::Coordinates(format!("invalid latitude in {s:?}")))?;
        let longitude = parse_degrees(lon)
            .ok_or_else(|| FwdError::Coordinates(format!("invalid longitude in {s:?}")))?;

        Ok(Self::new(latitude, longitude))
    }
}

fn parse_degrees(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// haversin(θ)
fn hsin(theta: f64) -> f64 {
    (theta / 2.0).sin().powi(2)
}

/// Distance in miles between two points using the Haversine great-circle
/// formula on a sphere of radius [`EARTH_RADIUS_METERS`].
pub fn haversine_miles(a: Coordinates, b: Coordinates) -> f64 {
    let la1 = a.latitude.to_radians();
    let lo1 = a.longitude.to_radians();
    let la2 = b.latitude.to_radians();
    let lo2 = b.longitude.to_radians();

    let h = hsin(la2 - la1) + la1.cos() * la2.cos() * hsin(lo2 - lo1);

    // Rounding can push h a hair past 1 for antipodal points.
    let meters = 2.0 * EARTH_RADIUS_METERS * h.clamp(0.0, 1.0).sqrt().asin();
    meters / METERS_PER_MILE
}

/// Location record as returned by `https://ipinfo.io/<ip>/json`.
///
/// Fields missing from the response default to empty strings. A fresh
/// record is fetched for every connection; nothing is cached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationRecord {
    pub ip: String,
    pub hostname: String,
    pub city: String,
    pub region: String,
    pub country: String,
    /// `"lat,lon"`
    pub loc: String,
    pub postal: String,
    pub org: String,
}

impl LocationRecord {
    /// Decode a lookup-service response body.
    ///
    /// # Errors
    ///
    /// [`FwdError::RateLimited`] when the body carries the rate-limit
    /// message instead of JSON, [`FwdError::GeoLookup`] when it is not a
    /// JSON object.
    pub fn from_json(body: &str) -> FwdResult<Self> {
        if body.contains(RATE_LIMIT_MARKER) {
            return Err(FwdError::RateLimited(body.trim().to_string()));
        }
        serde_json::from_str(body)
            .map_err(|e| FwdError::GeoLookup(format!("malformed lookup response: {e}")))
    }

    /// Parse the `loc` field.
    pub fn coordinates(&self) -> FwdResult<Coordinates> {
        self.loc.parse()
    }
}

impl fmt::Display for LocationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}, {}) [{}]",
            self.ip, self.city, self.region, self.country, self.loc
        )
    }
}
