//! Geofence evaluation: place-name and radius restrictions on the remote
//! peer's location.
//!
//! Fields are checked in a fixed order (city, region, country, distance) and
//! the first mismatch wins; later fields are not evaluated.

use crate::error::{FwdError, FwdResult};
use crate::geo::{Coordinates, LocationRecord};
use std::fmt;

/// Location policy applied to every connection that is not bypassed.
///
/// A radius check (`max_distance_miles > 0`) and the place-name fields are
/// mutually exclusive; see [`GeoRestriction::validate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoRestriction {
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    /// Radius center. When absent the gateway's own location is used.
    pub center: Option<Coordinates>,
    /// Zero disables the radius check.
    pub max_distance_miles: f64,
}

impl GeoRestriction {
    /// `true` when no field restricts anything.
    pub fn is_empty(&self) -> bool {
        self.city.is_none()
            && self.region.is_none()
            && self.country.is_none()
            && !self.has_distance_check()
    }

    pub fn has_distance_check(&self) -> bool {
        self.max_distance_miles > 0.0
    }

    /// Whether evaluating this restriction needs the gateway's own location.
    pub fn needs_local_location(&self) -> bool {
        self.has_distance_check() && self.center.is_none()
    }

    /// Reject combinations that cannot be evaluated consistently.
    ///
    /// # Errors
    ///
    /// [`FwdError::Config`] when a center point is given without a positive
    /// distance, when the distance is negative or not finite, or when a
    /// distance is combined with city/region/country.
    pub fn validate(&self) -> FwdResult<()> {
        if !self.max_distance_miles.is_finite() || self.max_distance_miles < 0.0 {
            return Err(FwdError::Config(format!(
                "distance must be a non-negative number of miles, got {}",
                self.max_distance_miles
            )));
        }
        if self.center.is_some() && !self.has_distance_check() {
            return Err(FwdError::Config("--distance must be used with --loc".into()));
        }
        if self.has_distance_check()
            && (self.city.is_some() || self.region.is_some() || self.country.is_some())
        {
            return Err(FwdError::Config(
                "--distance can not be used with any of these: city, region, country; \
                 use --loc with --distance instead"
                    .into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for GeoRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut parts = Vec::new();
        if let Some(city) = &self.city {
            parts.push(format!("city={city}"));
        }
        if let Some(region) = &self.region {
            parts.push(format!("region={region}"));
        }
        if let Some(country) = &self.country {
            parts.push(format!("country={country}"));
        }
        if self.has_distance_check() {
            match &self.center {
                Some(center) => parts.push(format!(
                    "within {:.2} miles of {center}",
                    self.max_distance_miles
                )),
                None => parts.push(format!(
                    "within {:.2} miles of this host",
                    self.max_distance_miles
                )),
            }
        }
        f.write_str(&parts.join(" "))
    }
}

/// The restriction field that rejected a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoField {
    City,
    Region,
    Country,
    Distance,
}

impl fmt::Display for GeoField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GeoField::City => "City",
            GeoField::Region => "Region",
            GeoField::Country => "Country",
            GeoField::Distance => "Distance",
        })
    }
}

/// Outcome of a radius check, reported whether or not it passed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceReport {
    pub miles: f64,
    pub max_miles: f64,
}

impl DistanceReport {
    pub fn within_limit(&self) -> bool {
        self.miles <= self.max_miles
    }
}

impl fmt::Display for DistanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "distance: {:.2} miles (limit {:.2})", self.miles, self.max_miles)
    }
}

/// Result of [`evaluate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeofenceVerdict {
    /// First field that did not match, if any.
    pub mismatch: Option<GeoField>,
    /// Present whenever the radius check ran.
    pub distance: Option<DistanceReport>,
}

impl GeofenceVerdict {
    pub fn passed(&self) -> bool {
        self.mismatch.is_none()
    }
}

/// Evaluate `restriction` against the remote peer's location.
///
/// `local` is the gateway's own location and is only consulted for a radius
/// check without an explicit center.
///
/// # Errors
///
/// [`FwdError::Coordinates`] when a radius check is needed but the remote
/// (or local) location has no usable `lat,lon` pair, and
/// [`FwdError::Config`] when the radius has no center and no local location
/// was supplied. These are distinct from a policy mismatch: no decision
/// could be made.
pub fn evaluate(
    remote: &LocationRecord,
    local: Option<&LocationRecord>,
    restriction: &GeoRestriction,
) -> FwdResult<GeofenceVerdict> {
    if restriction.is_empty() {
        return Ok(GeofenceVerdict::default());
    }

    let named = [
        (GeoField::City, &restriction.city, &remote.city),
        (GeoField::Region, &restriction.region, &remote.region),
        (GeoField::Country, &restriction.country, &remote.country),
    ];
    for (field, wanted, actual) in named {
        if let Some(wanted) = wanted {
            if !same_place(wanted, actual) {
                return Ok(GeofenceVerdict {
                    mismatch: Some(field),
                    distance: None,
                });
            }
        }
    }

    if !restriction.has_distance_check() {
        return Ok(GeofenceVerdict::default());
    }

    let center = match (&restriction.center, local) {
        (Some(center), _) => *center,
        (None, Some(local)) => local.coordinates()?,
        (None, None) => {
            return Err(FwdError::Config(
                "radius check without --loc needs this host's location".into(),
            ))
        }
    };
    let remote_point = remote.coordinates()?;

    let report = DistanceReport {
        miles: remote_point.distance_miles(&center),
        max_miles: restriction.max_distance_miles,
    };
    Ok(GeofenceVerdict {
        mismatch: (!report.within_limit()).then_some(GeoField::Distance),
        distance: Some(report),
    })
}

fn same_place(wanted: &str, actual: &str) -> bool {
    wanted.to_lowercase() == actual.to_lowercase()
}
