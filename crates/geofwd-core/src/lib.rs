//! geofwd-core: admission policy for the geofwd TCP gateway.
//!
//! Pure, I/O-free building blocks: CIDR allow/deny classification,
//! geofence evaluation with Haversine distance, the second-factor
//! credential and its cache rule, and the admission decision type.

pub mod credential;
pub mod decision;
pub mod error;
pub mod geo;
pub mod geofence;
pub mod prefix;

// Re-export commonly used items at crate root.
pub use credential::SecondFactorCredential;
pub use decision::{AdmissionDecision, Outcome, Reason};
pub use error::{FwdError, FwdResult};
pub use geo::{haversine_miles, Coordinates, LocationRecord};
pub use geofence::{DistanceReport, GeoField, GeoRestriction, GeofenceVerdict};
pub use prefix::{bypass_for, Bypass, PrefixClass, PrefixFilter, PrefixSet};
