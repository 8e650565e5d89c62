//! The per-connection admission verdict.

use crate::geofence::{DistanceReport, GeoField};
use crate::prefix::Bypass;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Admitted,
    Denied,
}

/// Why a connection was admitted or denied.
///
/// Every variant has a stable [`Reason::code`] for log filtering and tests;
/// `Display` gives the human-readable form.
#[derive(Debug, Clone, PartialEq)]
pub enum Reason {
    Loopback,
    TrustedPrivate,
    AllowListed,
    DenyListed,
    /// Lookup transport failure, rate limiting, or an undecodable response.
    GeoLookupFailed(String),
    /// The location had no usable coordinates for a radius check.
    UnusableCoordinates(String),
    GeofenceMismatch(GeoField),
    SecondFactorFailed(String),
    /// Every configured check passed and no second factor is configured.
    PolicyPassed,
    SecondFactorApproved,
    SecondFactorCached,
}

impl Reason {
    pub fn code(&self) -> &'static str {
        match self {
            Reason::Loopback => "loopback",
            Reason::TrustedPrivate => "trusted-private",
            Reason::AllowListed => "allow-list",
            Reason::DenyListed => "deny-list",
            Reason::GeoLookupFailed(_) => "geo-lookup-failed",
            Reason::UnusableCoordinates(_) => "coordinates-unusable",
            Reason::GeofenceMismatch(_) => "geofence-mismatch",
            Reason::SecondFactorFailed(_) => "second-factor-failed",
            Reason::PolicyPassed => "policy-passed",
            Reason::SecondFactorApproved => "second-factor-approved",
            Reason::SecondFactorCached => "second-factor-cached",
        }
    }
}

impl From<Bypass> for Reason {
    fn from(bypass: Bypass) -> Self {
        match bypass {
            Bypass::Loopback => Reason::Loopback,
            Bypass::TrustedPrivate => Reason::TrustedPrivate,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Loopback => f.write_str("loopback address, policy skipped"),
            Reason::TrustedPrivate => f.write_str("trusted private address, policy skipped"),
            Reason::AllowListed => f.write_str("explicitly allowed by allow list"),
            Reason::DenyListed => f.write_str("explicitly denied by deny list"),
            Reason::GeoLookupFailed(e) => f.write_str(e),
            Reason::UnusableCoordinates(e) => write!(f, "no usable coordinates: {e}"),
            Reason::GeofenceMismatch(field) => write!(f, "{field} mismatch"),
            Reason::SecondFactorFailed(e) => f.write_str(e),
            Reason::PolicyPassed => f.write_str("all checks passed"),
            Reason::SecondFactorApproved => f.write_str("second factor approved"),
            Reason::SecondFactorCached => f.write_str("second factor approved (cached)"),
        }
    }
}

/// Exactly one of these is produced per accepted socket, before any bytes
/// are relayed.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionDecision {
    pub outcome: Outcome,
    pub reason: Reason,
    pub distance: Option<DistanceReport>,
}

impl AdmissionDecision {
    pub fn admit(reason: impl Into<Reason>) -> Self {
        Self {
            outcome: Outcome::Admitted,
            reason: reason.into(),
            distance: None,
        }
    }

    pub fn deny(reason: impl Into<Reason>) -> Self {
        Self {
            outcome: Outcome::Denied,
            reason: reason.into(),
            distance: None,
        }
    }

    pub fn with_distance(mut self, distance: Option<DistanceReport>) -> Self {
        self.distance = distance;
        self
    }

    pub fn is_admitted(&self) -> bool {
        self.outcome == Outcome::Admitted
    }
}

impl fmt::Display for AdmissionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = match self.outcome {
            Outcome::Admitted => "ESTABLISHED",
            Outcome::Denied => "DENIED",
        };
        write!(f, "{verdict}; {}", self.reason)?;
        if let Some(distance) = &self.distance {
            write!(f, "; {distance}")?;
        }
        Ok(())
    }
}
