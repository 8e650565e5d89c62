//! The admission pipeline: one [`AdmissionDecision`] per accepted socket.
//!
//! Checks run in a fixed order and the first terminal result wins:
//!
//! ```text
//! loopback / trusted private  -> Admitted
//! deny list                   -> Denied
//! allow list                  -> Admitted
//! geofence                    -> Denied on mismatch or lookup failure
//! second factor               -> Denied on failure
//! otherwise                   -> Admitted
//! ```
//!
//! The pipeline owns the second-factor credential and takes `&mut self`, so
//! decisions are made one at a time by whoever holds it (the acceptor).

use crate::auth::{GateOutcome, PushProvider, SecondFactorGate};
use crate::geoip::GeoLocator;
use geofwd_core::geofence;
use geofwd_core::{
    bypass_for, AdmissionDecision, GeoRestriction, LocationRecord, PrefixClass,
    PrefixFilter, Reason, SecondFactorCredential,
};
use std::net::IpAddr;
use tracing::{debug, info};

/// Everything the pipeline needs to decide, resolved at startup.
#[derive(Debug, Clone, Default)]
pub struct AdmissionPolicy {
    pub filter: PrefixFilter,
    pub trust_private: bool,
    pub restriction: GeoRestriction,
    /// This host's own location; only needed for a radius check without an
    /// explicit center.
    pub local_location: Option<LocationRecord>,
    pub credential: SecondFactorCredential,
}

pub struct AdmissionPipeline<G, P> {
    policy: AdmissionPolicy,
    locator: G,
    gate: SecondFactorGate<P>,
}

impl<G: GeoLocator, P: PushProvider> AdmissionPipeline<G, P> {
    pub fn new(policy: AdmissionPolicy, locator: G, provider: P) -> Self {
        Self {
            policy,
            locator,
            gate: SecondFactorGate::new(provider),
        }
    }

    #[cfg(test)]
    pub fn credential(&self) -> &SecondFactorCredential {
        &self.policy.credential
    }

    /// Decide on a connection from `peer` using the current wall clock.
    pub async fn decide(&mut self, peer: IpAddr) -> AdmissionDecision {
        self.decide_at(peer, chrono::Utc::now().timestamp()).await
    }

    /// Decide on a connection from `peer` as of unix time `now`.
    pub async fn decide_at(&mut self, peer: IpAddr, now: i64) -> AdmissionDecision {
        let peer = peer.to_canonical();

        if let Some(bypass) = bypass_for(peer, self.policy.trust_private) {
            return AdmissionDecision::admit(bypass);
        }

        match self.policy.filter.classify(peer) {
            PrefixClass::Denied => return AdmissionDecision::deny(Reason::DenyListed),
            PrefixClass::AllowedBypass => return AdmissionDecision::admit(Reason::AllowListed),
            PrefixClass::NoMatch => {}
        }

        let mut distance = None;
        if !self.policy.restriction.is_empty() {
            let remote = match self.locator.locate(Some(peer)).await {
                Ok(remote) => remote,
                Err(e) => return AdmissionDecision::deny(Reason::GeoLookupFailed(e.to_string())),
            };
            debug!(location = %remote, "peer located");

            let verdict = match geofence::evaluate(
                &remote,
                self.policy.local_location.as_ref(),
                &self.policy.restriction,
            ) {
                Ok(verdict) => verdict,
                Err(e) => {
                    return AdmissionDecision::deny(Reason::UnusableCoordinates(e.to_string()))
                }
            };
            if let Some(field) = verdict.mismatch {
                return AdmissionDecision::deny(Reason::GeofenceMismatch(field))
                    .with_distance(verdict.distance);
            }
            distance = verdict.distance;
        }

        let outcome = match self
            .gate
            .authenticate(&mut self.policy.credential, peer, now)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                return AdmissionDecision::deny(Reason::SecondFactorFailed(e.to_string()))
                    .with_distance(distance)
            }
        };

        let reason = match outcome {
            GateOutcome::NotConfigured => Reason::PolicyPassed,
            GateOutcome::Cached => {
                info!(identity = %self.policy.credential.identity, cached = true, "second factor");
                Reason::SecondFactorCached
            }
            GateOutcome::Approved => Reason::SecondFactorApproved,
        };
        AdmissionDecision::admit(reason).with_distance(distance)
    }
}
