//! The second-factor gate: skip, serve from cache, or run a live push.

use super::provider::{PushProvider, STAT_OK};
use chrono::DateTime;
use geofwd_core::{FwdError, FwdResult, SecondFactorCredential};
use std::net::IpAddr;
use tracing::info;

/// How an admitted [`SecondFactorGate::authenticate`] call was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// No identity configured; nothing was checked.
    NotConfigured,
    /// A recent success from the same address was reused.
    Cached,
    /// The provider approved a live push.
    Approved,
}

/// Runs the second-factor check against a [`PushProvider`].
///
/// The gate itself is stateless; the cache lives in the
/// [`SecondFactorCredential`] passed by its single owner, which is updated
/// in place after every live approval.
pub struct SecondFactorGate<P> {
    provider: P,
}

impl<P: PushProvider> SecondFactorGate<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Authenticate a connection from `source` at unix time `now`.
    ///
    /// # Errors
    ///
    /// Any provider transport error, a probe whose `stat` is not `OK`, or a
    /// push that is not `OK`/`allow`. Every error means deny.
    pub async fn authenticate(
        &self,
        credential: &mut SecondFactorCredential,
        source: IpAddr,
        now: i64,
    ) -> FwdResult<GateOutcome> {
        if !credential.is_configured() {
            return Ok(GateOutcome::NotConfigured);
        }

        info!(
            identity = %credential.identity,
            last_auth = %describe_unix_time(credential.last_auth_unix_time),
            "second factor required"
        );

        if credential.cache_valid(source, now) {
            info!(
                identity = %credential.identity,
                age_secs = now - credential.last_auth_unix_time,
                "recent authentication from same address, will not ask again"
            );
            return Ok(GateOutcome::Cached);
        }

        let probe = self.provider.check(credential).await?;
        if probe.stat != STAT_OK {
            return Err(FwdError::SecondFactor(format!(
                "could not connect to provider: stat={} {}",
                probe.stat,
                probe.describe()
            )));
        }

        let auth = self.provider.push(credential).await?;
        if !auth.is_allow() {
            let result = auth
                .response
                .as_ref()
                .map(|r| r.result.as_str())
                .unwrap_or_default();
            return Err(FwdError::SecondFactor(format!(
                "push for {} not approved: stat={} result={} {}",
                credential.identity,
                auth.stat,
                result,
                auth.describe()
            )));
        }

        credential.record_success(source, now);
        Ok(GateOutcome::Approved)
    }
}

fn describe_unix_time(secs: i64) -> String {
    if secs <= 0 {
        return "(never)".to_string();
    }
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}
