//! In-process fakes for the geo lookup and push provider seams, with shared
//! call counters so tests can assert which checks ran.

use crate::auth::provider::{AuthResponse, AuthResult, PushProvider, StatResponse};
use crate::geoip::GeoLocator;
use geofwd_core::{FwdError, FwdResult, LocationRecord, SecondFactorCredential};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Lookup fake keyed by address; `None` answers the "own address" query.
#[derive(Default)]
pub struct FakeLocator {
    records: HashMap<Option<IpAddr>, LocationRecord>,
    lookups: Arc<AtomicUsize>,
}

impl FakeLocator {
    pub fn with(mut self, ip: &str, loc: &str, city: &str, region: &str, country: &str) -> Self {
        let addr: IpAddr = ip.parse().unwrap();
        self.records.insert(
            Some(addr),
            LocationRecord {
                ip: ip.to_string(),
                city: city.to_string(),
                region: region.to_string(),
                country: country.to_string(),
                loc: loc.to_string(),
                ..Default::default()
            },
        );
        self
    }

    pub fn lookups(&self) -> Arc<AtomicUsize> {
        self.lookups.clone()
    }
}

impl GeoLocator for FakeLocator {
    async fn locate(&self, ip: Option<IpAddr>) -> FwdResult<LocationRecord> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.records
            .get(&ip)
            .cloned()
            .ok_or_else(|| FwdError::GeoLookup(format!("no record for {ip:?}")))
    }
}

#[derive(Default)]
pub struct ProviderCalls {
    checks: AtomicUsize,
    pushes: AtomicUsize,
}

impl ProviderCalls {
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn pushes(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.checks() + self.pushes()
    }
}

enum Behaviour {
    Answer {
        check_stat: &'static str,
        push_stat: &'static str,
        result: &'static str,
    },
    /// Push answered with `stat=FAIL`, a message and no `response`.
    PushFailure {
        message: &'static str,
        detail: &'static str,
    },
    TransportError,
}

pub struct FakeProvider {
    behaviour: Behaviour,
    calls: Arc<ProviderCalls>,
}

impl FakeProvider {
    fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            calls: Arc::new(ProviderCalls::default()),
        }
    }

    pub fn allowing() -> Self {
        Self::with_result("OK", "allow")
    }

    pub fn with_result(push_stat: &'static str, result: &'static str) -> Self {
        Self::new(Behaviour::Answer {
            check_stat: "OK",
            push_stat,
            result,
        })
    }

    pub fn unreachable() -> Self {
        Self::new(Behaviour::Answer {
            check_stat: "FAIL",
            push_stat: "OK",
            result: "allow",
        })
    }

    pub fn push_failing(message: &'static str, detail: &'static str) -> Self {
        Self::new(Behaviour::PushFailure { message, detail })
    }

    pub fn failing() -> Self {
        Self::new(Behaviour::TransportError)
    }

    pub fn calls(&self) -> Arc<ProviderCalls> {
        self.calls.clone()
    }
}

impl PushProvider for FakeProvider {
    async fn check(&self, _credential: &SecondFactorCredential) -> FwdResult<StatResponse> {
        self.calls.checks.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::PushFailure { .. } => Ok(StatResponse {
                stat: "OK".into(),
                message: None,
                message_detail: None,
            }),
            Behaviour::Answer { check_stat, .. } => Ok(StatResponse {
                stat: check_stat.to_string(),
                message: Some("probe".into()),
                message_detail: None,
            }),
            Behaviour::TransportError => {
                Err(FwdError::SecondFactor("connection refused".into()))
            }
        }
    }

    async fn push(&self, _credential: &SecondFactorCredential) -> FwdResult<AuthResponse> {
        self.calls.pushes.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Answer {
                push_stat, result, ..
            } => Ok(AuthResponse {
                stat: push_stat.to_string(),
                response: Some(AuthResult {
                    result: result.to_string(),
                    status_msg: match *result {
                        "allow" => "Success. Logging you in...".into(),
                        "deny" => "Login request denied.".into(),
                        _ => String::new(),
                    },
                }),
                message: None,
                message_detail: None,
            }),
            Behaviour::PushFailure { message, detail } => Ok(AuthResponse {
                stat: "FAIL".into(),
                response: None,
                message: Some(message.to_string()),
                message_detail: Some(detail.to_string()),
            }),
            Behaviour::TransportError => {
                Err(FwdError::SecondFactor("connection refused".into()))
            }
        }
    }
}
