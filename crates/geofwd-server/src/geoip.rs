//! IP geolocation via the ipinfo.io JSON API.
//!
//! `GET {base}/{ip}/json` looks up a peer; `GET {base}/json` looks up the
//! caller's own public address. A rate-limit message in the body is a
//! distinct failure and is never parsed as JSON.

use geofwd_core::geo::RATE_LIMIT_MARKER;
use geofwd_core::{FwdError, FwdResult, LocationRecord};
use std::net::IpAddr;
use tracing::debug;

pub const IPINFO_BASE_URL: &str = "https://ipinfo.io";

/// Resolves an address to a location record.
#[allow(async_fn_in_trait)]
pub trait GeoLocator {
    /// Look up `ip`, or this host's own public address when `None`.
    async fn locate(&self, ip: Option<IpAddr>) -> FwdResult<LocationRecord>;
}

/// HTTP client for ipinfo.io (or any service with the same wire shape).
pub struct IpInfoClient {
    base_url: String,
    http: reqwest::Client,
}

impl IpInfoClient {
    pub fn new() -> FwdResult<Self> {
        Self::with_base_url(IPINFO_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> FwdResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("geofwd/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FwdError::Other(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn lookup_url(&self, ip: Option<IpAddr>) -> String {
        match ip {
            Some(ip) => format!("{}/{ip}/json", self.base_url),
            None => format!("{}/json", self.base_url),
        }
    }
}

impl GeoLocator for IpInfoClient {
    async fn locate(&self, ip: Option<IpAddr>) -> FwdResult<LocationRecord> {
        let url = self.lookup_url(ip);
        debug!(url = %url, "geo lookup");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FwdError::GeoLookup(format!("{url}: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FwdError::GeoLookup(format!("{url}: {e}")))?;

        if !status.is_success() && !body.contains(RATE_LIMIT_MARKER) {
            return Err(FwdError::GeoLookup(format!("{url} returned {status}")));
        }
        LocationRecord::from_json(&body)
    }
}
