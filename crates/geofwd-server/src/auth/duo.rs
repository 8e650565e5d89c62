//! Duo Auth API client.
//!
//! Every request is signed: the canonical form is the `Date` header, the
//! upper-cased method, the lower-cased API host, the path, and the sorted,
//! percent-encoded parameters, joined by newlines. The HMAC-SHA512 of that
//! string (keyed by the secret key) is sent as the password of HTTP Basic
//! auth with the integration key as the user name.

use super::provider::{AuthResponse, PushProvider, StatResponse};
use chrono::Utc;
use geofwd_core::{FwdError, FwdResult, SecondFactorCredential};
use reqwest::header::{CONTENT_TYPE, DATE};
use reqwest::Method;
use ring::hmac;
use serde::de::DeserializeOwned;
use tracing::debug;

pub const CHECK_PATH: &str = "/auth/v2/check";
pub const AUTH_PATH: &str = "/auth/v2/auth";

/// HTTP client for the Duo Auth API.
///
/// No request timeout is set: a push waits for the human to answer, and
/// admission of every other connection waits with it.
pub struct DuoClient {
    http: reqwest::Client,
    /// Replaces `https://<service_host>` when set (tests point this at a
    /// local mock). Signing always uses the credential's host.
    base_url: Option<String>,
}

impl DuoClient {
    pub fn new() -> FwdResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("geofwd/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FwdError::Other(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: None,
        })
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    fn endpoint(&self, credential: &SecondFactorCredential, path: &str) -> String {
        match &self.base_url {
            Some(base) => format!("{base}{path}"),
            None => format!("https://{}{path}", credential.service_host),
        }
    }

    /// Sign and send one API call, decoding the JSON body.
    async fn call<T: DeserializeOwned>(
        &self,
        credential: &SecondFactorCredential,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
    ) -> FwdResult<T> {
        let date = Utc::now().to_rfc2822();
        let canon = canonical_params(params);
        let signature = sign_request(
            &credential.secret_key,
            &date,
            method.as_str(),
            &credential.service_host,
            path,
            &canon,
        );

        let url = self.endpoint(credential, path);
        debug!(method = %method, url = %url, "duo request");

        let request = if method == Method::GET {
            let url = if canon.is_empty() {
                url
            } else {
                format!("{url}?{canon}")
            };
            self.http.get(url)
        } else {
            self.http
                .request(method, url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(canon)
        };

        let response = request
            .header(DATE, date.as_str())
            .basic_auth(&credential.integration_key, Some(signature))
            .send()
            .await
            .map_err(|e| FwdError::SecondFactor(format!("{path}: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FwdError::SecondFactor(format!("{path}: {e}")))?;

        serde_json::from_str(&body).map_err(|e| {
            FwdError::SecondFactor(format!("{path}: unexpected {status} response: {e}"))
        })
    }
}

impl PushProvider for DuoClient {
    async fn check(&self, credential: &SecondFactorCredential) -> FwdResult<StatResponse> {
        self.call(credential, Method::GET, CHECK_PATH, &[]).await
    }

    async fn push(&self, credential: &SecondFactorCredential) -> FwdResult<AuthResponse> {
        let params = [
            ("username", credential.identity.as_str()),
            ("factor", "push"),
            ("device", "auto"),
        ];
        self.call(credential, Method::POST, AUTH_PATH, &params).await
    }
}

/// Sort parameters by key and value and encode them the way Duo expects:
/// RFC 3986 percent-encoding, spaces as `%20`, `~` left as is.
pub(crate) fn canonical_params(params: &[(&str, &str)]) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_unstable();

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in sorted {
        serializer.append_pair(key, value);
    }
    serializer
        .finish()
        .replace('+', "%20")
        .replace('*', "%2A")
        .replace("%7E", "~")
}

/// Hex HMAC-SHA512 of the canonical request.
pub(crate) fn sign_request(
    secret_key: &str,
    date: &str,
    method: &str,
    host: &str,
    path: &str,
    canon_params: &str,
) -> String {
    let method = method.to_uppercase();
    let host = host.to_lowercase();
    let canonical = [date, method.as_str(), host.as_str(), path, canon_params].join("\n");
    let key = hmac::Key::new(hmac::HMAC_SHA512, secret_key.as_bytes());
    hex::encode(hmac::sign(&key, canonical.as_bytes()).as_ref())
}
