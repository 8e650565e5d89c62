//! Provider seam for push-based second-factor checks, plus the response
//! shapes of the Duo Auth API.

use geofwd_core::{FwdResult, SecondFactorCredential};
use serde::Deserialize;

/// Status every successful provider call reports in `stat`.
pub const STAT_OK: &str = "OK";
/// The only push result that admits a connection.
pub const RESULT_ALLOW: &str = "allow";

/// Response to the reachability probe (`/auth/v2/check`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatResponse {
    pub stat: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub message_detail: Option<String>,
}

impl StatResponse {
    /// `message (message_detail)`, or an empty string.
    pub fn describe(&self) -> String {
        match (&self.message, &self.message_detail) {
            (Some(m), Some(d)) => format!("{m} ({d})"),
            (Some(m), None) => m.clone(),
            (None, Some(d)) => d.clone(),
            (None, None) => String::new(),
        }
    }
}

/// Response to a push request (`/auth/v2/auth`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthResponse {
    pub stat: String,
    #[serde(default)]
    pub response: Option<AuthResult>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub message_detail: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthResult {
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub status_msg: String,
}

impl AuthResponse {
    /// `true` only for `stat == "OK"` together with `result == "allow"`.
    pub fn is_allow(&self) -> bool {
        self.stat == STAT_OK
            && self
                .response
                .as_ref()
                .is_some_and(|r| r.result == RESULT_ALLOW)
    }

    /// The provider's explanation: `status_msg` for an answered push,
    /// `message (message_detail)` for a failed call.
    pub fn describe(&self) -> String {
        let status_msg = self
            .response
            .as_ref()
            .map(|r| r.status_msg.as_str())
            .unwrap_or_default();
        let message = match (&self.message, &self.message_detail) {
            (Some(m), Some(d)) => format!("{m} ({d})"),
            (Some(m), None) => m.clone(),
            (None, Some(d)) => d.clone(),
            (None, None) => String::new(),
        };
        match (status_msg.is_empty(), message.is_empty()) {
            (false, false) => format!("{status_msg}; {message}"),
            (false, true) => status_msg.to_string(),
            _ => message,
        }
    }
}

/// A push-authentication provider.
///
/// Transport failures and undecodable responses are returned as errors;
/// the caller interprets `stat`/`result`.
#[allow(async_fn_in_trait)]
pub trait PushProvider {
    /// Probe whether the service is reachable and the keys are accepted.
    async fn check(&self, credential: &SecondFactorCredential) -> FwdResult<StatResponse>;

    /// Send an interactive push to `credential.identity` on the "auto" device
    /// and wait for the answer.
    async fn push(&self, credential: &SecondFactorCredential) -> FwdResult<AuthResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_requires_ok_and_allow() {
        let allow: AuthResponse = serde_json::from_str(
            r#"{"stat":"OK","response":{"result":"allow","status":"allow","status_msg":"Success. Logging you in..."}}"#,
        )
        .unwrap();
        assert!(allow.is_allow());

        let deny: AuthResponse = serde_json::from_str(
            r#"{"stat":"OK","response":{"result":"deny","status":"deny","status_msg":"Login request denied."}}"#,
        )
        .unwrap();
        assert!(!deny.is_allow());

        let fail: AuthResponse = serde_json::from_str(
            r#"{"stat":"FAIL","code":40002,"message":"Invalid request parameters","message_detail":"username"}"#,
        )
        .unwrap();
        assert!(!fail.is_allow());
        assert!(fail.response.is_none());
        assert_eq!(fail.describe(), "Invalid request parameters (username)");
        assert_eq!(deny.describe(), "Login request denied.");
        assert_eq!(AuthResponse::default().describe(), "");
    }

    #[test]
    fn describe_stat() {
        let fail: StatResponse = serde_json::from_str(
            r#"{"stat":"FAIL","code":40101,"message":"Missing request credentials","message_detail":"Authorization"}"#,
        )
        .unwrap();
        assert_eq!(fail.describe(), "Missing request credentials (Authorization)");
        assert_eq!(StatResponse::default().describe(), "");
    }
}
