//! Second-factor credential and its short-lived authentication cache.
//!
//! Credentials come from a section-keyed INI file:
//!
//! ```ini
//! [alice]
//! type = duo
//! integration = DIXXXXXXXXXXXXXXXXXX
//! secret = deadbeefdeadbeefdeadbeefdeadbeefdeadbeef
//! hostname = api-12345678.duosecurity.com
//! ```
//!
//! The section name is the identity pushed to. After every successful live
//! authentication the record remembers when and from where it happened;
//! a later connection from the same address within the TTL is admitted
//! without prompting again.

use crate::error::{FwdError, FwdResult};
use ini::Ini;
use std::fmt;
use std::net::IpAddr;
use std::path::Path;

/// Value of the `type` field for a Duo credential.
pub const DUO_CREDENTIAL_TYPE: &str = "duo";
/// Duo integration keys are 20 characters.
pub const MIN_INTEGRATION_KEY_LEN: usize = 20;
/// Duo secret keys are 40 characters.
pub const MIN_SECRET_KEY_LEN: usize = 40;
pub const MIN_HOSTNAME_LEN: usize = 10;

/// Credential plus authentication cache for one identity.
///
/// An empty `identity` means no second factor is configured.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecondFactorCredential {
    pub identity: String,
    pub integration_key: String,
    pub secret_key: String,
    pub service_host: String,
    /// Unix time of the last successful live authentication; 0 = never.
    pub last_auth_unix_time: i64,
    pub last_auth_source_ip: Option<IpAddr>,
    pub cache_ttl_secs: i64,
}

impl SecondFactorCredential {
    pub fn is_configured(&self) -> bool {
        !self.identity.is_empty()
    }

    /// The cache is valid iff the last success is at most `cache_ttl_secs`
    /// old and came from `source`.
    pub fn cache_valid(&self, source: IpAddr, now: i64) -> bool {
        self.last_auth_source_ip == Some(source)
            && now.saturating_sub(self.last_auth_unix_time) <= self.cache_ttl_secs
    }

    /// Record a successful live authentication.
    pub fn record_success(&mut self, source: IpAddr, now: i64) {
        self.last_auth_unix_time = now;
        self.last_auth_source_ip = Some(source);
    }

    /// Load the credential for `identity` from an INI file.
    ///
    /// # Errors
    ///
    /// [`FwdError::Credential`] when the file cannot be read or parsed, the
    /// section is missing, `type` is not `duo`, or a key field is missing or
    /// too short.
    pub fn load(path: &Path, identity: &str, cache_ttl_secs: i64) -> FwdResult<Self> {
        let ini = Ini::load_from_file(path).map_err(|e| {
            FwdError::Credential(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_ini(&ini, identity, cache_ttl_secs)
    }

    /// Same as [`SecondFactorCredential::load`] for in-memory content.
    pub fn from_ini_str(content: &str, identity: &str, cache_ttl_secs: i64) -> FwdResult<Self> {
        let ini = Ini::load_from_str(content)
            .map_err(|e| FwdError::Credential(format!("malformed credential store: {e}")))?;
        Self::from_ini(&ini, identity, cache_ttl_secs)
    }

    fn from_ini(ini: &Ini, identity: &str, cache_ttl_secs: i64) -> FwdResult<Self> {
        if identity.is_empty() {
            return Err(FwdError::Credential("identity must not be empty".into()));
        }
        if cache_ttl_secs < 0 {
            return Err(FwdError::Credential(format!(
                "cache time must not be negative, got {cache_ttl_secs}"
            )));
        }
        let section = ini
            .section(Some(identity))
            .ok_or_else(|| FwdError::Credential(format!("no section named [{identity}]")))?;

        let kind = section.get("type").unwrap_or_default();
        if kind != DUO_CREDENTIAL_TYPE {
            return Err(FwdError::Credential(format!(
                "[{identity}] type must be \"{DUO_CREDENTIAL_TYPE}\", got {kind:?}"
            )));
        }

        let field = |name: &str, min_len: usize| -> FwdResult<String> {
            let value = section.get(name).unwrap_or_default().trim();
            if value.len() < min_len {
                return Err(FwdError::Credential(format!(
                    "[{identity}] {name} must be at least {min_len} characters"
                )));
            }
            Ok(value.to_string())
        };

        Ok(Self {
            identity: identity.to_string(),
            integration_key: field("integration", MIN_INTEGRATION_KEY_LEN)?,
            secret_key: field("secret", MIN_SECRET_KEY_LEN)?,
            service_host: field("hostname", MIN_HOSTNAME_LEN)?,
            last_auth_unix_time: 0,
            last_auth_source_ip: None,
            cache_ttl_secs,
        })
    }
}

impl fmt::Debug for SecondFactorCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecondFactorCredential")
            .field("identity", &self.identity)
            .field("integration_key", &self.integration_key)
            .field("secret_key", &"<redacted>")
            .field("service_host", &self.service_host)
            .field("last_auth_unix_time", &self.last_auth_unix_time)
            .field("last_auth_source_ip", &self.last_auth_source_ip)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const INI: &str = "\
[alice]
type = duo
integration = DIABCDEFGHIJKLMNOPQR
secret = 0123456789abcdef0123456789abcdef01234567
hostname = api-12345678.duosecurity.com

[bob]
type = totp
integration = DIABCDEFGHIJKLMNOPQR
secret = 0123456789abcdef0123456789abcdef01234567
hostname = api-12345678.duosecurity.com

[carol]
type = duo
integration = short
secret = 0123456789abcdef0123456789abcdef01234567
hostname = api-12345678.duosecurity.com
";

    fn cached(at: i64, from: &str, ttl: i64) -> SecondFactorCredential {
        SecondFactorCredential {
            identity: "alice".into(),
            last_auth_unix_time: at,
            last_auth_source_ip: Some(from.parse().unwrap()),
            cache_ttl_secs: ttl,
            ..Default::default()
        }
    }

    #[test]
    fn cache_hit_at_ttl_boundary() {
        let cred = cached(1_000, "198.51.100.7", 120);
        assert!(cred.cache_valid("198.51.100.7".parse().unwrap(), 1_120));
    }

    #[test]
    fn cache_miss_after_ttl() {
        let cred = cached(1_000, "198.51.100.7", 120);
        assert!(!cred.cache_valid("198.51.100.7".parse().unwrap(), 1_121));
    }

    #[test]
    fn cache_miss_from_other_address() {
        let cred = cached(1_000, "198.51.100.7", 120);
        assert!(!cred.cache_valid("198.51.100.8".parse().unwrap(), 1_119));
    }

    #[test]
    fn never_authenticated_is_a_miss() {
        let cred = SecondFactorCredential {
            identity: "alice".into(),
            cache_ttl_secs: 120,
            ..Default::default()
        };
        assert!(!cred.cache_valid("198.51.100.7".parse().unwrap(), 60));
    }

    #[test]
    fn record_success_updates_cache() {
        let mut cred = cached(0, "198.51.100.7", 120);
        let source: IpAddr = "203.0.113.1".parse().unwrap();
        cred.record_success(source, 5_000);
        assert_eq!(cred.last_auth_unix_time, 5_000);
        assert_eq!(cred.last_auth_source_ip, Some(source));
        assert!(cred.cache_valid(source, 5_001));
    }

    #[test]
    fn load_valid_section() {
        let cred = SecondFactorCredential::from_ini_str(INI, "alice", 300).unwrap();
        assert!(cred.is_configured());
        assert_eq!(cred.integration_key, "DIABCDEFGHIJKLMNOPQR");
        assert_eq!(cred.service_host, "api-12345678.duosecurity.com");
        assert_eq!(cred.cache_ttl_secs, 300);
        assert_eq!(cred.last_auth_unix_time, 0);
        assert!(cred.last_auth_source_ip.is_none());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(INI.as_bytes()).unwrap();
        let cred = SecondFactorCredential::load(file.path(), "alice", 120).unwrap();
        assert_eq!(cred.identity, "alice");
    }

    #[test]
    fn missing_file() {
        let err = SecondFactorCredential::load(Path::new("/nonexistent/duo.ini"), "alice", 120)
            .unwrap_err();
        assert!(matches!(err, FwdError::Credential(_)));
    }

    #[test]
    fn rejects_bad_sections() {
        for who in ["bob", "carol", "dave"] {
            let err = SecondFactorCredential::from_ini_str(INI, who, 120).unwrap_err();
            assert!(matches!(err, FwdError::Credential(_)), "{who}: {err}");
        }
        assert!(SecondFactorCredential::from_ini_str(INI, "alice", -1).is_err());
    }

    #[test]
    fn debug_redacts_secret() {
        let cred = SecondFactorCredential::from_ini_str(INI, "alice", 120).unwrap();
        let shown = format!("{cred:?}");
        assert!(shown.contains("<redacted>"));
        assert!(!shown.contains("0123456789abcdef"));
    }
}
