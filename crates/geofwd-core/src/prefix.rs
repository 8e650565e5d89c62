//! CIDR allow/deny classification and the loopback/private bypass.
//!
//! The deny set is consulted before the allow set, so an address present in
//! both is denied.

use crate::error::{FwdError, FwdResult};
use ipnet::IpNet;
use std::fmt;
use std::net::IpAddr;

/// An ordered list of CIDR networks, loaded once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixSet {
    nets: Vec<IpNet>,
}

impl PrefixSet {
    /// Parse a comma-delimited list such as `"10.0.0.0/8,192.168.1.0/24"`.
    ///
    /// An empty (or all-whitespace) string yields an empty set.
    ///
    /// # Errors
    ///
    /// [`FwdError::Cidr`] naming the first entry that is not a valid
    /// network, including empty entries between commas.
    pub fn parse_list(list: &str) -> FwdResult<Self> {
        if list.trim().is_empty() {
            return Ok(Self::default());
        }
        Self::from_entries(list.split(','))
    }

    /// Parse each entry as a CIDR network.
    pub fn from_entries<I, S>(entries: I) -> FwdResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let nets = entries
            .into_iter()
            .map(|entry| {
                let entry = entry.as_ref().trim();
                entry
                    .parse::<IpNet>()
                    .map_err(|_| FwdError::Cidr(entry.to_string()))
            })
            .collect::<FwdResult<Vec<_>>>()?;
        Ok(Self { nets })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.nets.iter().any(|net| net.contains(&ip))
    }

    pub fn is_empty(&self) -> bool {
        self.nets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nets.len()
    }
}

impl fmt::Display for PrefixSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.nets.iter().map(|n| n.to_string()).collect();
        f.write_str(&joined.join(","))
    }
}

/// Result of [`PrefixFilter::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixClass {
    /// In the deny set: reject, nothing else is consulted.
    Denied,
    /// In the allow set: admit without geofence or second factor.
    AllowedBypass,
    /// In neither set.
    NoMatch,
}

/// Allow/deny classifier over two [`PrefixSet`]s.
#[derive(Debug, Clone, Default)]
pub struct PrefixFilter {
    allow: PrefixSet,
    deny: PrefixSet,
}

impl PrefixFilter {
    pub fn new(allow: PrefixSet, deny: PrefixSet) -> Self {
        Self { allow, deny }
    }

    pub fn classify(&self, ip: IpAddr) -> PrefixClass {
        if self.deny.contains(ip) {
            PrefixClass::Denied
        } else if self.allow.contains(ip) {
            PrefixClass::AllowedBypass
        } else {
            PrefixClass::NoMatch
        }
    }

    pub fn allow(&self) -> &PrefixSet {
        &self.allow
    }

    pub fn deny(&self) -> &PrefixSet {
        &self.deny
    }
}

/// Why a source skipped every policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bypass {
    Loopback,
    TrustedPrivate,
}

/// Loopback sources always bypass policy; RFC 1918 sources do so only when
/// `trust_private` is set. IPv4-mapped IPv6 addresses are treated as the
/// IPv4 address they carry.
pub fn bypass_for(ip: IpAddr, trust_private: bool) -> Option<Bypass> {
    let ip = ip.to_canonical();
    if ip.is_loopback() {
        return Some(Bypass::Loopback);
    }
    match ip {
        IpAddr::V4(v4) if trust_private && v4.is_private() => Some(Bypass::TrustedPrivate),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn parse_list() {
        let set = PrefixSet::parse_list("10.0.0.0/8, 192.168.1.0/24,2001:db8::/32").unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.contains(ip("10.1.2.3")));
        assert!(set.contains(ip("192.168.1.200")));
        assert!(set.contains(ip("2001:db8::1")));
        assert!(!set.contains(ip("192.168.2.1")));
        assert_eq!(set.to_string(), "10.0.0.0/8,192.168.1.0/24,2001:db8::/32");
    }

    #[test]
    fn empty_list() {
        assert!(PrefixSet::parse_list("").unwrap().is_empty());
        assert!(PrefixSet::parse_list("  ").unwrap().is_empty());
    }

    #[test]
    fn malformed_entry_is_named() {
        match PrefixSet::parse_list("10.0.0.0/8,300.1.1.0/24") {
            Err(FwdError::Cidr(bad)) => assert_eq!(bad, "300.1.1.0/24"),
            other => panic!("expected Cidr error, got {other:?}"),
        }
        assert!(PrefixSet::parse_list("10.0.0.0/8,").is_err());
        assert!(PrefixSet::parse_list("10.0.0.1").is_err());
    }

    #[test]
    fn deny_beats_allow() {
        let filter = PrefixFilter::new(
            PrefixSet::parse_list("10.0.0.0/8").unwrap(),
            PrefixSet::parse_list("10.1.0.0/16").unwrap(),
        );
        assert_eq!(filter.classify(ip("10.1.2.3")), PrefixClass::Denied);
        assert_eq!(filter.classify(ip("10.2.2.3")), PrefixClass::AllowedBypass);
        assert_eq!(filter.classify(ip("8.8.8.8")), PrefixClass::NoMatch);
    }

    #[test]
    fn empty_filter_never_matches() {
        let filter = PrefixFilter::default();
        assert_eq!(filter.classify(ip("10.1.2.3")), PrefixClass::NoMatch);
        assert_eq!(filter.classify(ip("::1")), PrefixClass::NoMatch);
    }

    #[test]
    fn families_do_not_cross_match() {
        let set = PrefixSet::parse_list("0.0.0.0/0").unwrap();
        assert!(set.contains(ip("203.0.113.5")));
        assert!(!set.contains(ip("2001:db8::5")));
    }

    #[test]
    fn loopback_always_bypasses() {
        assert_eq!(bypass_for(ip("127.0.0.1"), false), Some(Bypass::Loopback));
        assert_eq!(bypass_for(ip("::1"), false), Some(Bypass::Loopback));
        assert_eq!(bypass_for(ip("::ffff:127.0.0.1"), false), Some(Bypass::Loopback));
    }

    #[test]
    fn private_bypass_needs_trust() {
        assert_eq!(bypass_for(ip("192.168.1.10"), false), None);
        assert_eq!(bypass_for(ip("192.168.1.10"), true), Some(Bypass::TrustedPrivate));
        assert_eq!(bypass_for(ip("172.20.0.4"), true), Some(Bypass::TrustedPrivate));
        assert_eq!(bypass_for(ip("::ffff:10.0.0.7"), true), Some(Bypass::TrustedPrivate));
        assert_eq!(bypass_for(ip("172.32.0.4"), true), None);
        assert_eq!(bypass_for(ip("8.8.8.8"), true), None);
    }
}
