//! Gateway configuration: TOML file + CLI overrides.
//!
//! ```toml
//! [forward]
//! from = "MAIN:4567"
//! to = "10.0.0.5:22"
//!
//! [access]
//! allow = ["198.51.100.0/24"]
//! deny = ["10.0.0.0/8"]
//! private = false
//!
//! [geo]
//! country = "US"
//! # or a radius check:
//! # loc = "33.756529,-84.400996"
//! # distance = 75.0
//!
//! [duo]
//! file = "~/.geofwd/duo.ini"
//! user = "alice"
//! cache_time = 120
//! ```

use crate::gateway::AdmissionPolicy;
use crate::nics;
use geofwd_core::{
    Coordinates, FwdError, FwdResult, GeoRestriction, LocationRecord, PrefixFilter, PrefixSet,
    SecondFactorCredential,
};
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_DUO_CACHE_TIME: i64 = 120;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub forward: ForwardSection,
    #[serde(default)]
    pub access: AccessSection,
    #[serde(default)]
    pub geo: GeoSection,
    #[serde(default)]
    pub duo: DuoSection,
}

/// `[forward]` section of the config TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForwardSection {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// `[access]` section of the config TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessSection {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default)]
    pub private: bool,
}

/// `[geo]` section of the config TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoSection {
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub loc: Option<String>,
    pub distance: Option<f64>,
}

/// `[duo]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct DuoSection {
    pub file: Option<String>,
    pub user: Option<String>,
    #[serde(default = "default_cache_time")]
    pub cache_time: i64,
}

impl Default for DuoSection {
    fn default() -> Self {
        Self {
            file: None,
            user: None,
            cache_time: default_cache_time(),
        }
    }
}

fn default_cache_time() -> i64 {
    DEFAULT_DUO_CACHE_TIME
}

/// Values given on the command line; each one replaces its file counterpart.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub from: Option<String>,
    pub to: Option<String>,
    /// Comma-separated CIDR list.
    pub allow: Option<String>,
    /// Comma-separated CIDR list.
    pub deny: Option<String>,
    pub private: bool,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub loc: Option<String>,
    pub distance: Option<f64>,
    /// `FILE:USER`
    pub duo: Option<String>,
    pub duo_cache_time: Option<i64>,
}

/// Listen and upstream endpoints, as given and as resolved.
#[derive(Debug, Clone)]
pub struct ForwardingRoute {
    pub from: String,
    pub to: String,
    pub listen: SocketAddr,
    pub upstream: SocketAddr,
}

/// Resolved gateway configuration (addresses resolved, CIDRs parsed,
/// credential loaded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub route: ForwardingRoute,
    pub filter: PrefixFilter,
    pub trust_private: bool,
    pub restriction: GeoRestriction,
    pub credential: SecondFactorCredential,
}

impl GatewayConfig {
    /// Load config from an optional TOML file, then apply CLI overrides.
    ///
    /// A path that does not exist means defaults.
    pub fn load(config_path: Option<&Path>, cli: CliOverrides) -> FwdResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    toml::from_str::<ConfigFile>(&content)
                        .map_err(|e| FwdError::Config(format!("config parse error: {e}")))?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };
        Self::from_parts(file_config, cli)
    }

    /// Merge a parsed file with CLI overrides and validate the result.
    ///
    /// # Errors
    ///
    /// [`FwdError::Config`], [`FwdError::Cidr`] or [`FwdError::Credential`]
    /// for invalid settings, [`FwdError::Resolve`] when an address does not
    /// resolve.
    pub fn from_parts(file: ConfigFile, cli: CliOverrides) -> FwdResult<Self> {
        let from = non_empty(cli.from.or(file.forward.from))
            .ok_or_else(|| FwdError::Config("--from is required".into()))?;
        let to = non_empty(cli.to.or(file.forward.to))
            .ok_or_else(|| FwdError::Config("--to is required".into()))?;
        if from == to {
            return Err(FwdError::Config(format!(
                "--from and --to must differ, both are {from}"
            )));
        }
        let from = nics::expand_main(&from)?;

        let allow = match cli.allow {
            Some(list) => PrefixSet::parse_list(&list)?,
            None => PrefixSet::from_entries(&file.access.allow)?,
        };
        let deny = match cli.deny {
            Some(list) => PrefixSet::parse_list(&list)?,
            None => PrefixSet::from_entries(&file.access.deny)?,
        };

        let center = non_empty(cli.loc.or(file.geo.loc))
            .map(|loc| {
                loc.parse::<Coordinates>()
                    .map_err(|e| FwdError::Config(format!("--loc: {e}")))
            })
            .transpose()?;
        let restriction = GeoRestriction {
            city: non_empty(cli.city.or(file.geo.city)),
            region: non_empty(cli.region.or(file.geo.region)),
            country: non_empty(cli.country.or(file.geo.country)),
            center,
            max_distance_miles: cli.distance.or(file.geo.distance).unwrap_or(0.0),
        };
        restriction.validate()?;

        let cache_ttl = cli.duo_cache_time.unwrap_or(file.duo.cache_time);
        let duo = match non_empty(cli.duo) {
            Some(spec) => Some(parse_duo_spec(&spec)?),
            None => match (non_empty(file.duo.file), non_empty(file.duo.user)) {
                (Some(file), Some(user)) => Some((file, user)),
                (None, None) => None,
                _ => {
                    return Err(FwdError::Config(
                        "[duo] needs both file and user".into(),
                    ))
                }
            },
        };
        let credential = match duo {
            Some((file, user)) => {
                SecondFactorCredential::load(&expand_tilde_str(&file), &user, cache_ttl)?
            }
            None => SecondFactorCredential::default(),
        };

        Ok(Self {
            route: ForwardingRoute {
                listen: resolve(&from)?,
                upstream: resolve(&to)?,
                from,
                to,
            },
            filter: PrefixFilter::new(allow, deny),
            trust_private: cli.private || file.access.private,
            restriction,
            credential,
        })
    }

    /// The admission policy for this configuration.
    pub fn admission_policy(&self, local_location: Option<LocationRecord>) -> AdmissionPolicy {
        AdmissionPolicy {
            filter: self.filter.clone(),
            trust_private: self.trust_private,
            restriction: self.restriction.clone(),
            local_location,
            credential: self.credential.clone(),
        }
    }
}

/// Split `FILE:USER` at the last colon.
fn parse_duo_spec(spec: &str) -> FwdResult<(String, String)> {
    match spec.rsplit_once(':') {
        Some((file, user)) if !file.is_empty() && !user.is_empty() => {
            Ok((file.to_string(), user.to_string()))
        }
        _ => Err(FwdError::Config(format!(
            "--duo must be FILE:USER, got {spec:?}"
        ))),
    }
}

fn resolve(addr: &str) -> FwdResult<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|e| FwdError::Resolve(format!("{addr}: {e}")))?
        .next()
        .ok_or_else(|| FwdError::Resolve(format!("{addr}: no addresses")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}
