//! geofwd: TCP port forwarder with admission checks.
//!
//! Accepts TCP connections on one address and relays them to another, but
//! only after the peer passes the configured CIDR allow/deny lists,
//! geofence, and Duo push second factor.

mod auth;
mod config;
mod gateway;
mod geoip;
mod nics;
#[cfg(test)]
mod testing;

use auth::DuoClient;
use clap::Parser;
use config::{CliOverrides, GatewayConfig, DEFAULT_DUO_CACHE_TIME};
use gateway::{Acceptor, AdmissionPipeline, RelayEngine};
use geoip::{GeoLocator, IpInfoClient};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// geofwd: TCP port forwarder with CIDR, Geo IP and Duo checks
#[derive(Parser, Debug)]
#[command(name = "geofwd", version, about = "TCP port forwarder with CIDR, Geo IP and Duo checks")]
struct Cli {
    /// Listen address, e.g. 0.0.0.0:4567 or MAIN:4567
    #[arg(short, long)]
    from: Option<String>,

    /// Upstream address, e.g. 10.0.0.5:22
    #[arg(short, long)]
    to: Option<String>,

    /// Print the primary interface address and exit
    #[arg(short, long)]
    int: bool,

    /// Print example invocations and exit
    #[arg(long)]
    examples: bool,

    /// Only admit peers located in this city
    #[arg(long)]
    city: Option<String>,

    /// Only admit peers located in this region
    #[arg(long)]
    region: Option<String>,

    /// Only admit peers located in this country
    #[arg(long)]
    country: Option<String>,

    /// Radius center as "lat,lon" (needs --distance)
    #[arg(short, long)]
    loc: Option<String>,

    /// Only admit peers within this many miles of --loc (or of this host)
    #[arg(short, long)]
    distance: Option<f64>,

    /// Comma-separated CIDR networks admitted without further checks
    #[arg(short = 'A', long)]
    allow: Option<String>,

    /// Comma-separated CIDR networks always denied
    #[arg(short = 'D', long)]
    deny: Option<String>,

    /// Duo credential store and user, as FILE:USER
    #[arg(long, value_name = "FILE:USER")]
    duo: Option<String>,

    /// Seconds a Duo approval is reused for the same peer address
    #[arg(long, value_name = "SECONDS")]
    duo_cache_time: Option<i64>,

    /// Admit RFC 1918 peers without checks
    #[arg(short, long)]
    private: bool,

    /// Config file path
    #[arg(long, default_value = "~/.geofwd/config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            from: self.from.clone(),
            to: self.to.clone(),
            allow: self.allow.clone(),
            deny: self.deny.clone(),
            private: self.private,
            city: self.city.clone(),
            region: self.region.clone(),
            country: self.country.clone(),
            loc: self.loc.clone(),
            distance: self.distance,
            duo: self.duo.clone(),
            duo_cache_time: self.duo_cache_time,
        }
    }
}

const EXAMPLES: &[(&str, &str)] = &[
    (
        "forward local port 4567 to ssh on another host",
        "geofwd -f 0.0.0.0:4567 -t 10.0.0.5:22",
    ),
    (
        "listen on the primary interface",
        "geofwd -f MAIN:4567 -t 10.0.0.5:22",
    ),
    (
        "only admit peers in the US",
        "geofwd -f MAIN:4567 -t 10.0.0.5:22 --country US",
    ),
    (
        "only admit peers within 75 miles of Atlanta",
        "geofwd -f MAIN:4567 -t 10.0.0.5:22 -l 33.756529,-84.400996 -d 75",
    ),
    (
        "only admit peers within 50 miles of this host",
        "geofwd -f MAIN:4567 -t 10.0.0.5:22 -d 50",
    ),
    (
        "allow a subnet, deny another",
        "geofwd -f MAIN:4567 -t 10.0.0.5:22 -A 198.51.100.0/24 -D 203.0.113.0/24",
    ),
    (
        "trust private networks, Duo push for everyone else",
        "geofwd -f MAIN:4567 -t 10.0.0.5:22 -p --duo ~/.geofwd/duo.ini:alice",
    ),
    (
        "reuse a Duo approval for 10 minutes",
        "geofwd -f MAIN:4567 -t 10.0.0.5:22 --duo duo.ini:alice --duo-cache-time 600",
    ),
];

fn print_examples() {
    let width = EXAMPLES.iter().map(|(what, _)| what.len()).max().unwrap_or(0);
    for (what, how) in EXAMPLES {
        println!("{what:<width$}  {how}");
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.examples {
        print_examples();
        return;
    }
    if cli.int {
        match nics::primary_address() {
            Ok(ip) => println!("{ip}"),
            Err(e) => {
                eprintln!("cannot determine primary interface: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    // Initialize tracing
    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let config_path = PathBuf::from(&cli.config);
    let config = match GatewayConfig::load(Some(&config_path), cli.overrides()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        from = %config.route.from,
        to = %config.route.to,
        "starting geofwd"
    );
    info!(
        allow = %config.filter.allow(),
        deny = %config.filter.deny(),
        trust_private = config.trust_private,
        geo = %config.restriction,
        "admission policy"
    );
    if config.credential.is_configured() {
        info!(
            identity = %config.credential.identity,
            host = %config.credential.service_host,
            cache_time = config.credential.cache_ttl_secs,
            "duo second factor enabled"
        );
    } else if cli.duo_cache_time.is_some_and(|t| t != DEFAULT_DUO_CACHE_TIME) {
        warn!("--duo-cache-time has no effect without --duo");
    }

    let locator = match IpInfoClient::new() {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "failed to create geo lookup client");
            std::process::exit(1);
        }
    };

    let local_location = if config.restriction.needs_local_location() {
        let located = locator
            .locate(None)
            .await
            .and_then(|record| record.coordinates().map(|_| record));
        match located {
            Ok(record) => {
                info!(location = %record, "this host's location");
                Some(record)
            }
            Err(e) => {
                error!(error = %e, "cannot determine this host's location for --distance");
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    let provider = match DuoClient::new() {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "failed to create duo client");
            std::process::exit(1);
        }
    };

    let pipeline = AdmissionPipeline::new(config.admission_policy(local_location), locator, provider);
    let relay = RelayEngine::new(config.route.upstream);
    let mut acceptor = match Acceptor::bind(config.route.listen, pipeline, relay).await {
        Ok(acceptor) => acceptor,
        Err(e) => {
            error!(listen = %config.route.listen, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    let bound = acceptor.local_addr().unwrap_or(config.route.listen);
    info!(
        listen = %bound,
        upstream = %config.route.upstream,
        "accepting connections"
    );

    tokio::select! {
        result = acceptor.run() => {
            if let Err(e) = result {
                error!(error = %e, "listener failed");
                std::process::exit(1);
            }
        }
        signal = shutdown_signal() => {
            info!("execution stopped by {signal}");
        }
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C) and name the one received.
#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            }
        }
        Err(e) => {
            warn!(error = %e, "cannot install SIGTERM handler");
            let _ = ctrl_c.await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "SIGINT"
}
