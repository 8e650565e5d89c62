use thiserror::Error;

/// Errors produced by the geofwd policy layer.
#[derive(Debug, Error)]
pub enum FwdError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid CIDR network: {0}")]
    Cidr(String),

    #[error("credential error: {0}")]
    Credential(String),

    #[error("cannot resolve address: {0}")]
    Resolve(String),

    #[error("geo lookup failed: {0}")]
    GeoLookup(String),

    #[error("geo lookup rate limited: {0}")]
    RateLimited(String),

    #[error("invalid coordinates: {0}")]
    Coordinates(String),

    #[error("second factor failed: {0}")]
    SecondFactor(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type FwdResult<T> = Result<T, FwdError>;
