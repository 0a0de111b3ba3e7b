use thiserror::Error;

pub type Result<T> = std::result::Result<T, WardenError>;

/// Unified error type for the resolver core and its ambient CLI/config layer.
#[derive(Debug, Error)]
pub enum WardenError {
    #[error("no candidate servers for question {qname:?}")]
    NoCandidates { qname: String },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to load state snapshot: {0}")]
    SnapshotLoad(String),

    #[error("failed to serialize state snapshot: {0}")]
    SnapshotSave(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("`servers` must be non-empty")]
    EmptyServers,

    #[error("invalid domain rule for {domain:?}: {reason}")]
    InvalidRule { domain: String, reason: String },

    #[error("timeout_min ({timeout_min}) must be <= timeout_max ({timeout_max})")]
    TimeoutOrder { timeout_min: f64, timeout_max: f64 },

    #[error("timeout_max must be > 0, got {0}")]
    NonPositiveTimeout(f64),

    #[error("BIND parameter `a` must satisfy 0 < a < 1, got {0}")]
    InvalidBindA(f64),

    #[error("BIND parameter `g` must satisfy 0 < g < 1, got {0}")]
    InvalidBindG(f64),

    #[error("AR-1 parameter `{name}` is out of range: {value}")]
    InvalidAr1Param { name: &'static str, value: f64 },

    #[error("anomaly delayer pattern {pattern:?} failed to compile: {source}")]
    BadDelayerPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("failed to parse configuration file: {0}")]
    ParseError(String),
}
