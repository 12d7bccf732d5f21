/// Shared error type used across all exit1 crates.
///
/// Probe-level failures (DNS, connect, TLS, timeout) are folded into
/// [`crate::outcome::OutcomeKind`] before they reach the classifier; this
/// type covers everything that legitimately propagates as an error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("name not found: {0}")]
    NameNotFound(String),

    #[error("transient DNS failure: {0}")]
    TransientDns(String),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("TLS: {0}")]
    TlsInvalid(String),

    #[error("protocol: {0}")]
    Protocol(String),

    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(u64),

    #[error("alert budget exhausted for {channel} ({window})")]
    BudgetExhausted { channel: String, window: String },

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
