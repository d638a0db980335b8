use thiserror::Error;

pub type ChartplayResult<T> = Result<T, ChartplayError>;

#[derive(Debug, Error)]
pub enum ChartplayError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors related to candle data loading, parsing and availability.
#[derive(Debug, Error)]
pub enum DataError {
    #[error(
        "Insufficient candle data: need {required} bars (warmup + visible + prediction), got {available}"
    )]
    InsufficientData { required: usize, available: usize },

    #[error("Malformed candle at index {index}: {msg}")]
    MalformedCandle { index: usize, msg: String },

    #[error("Candle times are not strictly increasing at index {index}")]
    NonMonotonicTime { index: usize },

    #[error("Non-finite value for {field}")]
    NonFinite { field: String },

    #[error("Failed to parse float: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),

    #[error("Failed to parse integer: {0}")]
    ParseInt(#[from] std::num::ParseIntError),
}

/// Errors related to game settings, configuration and user-supplied input.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("Invalid leverage {0}: must be within 1..=100")]
    InvalidLeverage(u32),

    #[error("Invalid game settings: {0}")]
    InvalidSettings(String),

    #[error("Invalid game configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid leaderboard submission: {0}")]
    InvalidSubmission(String),

    #[error("Failed to encode rule set")]
    Encoding(#[from] postcard::Error),
}

/// Errors related to serialization of wire payloads.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("Serialization failed")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(String),
}

/// Errors related to network transport (HTTP).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },
}
