//! Error types for the quote chart.

use thiserror::Error;

/// A streamed message that could not be turned into an observation.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload was not valid JSON, or a field had the wrong type
    #[error("invalid quote payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("quote payload is not a JSON object")]
    NotAnObject,

    /// Object carried neither a `time` field nor bid/ask prices
    #[error("quote payload has neither `time` nor bid/ask prices")]
    UnknownShape,
}

/// Failure of a single connection attempt to the quote stream.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server responded with {0}")]
    Status(reqwest::StatusCode),

    #[error("unexpected content type `{0}`, expected text/event-stream")]
    ContentType(String),

    /// The feed stopped listening; the subscription has nowhere to deliver to
    #[error("event receiver dropped")]
    ChannelClosed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("symbol must not be empty")]
    EmptySymbol,

    #[error("base URL must start with http:// or https://, got `{0}`")]
    InvalidUrl(String),

    #[error("path template must contain `{{symbol}}`, got `{0}`")]
    InvalidPathTemplate(String),

    #[error("retry base delay ({base_ms}ms) exceeds the maximum ({max_ms}ms)")]
    InvalidRetryDelays { base_ms: u64, max_ms: u64 },
}

pub type StreamResult<T> = Result<T, StreamError>;
