use thiserror::Error;

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the dashboard API client and frame parser.
#[derive(Debug, Error)]
pub enum Error {
    /// Request-level failure (connect, timeout, body read).
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A body or frame was not the JSON we expect.
    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend answered with a non-success status.
    #[error("api error ({status}): {message}")]
    Api {
        /// HTTP status code of the response.
        status: u16,
        /// Message extracted from the response body, or the status reason.
        message: String,
    },

    /// A push frame was well-formed JSON but structurally unusable.
    #[error("malformed push frame: {0}")]
    MalformedFrame(String),

    /// The base URL or an endpoint path could not be parsed.
    #[error("invalid endpoint: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
