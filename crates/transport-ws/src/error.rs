use thiserror::Error;

/// Errors raised by the push transport.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Opening the subscription failed.
    #[error("websocket connect failed: {0}")]
    Connect(String),

    /// The live subscription broke mid-stream.
    #[error("websocket stream error: {0}")]
    Stream(String),
}
