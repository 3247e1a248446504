//! Text frames delivered over the push transport.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{ServerDescriptor, SystemMetrics};

/// One parsed push frame.
///
/// The wire shape is `{"type": "...", ...payload}`. Unrecognized type
/// values parse to `None` so newer backends can add frames without
/// breaking older clients.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Fresh system-wide metric readings.
    Metrics(SystemMetrics),

    /// The managed-server list changed. Carries the refreshed list when
    /// the backend includes one; otherwise consumers should refetch.
    ServerUpdate(Option<Vec<ServerDescriptor>>),

    /// One human-readable activity line.
    Log(String),
}

#[derive(Deserialize)]
struct ServerUpdateFrame {
    #[serde(default)]
    servers: Option<Vec<ServerDescriptor>>,
}

#[derive(Deserialize)]
struct LogFrame {
    message: String,
}

impl Frame {
    /// Parses one text frame.
    ///
    /// Returns `Ok(None)` for well-formed frames of an unrecognized type.
    ///
    /// # Errors
    ///
    /// Returns an error when the text is not valid JSON, carries no
    /// string `type` field, or a recognized frame's payload has the wrong
    /// shape.
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let value: Value = serde_json::from_str(text)?;
        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            return Err(Error::MalformedFrame(
                "missing string `type` field".to_owned(),
            ));
        };

        match kind {
            "metrics" => Ok(Some(Self::Metrics(serde_json::from_value(value)?))),
            "serverUpdate" => {
                let update: ServerUpdateFrame = serde_json::from_value(value)?;
                Ok(Some(Self::ServerUpdate(update.servers)))
            }
            "log" => {
                let log: LogFrame = serde_json::from_value(value)?;
                Ok(Some(Self::Log(log.message)))
            }
            other => {
                debug!(frame_type = other, "ignoring unrecognized push frame");
                Ok(None)
            }
        }
    }
}
