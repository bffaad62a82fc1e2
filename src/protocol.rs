//! Wire protocol: JSON text frames sent to clients.

use serde::{Deserialize, Serialize};

/// Messages the server sends over a session's WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once per session after admission.
    Ready { model: String, contexts: usize },
    /// Incremental hypothesis, superseded by later partials or the final.
    Partial { text: String },
    /// Committed transcript for a complete utterance.
    Final { text: String },
    /// Sent before an immediate close on admission failure.
    Error { message: String },
}

impl ServerMessage {
    /// Serialise to the wire JSON.
    ///
    /// The message enum contains nothing that can fail to serialise, so
    /// this is infallible.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
