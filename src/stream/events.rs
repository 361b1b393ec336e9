//! Messages crossing the transport boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-stream substream identifier, assigned by the actor.
pub type SubstreamId = u64;

/// A message from a substream to the remote user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventToUser {
    pub source: SubstreamId,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub close: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
}

impl EventToUser {
    pub fn message(source: SubstreamId, message: Value) -> Self {
        Self {
            source,
            close: false,
            message: Some(message),
        }
    }

    pub fn close(source: SubstreamId) -> Self {
        Self {
            source,
            close: true,
            message: None,
        }
    }
}

/// A message from the remote user to a substream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFromUser {
    pub dest: SubstreamId,
    #[serde(default)]
    pub close: bool,
    #[serde(default)]
    pub message: Option<Value>,
}

impl EventFromUser {
    pub fn message(dest: SubstreamId, message: Value) -> Self {
        Self {
            dest,
            close: false,
            message: Some(message),
        }
    }

    pub fn close(dest: SubstreamId) -> Self {
        Self {
            dest,
            close: true,
            message: None,
        }
    }
}
