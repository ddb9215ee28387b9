//! Wire messages between clients and the relay
//!
//! All payloads are JSON objects tagged by `event`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::module::ModuleKind;
use crate::state::{ClientId, ModuleState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    TouchDown,
    TouchMove,
    TouchUp,
    KeyDown,
}

/// Input event relayed verbatim to every client. The payload belongs to the
/// module handler and is never inspected here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub kind: InteractionKind,
    pub cid: ClientId,
    pub module: ModuleKind,
    #[serde(default)]
    pub payload: Value,
}

/// Client -> relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientMessage {
    SyncRequest {
        module: ModuleKind,
    },
    /// `fields` replaces each named field wholesale on the authority
    StateUpdate {
        module: ModuleKind,
        cid: ClientId,
        fields: ModuleState,
        post: bool,
    },
    UpdateCount,
    Interaction(Interaction),
}

/// Relay -> client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on a new connection
    Welcome {
        cid: ClientId,
    },
    SyncResponse {
        module: ModuleKind,
        state: ModuleState,
    },
    /// Full module state after an update from `cid`
    StateUpdate {
        module: ModuleKind,
        cid: ClientId,
        state: ModuleState,
    },
    UpdateCount {
        count: usize,
    },
    Interaction(Interaction),
}

impl ClientMessage {
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl ServerMessage {
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
