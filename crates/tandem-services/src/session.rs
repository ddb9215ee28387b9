//! Client side of the sync protocol, bound to a relay link

use serde_json::Value;
use tandem_core::{
    ClientId, ClientMessage, Interaction, InteractionKind, ModuleKind, ServerMessage, SyncMirror,
    TandemError,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::relay::{ClientLink, RelayError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),
    #[error(transparent)]
    Core(#[from] TandemError),
}

/// What a module handler needs to react to after a poll
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Snapshot received and defaults announced
    Joined(ModuleKind),
    /// Mirror updated from a broadcast authored by `origin`
    StateChanged {
        module: ModuleKind,
        origin: ClientId,
    },
    Interaction(Interaction),
    ClientCount(usize),
}

/// A client's replicated view of every module it joined, kept current over one relay link
pub struct Session {
    link: ClientLink,
    mirror: SyncMirror,
    client_count: usize,
}

impl Session {
    pub fn new(link: ClientLink) -> Self {
        let mirror = SyncMirror::new(link.cid().clone());
        Self {
            link,
            mirror,
            client_count: 0,
        }
    }

    pub fn cid(&self) -> &ClientId {
        self.mirror.cid()
    }

    pub fn mirror(&self) -> &SyncMirror {
        &self.mirror
    }

    pub fn mirror_mut(&mut self) -> &mut SyncMirror {
        &mut self.mirror
    }

    /// Last count reported by the relay
    pub fn client_count(&self) -> usize {
        self.client_count
    }

    /// Start joining `module`; no-op if already joined or joining
    pub fn join(&mut self, module: ModuleKind) -> Result<(), SessionError> {
        if let Some(request) = self.mirror.join(module) {
            info!(cid = %self.cid(), %module, "Joining module");
            self.link.send(request)?;
        }
        Ok(())
    }

    /// Set one of this client's fields and push the field's full map
    pub fn author(
        &mut self,
        module: ModuleKind,
        field: &str,
        value: Value,
        post: bool,
    ) -> Result<(), SessionError> {
        let update = self.mirror.author(module, field, value, post)?;
        self.link.send(update)?;
        Ok(())
    }

    pub fn author_fields<'a>(
        &mut self,
        module: ModuleKind,
        edits: impl IntoIterator<Item = (&'a str, Value)>,
        post: bool,
    ) -> Result<(), SessionError> {
        let update = self.mirror.author_fields(module, edits, post)?;
        self.link.send(update)?;
        Ok(())
    }

    /// Nudge the shared cursor tempo up and post it
    pub fn raise_tempo(&mut self) -> Result<(), SessionError> {
        let update = self.mirror.raise_tempo()?;
        self.link.send(update)?;
        Ok(())
    }

    pub fn send_interaction(
        &self,
        module: ModuleKind,
        kind: InteractionKind,
        payload: Value,
    ) -> Result<(), SessionError> {
        self.link.send(ClientMessage::Interaction(Interaction {
            kind,
            cid: self.cid().clone(),
            module,
            payload,
        }))?;
        Ok(())
    }

    pub fn request_count(&self) -> Result<(), SessionError> {
        self.link.send(ClientMessage::UpdateCount)?;
        Ok(())
    }

    /// Apply everything delivered so far
    pub fn poll(&mut self) -> Result<Vec<SessionEvent>, SessionError> {
        let mut events = Vec::new();
        while let Some(message) = self.link.try_recv()? {
            if let Some(event) = self.handle(message)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    pub fn handle(&mut self, message: ServerMessage) -> Result<Option<SessionEvent>, SessionError> {
        let event = match message {
            ServerMessage::Welcome { cid } => {
                debug!(cid = %cid, "Welcome");
                None
            }
            ServerMessage::SyncResponse { module, state } => {
                let announce = self.mirror.on_sync_response(module, state);
                self.link.send(announce)?;
                info!(cid = %self.cid(), %module, "Joined module");
                Some(SessionEvent::Joined(module))
            }
            ServerMessage::StateUpdate { module, cid, state } => {
                self.mirror.on_broadcast(module, state);
                Some(SessionEvent::StateChanged {
                    module,
                    origin: cid,
                })
            }
            ServerMessage::UpdateCount { count } => {
                self.client_count = count;
                Some(SessionEvent::ClientCount(count))
            }
            ServerMessage::Interaction(interaction) => Some(SessionEvent::Interaction(interaction)),
        };
        Ok(event)
    }
}
