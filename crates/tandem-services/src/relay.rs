//! In-process relay: the single authority every client talks to
//!
//! Clients reach the relay through one shared inbox, so messages from
//! different clients are handled strictly in arrival order. Each client gets
//! its own outbox for replies and broadcasts.

use std::collections::BTreeMap;
use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use tandem_core::{Authority, ClientId, ClientMessage, ServerMessage};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Relay is not running")]
    Closed,
    #[error("Disconnected from relay")]
    Disconnected,
}

/// Where the relay delivers one client's messages.
///
/// Delivery never blocks the relay thread.
pub trait Outbox: Send + fmt::Debug {
    /// Returns false once the receiving side is gone
    fn deliver(&self, message: ServerMessage) -> bool;
}

impl Outbox for Sender<ServerMessage> {
    fn deliver(&self, message: ServerMessage) -> bool {
        self.send(message).is_ok()
    }
}

impl Outbox for UnboundedSender<ServerMessage> {
    fn deliver(&self, message: ServerMessage) -> bool {
        self.send(message).is_ok()
    }
}

/// What arrives at the relay inbox
#[derive(Debug)]
pub enum Envelope {
    Connect {
        cid: ClientId,
        outbox: Box<dyn Outbox>,
    },
    Message {
        cid: ClientId,
        message: ClientMessage,
    },
    Disconnect {
        cid: ClientId,
    },
}

/// Cloneable entry point for opening client links
#[derive(Clone)]
pub struct RelayHandle {
    inbox: Sender<Envelope>,
}

impl RelayHandle {
    /// Connect with a channel-backed link, for in-process clients
    pub fn connect(&self, cid: ClientId) -> Result<ClientLink, RelayError> {
        let (outbox, messages) = unbounded();
        let sender = self.attach(cid, outbox)?;
        Ok(ClientLink { sender, messages })
    }

    /// Connect a client whose messages go to `outbox`
    pub fn attach(
        &self,
        cid: ClientId,
        outbox: impl Outbox + 'static,
    ) -> Result<LinkSender, RelayError> {
        self.inbox
            .send(Envelope::Connect {
                cid: cid.clone(),
                outbox: Box::new(outbox),
            })
            .map_err(|_| RelayError::Closed)?;

        Ok(LinkSender {
            cid,
            inbox: self.inbox.clone(),
        })
    }
}

/// Sending half of a client connection.
///
/// Dropping it disconnects the client.
pub struct LinkSender {
    cid: ClientId,
    inbox: Sender<Envelope>,
}

impl LinkSender {
    pub fn cid(&self) -> &ClientId {
        &self.cid
    }

    pub fn send(&self, message: ClientMessage) -> Result<(), RelayError> {
        self.inbox
            .send(Envelope::Message {
                cid: self.cid.clone(),
                message,
            })
            .map_err(|_| RelayError::Closed)
    }
}

impl Drop for LinkSender {
    fn drop(&mut self) {
        let _ = self.inbox.send(Envelope::Disconnect {
            cid: self.cid.clone(),
        });
    }
}

/// One client's ordered, reliable connection to the relay.
///
/// Dropping the link disconnects the client.
pub struct ClientLink {
    sender: LinkSender,
    messages: Receiver<ServerMessage>,
}

impl ClientLink {
    pub fn cid(&self) -> &ClientId {
        self.sender.cid()
    }

    pub fn send(&self, message: ClientMessage) -> Result<(), RelayError> {
        self.sender.send(message)
    }

    /// Next delivered message, if any
    pub fn try_recv(&self) -> Result<Option<ServerMessage>, RelayError> {
        match self.messages.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(RelayError::Disconnected),
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<ServerMessage>, RelayError> {
        match self.messages.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(RelayError::Disconnected),
        }
    }
}

/// Owns the authority and fans messages out to connected clients
pub struct Relay {
    authority: Authority,
    inbox: Receiver<Envelope>,
    clients: BTreeMap<ClientId, Box<dyn Outbox>>,
}

impl Relay {
    pub fn new() -> (Self, RelayHandle) {
        let (tx, rx) = unbounded();
        let relay = Self {
            authority: Authority::new(),
            inbox: rx,
            clients: BTreeMap::new(),
        };
        (relay, RelayHandle { inbox: tx })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Handle everything already queued. Returns how many envelopes ran.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(envelope) = self.inbox.try_recv() {
            self.handle(envelope);
            handled += 1;
        }
        handled
    }

    /// Serve until every handle and link is gone
    pub fn run(&mut self) {
        info!("Relay started");
        while let Ok(envelope) = self.inbox.recv() {
            self.handle(envelope);
        }
        info!("Relay stopped");
    }

    /// Serve on a background thread; joining returns the relay
    pub fn spawn(mut self) -> JoinHandle<Self> {
        thread::spawn(move || {
            self.run();
            self
        })
    }

    pub fn handle(&mut self, envelope: Envelope) {
        match envelope {
            Envelope::Connect { cid, outbox } => {
                outbox.deliver(ServerMessage::Welcome { cid: cid.clone() });
                self.clients.insert(cid.clone(), outbox);
                info!(cid = %cid, count = self.clients.len(), "Client connected");
            }
            Envelope::Disconnect { cid } => {
                // Replicated entries stay behind on purpose: no reconciliation
                if self.clients.remove(&cid).is_some() {
                    info!(cid = %cid, count = self.clients.len(), "Client disconnected");
                }
            }
            Envelope::Message { cid, message } => self.handle_message(&cid, message),
        }
    }

    fn handle_message(&mut self, sender: &ClientId, message: ClientMessage) {
        match message {
            ClientMessage::SyncRequest { module } => {
                debug!(cid = %sender, %module, "Sync request");
                let state = self.authority.sync_request(module);
                self.send_to(sender, ServerMessage::SyncResponse { module, state });
            }
            ClientMessage::StateUpdate {
                module,
                cid,
                fields,
                post,
            } => {
                debug!(cid = %cid, %module, fields = fields.len(), post, "State update");
                if let Some(broadcast) = self.authority.state_update(module, &cid, fields, post) {
                    self.broadcast(broadcast);
                }
            }
            ClientMessage::UpdateCount => {
                let count = self.clients.len();
                self.broadcast(ServerMessage::UpdateCount { count });
            }
            ClientMessage::Interaction(interaction) => {
                self.broadcast(ServerMessage::Interaction(interaction));
            }
        }
    }

    fn send_to(&self, cid: &ClientId, message: ServerMessage) {
        match self.clients.get(cid) {
            Some(outbox) => {
                outbox.deliver(message);
            }
            None => warn!(cid = %cid, "Reply to unknown client dropped"),
        }
    }

    fn broadcast(&self, message: ServerMessage) {
        for outbox in self.clients.values() {
            outbox.deliver(message.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tandem_core::{Interaction, InteractionKind, ModuleKind, ModuleState};

    fn drain(link: &ClientLink) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Some(msg) = link.try_recv().unwrap() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_connect_sends_welcome() {
        let (mut relay, handle) = Relay::new();
        let link = handle.connect("a".into()).unwrap();
        relay.pump();
        assert_eq!(drain(&link), vec![ServerMessage::Welcome { cid: "a".into() }]);
        assert_eq!(relay.client_count(), 1);
    }

    #[test]
    fn test_sync_reply_goes_only_to_requester() {
        let (mut relay, handle) = Relay::new();
        let a = handle.connect("a".into()).unwrap();
        let b = handle.connect("b".into()).unwrap();
        relay.pump();
        drain(&a);
        drain(&b);

        a.send(ClientMessage::SyncRequest {
            module: ModuleKind::TempoCursor,
        })
        .unwrap();
        relay.pump();

        assert_eq!(
            drain(&a),
            vec![ServerMessage::SyncResponse {
                module: ModuleKind::TempoCursor,
                state: ModuleState::for_module(ModuleKind::TempoCursor),
            }]
        );
        assert!(drain(&b).is_empty());
    }

    #[test]
    fn test_unposted_update_is_silent() {
        let (mut relay, handle) = Relay::new();
        let a = handle.connect("a".into()).unwrap();
        relay.pump();
        drain(&a);

        let mut fields = ModuleState::new();
        fields.field_mut("bounces").insert("a".into(), json!(9));
        a.send(ClientMessage::StateUpdate {
            module: ModuleKind::PhysicsBubble,
            cid: "a".into(),
            fields,
            post: false,
        })
        .unwrap();
        relay.pump();

        assert!(drain(&a).is_empty());
        let state = relay.authority().state(ModuleKind::PhysicsBubble);
        assert_eq!(state.get("bounces", &"a".into()), Some(&json!(9)));
    }

    #[test]
    fn test_interactions_and_counts_reach_everyone() {
        let (mut relay, handle) = Relay::new();
        let a = handle.connect("a".into()).unwrap();
        let b = handle.connect("b".into()).unwrap();
        relay.pump();
        drain(&a);
        drain(&b);

        let touch = Interaction {
            kind: InteractionKind::TouchDown,
            cid: "a".into(),
            module: ModuleKind::SoundBlock,
            payload: json!({"pos": [3.0, 4.0]}),
        };
        a.send(ClientMessage::Interaction(touch.clone())).unwrap();
        b.send(ClientMessage::UpdateCount).unwrap();
        relay.pump();

        let expected = vec![
            ServerMessage::Interaction(touch),
            ServerMessage::UpdateCount { count: 2 },
        ];
        assert_eq!(drain(&a), expected);
        assert_eq!(drain(&b), expected);
    }

    #[test]
    fn test_attached_outbox_gets_messages_without_polling_thread() {
        let (mut relay, handle) = Relay::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let a = handle.attach("a".into(), tx).unwrap();
        a.send(ClientMessage::UpdateCount).unwrap();
        relay.pump();

        assert_eq!(rx.try_recv().unwrap(), ServerMessage::Welcome { cid: "a".into() });
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::UpdateCount { count: 1 });

        drop(a);
        relay.pump();
        assert_eq!(relay.client_count(), 0);
    }

    #[test]
    fn test_disconnect_keeps_state() {
        let (mut relay, handle) = Relay::new();
        let a = handle.connect("a".into()).unwrap();
        let mut fields = ModuleState::new();
        fields.field_mut("pitch").insert("a".into(), json!(65));
        a.send(ClientMessage::StateUpdate {
            module: ModuleKind::SoundBlock,
            cid: "a".into(),
            fields,
            post: true,
        })
        .unwrap();
        drop(a);
        relay.pump();

        assert_eq!(relay.client_count(), 0);
        let state = relay.authority().state(ModuleKind::SoundBlock);
        assert_eq!(state.get("pitch", &"a".into()), Some(&json!(65)));
    }

    #[test]
    fn test_spawned_relay_stops_when_handles_drop() {
        let (relay, handle) = Relay::new();
        let join = relay.spawn();
        {
            let a = handle.connect("a".into()).unwrap();
            let welcome = a.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(welcome, Some(ServerMessage::Welcome { cid: "a".into() }));
        }
        drop(handle);
        let relay = join.join().unwrap();
        assert_eq!(relay.client_count(), 0);
    }
}
