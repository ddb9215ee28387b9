//! Client-side mirror of replicated module state

use std::collections::{BTreeMap, HashMap};

use serde_json::{Value, json};

use crate::clock::TimeSource;
use crate::error::{Result, TandemError};
use crate::gesture::Gesture;
use crate::module::{DEFAULT_TEMPO, ModuleKind, TEMPO_STEP};
use crate::protocol::ClientMessage;
use crate::scheduler::Scheduler;
use crate::state::{ClientId, ModuleState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStatus {
    /// `sync_request` sent, waiting for the snapshot
    Pending,
    Joined,
}

#[derive(Debug, Clone)]
struct ModuleMirror {
    state: ModuleState,
    status: Option<JoinStatus>,
}

impl ModuleMirror {
    fn new(kind: ModuleKind) -> Self {
        Self {
            state: ModuleState::for_module(kind),
            status: None,
        }
    }
}

/// One client's view of every module it knows about.
///
/// Own entries are authoritative locally: broadcasts overwrite everyone
/// else's entries but never this client's.
#[derive(Debug, Clone)]
pub struct SyncMirror {
    cid: ClientId,
    modules: BTreeMap<ModuleKind, ModuleMirror>,
    gestures: HashMap<ClientId, Gesture>,
}

impl SyncMirror {
    pub fn new(cid: ClientId) -> Self {
        Self {
            cid,
            modules: BTreeMap::new(),
            gestures: HashMap::new(),
        }
    }

    pub fn cid(&self) -> &ClientId {
        &self.cid
    }

    fn mirror_mut(&mut self, kind: ModuleKind) -> &mut ModuleMirror {
        self.modules.entry(kind).or_insert_with(|| ModuleMirror::new(kind))
    }

    pub fn status(&self, kind: ModuleKind) -> Option<JoinStatus> {
        self.modules.get(&kind).and_then(|m| m.status)
    }

    pub fn is_joined(&self, kind: ModuleKind) -> bool {
        self.status(kind) == Some(JoinStatus::Joined)
    }

    pub fn state(&self, kind: ModuleKind) -> Option<&ModuleState> {
        self.modules.get(&kind).map(|m| &m.state)
    }

    /// This client's value for `field`
    pub fn own(&self, kind: ModuleKind, field: &str) -> Option<&Value> {
        self.state(kind)?.get(field, &self.cid)
    }

    /// Room-wide value for `field`
    pub fn room(&self, kind: ModuleKind, field: &str) -> Option<&Value> {
        self.state(kind)?.get(field, &ClientId::room())
    }

    /// Cursor tempo shared by the room, in bpm
    pub fn tempo(&self) -> Option<f64> {
        self.room(ModuleKind::TempoCursor, "tempo")?.as_f64()
    }

    /// Raise the room tempo one step and post it to everyone
    pub fn raise_tempo(&mut self) -> Result<ClientMessage> {
        let bpm = self.tempo().unwrap_or(DEFAULT_TEMPO) + TEMPO_STEP;
        self.author(ModuleKind::TempoCursor, "tempo", json!(bpm), true)
    }

    /// Re-anchor `scheduler` at the room tempo. Returns whether it changed.
    pub fn apply_tempo<S: TimeSource, C>(&self, scheduler: &mut Scheduler<S, C>) -> Result<bool> {
        match self.tempo() {
            Some(bpm) if bpm != scheduler.tempo_map().bpm() => {
                scheduler.set_tempo(bpm)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// First activation of a module. `None` if already joined or joining.
    pub fn join(&mut self, kind: ModuleKind) -> Option<ClientMessage> {
        let mirror = self.mirror_mut(kind);
        if mirror.status.is_some() {
            return None;
        }
        mirror.status = Some(JoinStatus::Pending);
        Some(ClientMessage::SyncRequest { module: kind })
    }

    /// Adopt the authority's snapshot, seed this client's defaults, and
    /// produce the posted update that announces them to peers.
    pub fn on_sync_response(&mut self, kind: ModuleKind, state: ModuleState) -> ClientMessage {
        let cid = self.cid.clone();
        let mirror = self.mirror_mut(kind);
        mirror.state = state;

        for field in kind.fields() {
            let Some(default) = kind.default_value(field) else {
                continue;
            };
            let map = mirror.state.field_mut(field);
            if !kind.is_room_field(field) {
                map.insert(cid.clone(), default);
            } else if !map.contains(&ClientId::room()) {
                // A room value already set by peers wins over the default
                map.insert(ClientId::room(), default);
            }
        }
        mirror.status = Some(JoinStatus::Joined);

        ClientMessage::StateUpdate {
            module: kind,
            cid,
            fields: mirror.state.clone(),
            post: true,
        }
    }

    /// Merge a broadcast, keeping this client's own entries
    pub fn on_broadcast(&mut self, kind: ModuleKind, state: ModuleState) {
        let cid = self.cid.clone();
        let mirror = self.mirror_mut(kind);

        for (name, mut incoming) in state {
            let local = mirror.state.field_mut(&name);
            match local.get(&cid) {
                Some(own) => {
                    incoming.insert(cid.clone(), own.clone());
                }
                None => {
                    incoming.remove(&cid);
                }
            }
            *local = incoming;
        }
    }

    /// Set this client's value for one field
    pub fn author(
        &mut self,
        kind: ModuleKind,
        field: &str,
        value: Value,
        post: bool,
    ) -> Result<ClientMessage> {
        self.author_fields(kind, [(field, value)], post)
    }

    /// Set this client's values and build the update carrying the whole
    /// currently-known map of each touched field
    pub fn author_fields<'a>(
        &mut self,
        kind: ModuleKind,
        edits: impl IntoIterator<Item = (&'a str, Value)>,
        post: bool,
    ) -> Result<ClientMessage> {
        if !self.is_joined(kind) {
            return Err(TandemError::NotJoined(kind));
        }
        let edits: Vec<(&str, Value)> = edits.into_iter().collect();
        if let Some((field, _)) = edits.iter().find(|(f, _)| !kind.has_field(f)) {
            return Err(TandemError::UnknownField {
                module: kind,
                field: field.to_string(),
            });
        }

        let cid = self.cid.clone();
        let mirror = self.mirror_mut(kind);
        let mut fields = ModuleState::new();
        for (field, value) in edits {
            let key = if kind.is_room_field(field) {
                ClientId::room()
            } else {
                cid.clone()
            };
            let map = mirror.state.field_mut(field);
            map.insert(key, value);
            fields.set_field(field, map.clone());
        }

        Ok(ClientMessage::StateUpdate {
            module: kind,
            cid,
            fields,
            post,
        })
    }

    /// Transient drag state for `cid`
    pub fn gesture_mut(&mut self, cid: &ClientId) -> &mut Gesture {
        self.gestures.entry(cid.clone()).or_default()
    }
}
