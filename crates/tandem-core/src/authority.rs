//! Server-side owner of every module's replicated state

use std::collections::BTreeMap;

use crate::module::ModuleKind;
use crate::protocol::ServerMessage;
use crate::state::{ClientId, ModuleState};

/// Holds exactly one `ModuleState` per module kind for its whole lifetime.
///
/// Updates replace entire field maps (last writer wins per field). A client
/// that authors from a stale mirror erases other clients' entries for the
/// fields it sends. Entries of disconnected clients are never removed.
#[derive(Debug, Clone)]
pub struct Authority {
    modules: BTreeMap<ModuleKind, ModuleState>,
}

impl Authority {
    pub fn new() -> Self {
        Self {
            modules: ModuleKind::ALL
                .into_iter()
                .map(|kind| (kind, ModuleState::for_module(kind)))
                .collect(),
        }
    }

    pub fn state(&self, module: ModuleKind) -> &ModuleState {
        // Every kind is inserted in `new` and never removed
        &self.modules[&module]
    }

    /// Snapshot for a joining client
    pub fn sync_request(&self, module: ModuleKind) -> ModuleState {
        self.state(module).clone()
    }

    /// Apply a client's fields. Returns the broadcast to fan out when `post`.
    pub fn state_update(
        &mut self,
        module: ModuleKind,
        cid: &ClientId,
        fields: ModuleState,
        post: bool,
    ) -> Option<ServerMessage> {
        let state = self
            .modules
            .entry(module)
            .or_insert_with(|| ModuleState::for_module(module));

        for (name, map) in fields {
            state.set_field(name, map);
        }

        post.then(|| ServerMessage::StateUpdate {
            module,
            cid: cid.clone(),
            state: state.clone(),
        })
    }
}

impl Default for Authority {
    fn default() -> Self {
        Self::new()
    }
}
