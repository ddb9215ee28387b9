//! Client-keyed replicated state

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::module::ModuleKind;

/// Connection identity assigned by the relay
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Pseudo-client that owns room-wide values
    pub fn room() -> Self {
        Self::new(ROOM_ID)
    }

    pub fn is_room(&self) -> bool {
        self.0 == ROOM_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

const ROOM_ID: &str = "room";

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One field's value for every client that has set it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientFieldMap(BTreeMap<ClientId, Value>);

impl ClientFieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, cid: &ClientId) -> Option<&Value> {
        self.0.get(cid)
    }

    pub fn insert(&mut self, cid: ClientId, value: Value) -> Option<Value> {
        self.0.insert(cid, value)
    }

    pub fn remove(&mut self, cid: &ClientId) -> Option<Value> {
        self.0.remove(cid)
    }

    pub fn contains(&self, cid: &ClientId) -> bool {
        self.0.contains_key(cid)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clients(&self) -> impl Iterator<Item = &ClientId> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClientId, &Value)> {
        self.0.iter()
    }
}

impl<const N: usize> From<[(ClientId, Value); N]> for ClientFieldMap {
    fn from(entries: [(ClientId, Value); N]) -> Self {
        Self(BTreeMap::from(entries))
    }
}

/// field name -> per-client values.
///
/// Used both for a module's full state and for the partial set of fields
/// carried by a `state_update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleState(BTreeMap<String, ClientFieldMap>);

impl ModuleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty maps for every replicated field of `kind`
    pub fn for_module(kind: ModuleKind) -> Self {
        Self(
            kind.fields()
                .iter()
                .map(|f| (f.to_string(), ClientFieldMap::new()))
                .collect(),
        )
    }

    pub fn field(&self, name: &str) -> Option<&ClientFieldMap> {
        self.0.get(name)
    }

    /// Field map, created empty if missing
    pub fn field_mut(&mut self, name: &str) -> &mut ClientFieldMap {
        self.0.entry(name.to_string()).or_default()
    }

    /// Replace a field's whole map
    pub fn set_field(&mut self, name: impl Into<String>, map: ClientFieldMap) {
        self.0.insert(name.into(), map);
    }

    pub fn get(&self, field: &str, cid: &ClientId) -> Option<&Value> {
        self.field(field).and_then(|m| m.get(cid))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &ClientFieldMap)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for ModuleState {
    type Item = (String, ClientFieldMap);
    type IntoIter = std::collections::btree_map::IntoIter<String, ClientFieldMap>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(String, ClientFieldMap)> for ModuleState {
    fn from_iter<I: IntoIterator<Item = (String, ClientFieldMap)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
