//! Auxiliary data an item depends on.

use itemnet_types::HashId;
use serde::{Deserialize, Serialize};

/// Snapshot of an item's environment as held by one node: an opaque payload
/// plus the ids of the items it references.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub item_id: HashId,
    #[serde(default)]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub references: Vec<HashId>,
}

impl EnvironmentSnapshot {
    pub fn new(item_id: HashId, payload: Vec<u8>, references: Vec<HashId>) -> Self {
        Self {
            item_id,
            payload,
            references,
        }
    }
}
