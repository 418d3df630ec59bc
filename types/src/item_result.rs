//! Snapshot of what a node knows about an item.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{HashId, ItemState, Timestamp, TypesError};

/// A validation error attached to an item result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub code: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub message: String,
}

impl ErrorRecord {
    pub fn new(code: impl Into<String>, object: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            object: object.into(),
            message: message.into(),
        }
    }
}

/// The externally visible state of an item on one node.
///
/// Built fresh for every query and never mutated afterwards. Used both as a
/// cache entry and as an RPC/wire payload. Timestamps are whole seconds, so
/// equality is at second resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    state: ItemState,
    have_copy: bool,
    created_at: Option<Timestamp>,
    expires_at: Option<Timestamp>,
    #[serde(default)]
    errors: Vec<ErrorRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    locked_by_id: Option<HashId>,
}

impl ItemResult {
    pub const DISCARDED: ItemResult = ItemResult::bare(ItemState::Discarded);
    pub const UNDEFINED: ItemResult = ItemResult::bare(ItemState::Undefined);

    const fn bare(state: ItemState) -> Self {
        Self {
            state,
            have_copy: false,
            created_at: None,
            expires_at: None,
            errors: Vec::new(),
            locked_by_id: None,
        }
    }

    pub fn new(
        state: ItemState,
        have_copy: bool,
        created_at: Option<Timestamp>,
        expires_at: Option<Timestamp>,
    ) -> Self {
        Self {
            state,
            have_copy,
            created_at,
            expires_at,
            errors: Vec::new(),
            locked_by_id: None,
        }
    }

    pub fn with_errors(mut self, errors: Vec<ErrorRecord>) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_locked_by(mut self, locked_by_id: Option<HashId>) -> Self {
        self.locked_by_id = locked_by_id;
        self
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    pub fn have_copy(&self) -> bool {
        self.have_copy
    }

    pub fn created_at(&self) -> Option<Timestamp> {
        self.created_at
    }

    pub fn expires_at(&self) -> Option<Timestamp> {
        self.expires_at
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn locked_by_id(&self) -> Option<HashId> {
        self.locked_by_id
    }

    /// Structured form used in RPC replies.
    pub fn to_binder(&self) -> Value {
        // Every field is plain data; serialization into a Value cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Parse the structured form returned by a peer.
    pub fn from_binder(value: &Value) -> Result<Self, TypesError> {
        Self::deserialize(value).map_err(|e| TypesError::MalformedResult(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constants_have_no_timestamps() {
        assert_eq!(ItemResult::UNDEFINED.state(), ItemState::Undefined);
        assert_eq!(ItemResult::DISCARDED.state(), ItemState::Discarded);
        assert!(ItemResult::UNDEFINED.created_at().is_none());
        assert!(ItemResult::DISCARDED.expires_at().is_none());
        assert!(!ItemResult::UNDEFINED.have_copy());
    }

    #[test]
    fn binder_uses_camel_case_keys() {
        let result = ItemResult::new(
            ItemState::Approved,
            true,
            Some(Timestamp::new(1000)),
            Some(Timestamp::new(2000)),
        );
        let binder = result.to_binder();
        assert_eq!(binder["state"], json!("APPROVED"));
        assert_eq!(binder["haveCopy"], json!(true));
        assert_eq!(binder["createdAt"], json!(1000));
        assert_eq!(binder["expiresAt"], json!(2000));
        assert!(binder.get("lockedById").is_none());
    }

    #[test]
    fn binder_round_trip_keeps_errors_and_lock() {
        let lock = HashId::of(b"locker");
        let result = ItemResult::new(ItemState::Locked, false, None, None)
            .with_errors(vec![ErrorRecord::new("BADVALUE", "owner", "missing owner")])
            .with_locked_by(Some(lock));
        let back = ItemResult::from_binder(&result.to_binder()).unwrap();
        assert_eq!(back, result);
        assert_eq!(back.locked_by_id(), Some(lock));
        assert_eq!(back.errors()[0].code, "BADVALUE");
    }

    #[test]
    fn peer_reply_without_optional_fields_parses() {
        let reply = json!({
            "state": "DECLINED",
            "haveCopy": false,
            "createdAt": 10,
            "expiresAt": null
        });
        let result = ItemResult::from_binder(&reply).unwrap();
        assert_eq!(result.state(), ItemState::Declined);
        assert!(result.errors().is_empty());
        assert_eq!(result.expires_at(), None);
    }

    #[test]
    fn malformed_reply_rejected() {
        let reply = json!({ "state": "SOMETHING", "haveCopy": false });
        assert!(matches!(
            ItemResult::from_binder(&reply),
            Err(TypesError::MalformedResult(_))
        ));
    }
}
