//! Durable per-item state record.

use itemnet_types::{HashId, ItemResult, ItemState, Timestamp};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// The ledger's view of one item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub item_id: HashId,
    pub state: ItemState,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_by_id: Option<HashId>,
}

impl StateRecord {
    /// Fresh `UNDEFINED` record created now.
    pub fn new(item_id: HashId) -> Self {
        Self {
            item_id,
            state: ItemState::Undefined,
            created_at: Timestamp::now(),
            expires_at: Timestamp::EPOCH,
            locked_by_id: None,
        }
    }

    pub fn with_state(mut self, state: ItemState) -> Self {
        self.state = state;
        self
    }

    pub fn with_times(mut self, created_at: Timestamp, expires_at: Timestamp) -> Self {
        self.created_at = created_at;
        self.expires_at = expires_at;
        self
    }

    /// Snapshot suitable for answering peers. An unset expiration maps to a
    /// null timestamp.
    pub fn to_item_result(&self, have_copy: bool) -> ItemResult {
        let expires = (self.expires_at != Timestamp::EPOCH).then_some(self.expires_at);
        ItemResult::new(self.state, have_copy, Some(self.created_at), expires)
            .with_locked_by(self.locked_by_id)
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at != Timestamp::EPOCH && self.expires_at.is_before(now)
    }

    pub fn approve(&mut self, created_at: Timestamp, force: bool) -> Result<(), StoreError> {
        self.transition(ItemState::Approved, force)?;
        self.created_at = created_at;
        self.locked_by_id = None;
        Ok(())
    }

    pub fn decline(&mut self, force: bool) -> Result<(), StoreError> {
        self.transition(ItemState::Declined, force)
    }

    pub fn revoke(&mut self, force: bool) -> Result<(), StoreError> {
        self.transition(ItemState::Revoked, force)?;
        self.locked_by_id = None;
        Ok(())
    }

    pub fn set_undefined(&mut self, force: bool) -> Result<(), StoreError> {
        self.transition(ItemState::Undefined, force)
    }

    /// A decided record only moves to another state when forced. LOCKED may
    /// always become APPROVED or REVOKED; that is how a lock is released.
    fn transition(&mut self, to: ItemState, force: bool) -> Result<(), StoreError> {
        let from = self.state;
        let lock_release =
            from == ItemState::Locked && matches!(to, ItemState::Approved | ItemState::Revoked);
        if !force && from.is_consensus_found() && from != to && !lock_release {
            return Err(StoreError::InvalidTransition {
                item: self.item_id,
                from,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(state: ItemState) -> StateRecord {
        StateRecord::new(HashId::of(b"rec")).with_state(state)
    }

    #[test]
    fn pending_record_transitions_freely() {
        let mut r = record(ItemState::PendingPositive);
        r.approve(Timestamp::new(100), false).unwrap();
        assert_eq!(r.state, ItemState::Approved);
        assert_eq!(r.created_at, Timestamp::new(100));
    }

    #[test]
    fn decided_record_requires_force() {
        let mut r = record(ItemState::Declined);
        assert!(matches!(
            r.approve(Timestamp::new(1), false),
            Err(StoreError::InvalidTransition { .. })
        ));
        assert_eq!(r.state, ItemState::Declined);
        r.approve(Timestamp::new(1), true).unwrap();
        assert_eq!(r.state, ItemState::Approved);
    }

    #[test]
    fn locked_can_be_revoked_without_force() {
        let mut r = record(ItemState::Locked);
        r.locked_by_id = Some(HashId::of(b"locker"));
        r.revoke(false).unwrap();
        assert_eq!(r.state, ItemState::Revoked);
        assert_eq!(r.locked_by_id, None);
    }

    #[test]
    fn item_result_from_record() {
        let r = record(ItemState::Approved).with_times(Timestamp::new(10), Timestamp::EPOCH);
        let result = r.to_item_result(true);
        assert_eq!(result.state(), ItemState::Approved);
        assert!(result.have_copy());
        assert_eq!(result.created_at(), Some(Timestamp::new(10)));
        assert_eq!(result.expires_at(), None);
    }

    #[test]
    fn expiry_check() {
        let r = record(ItemState::Approved).with_times(Timestamp::new(10), Timestamp::new(20));
        assert!(!r.is_expired(Timestamp::new(20)));
        assert!(r.is_expired(Timestamp::new(21)));
        let never = record(ItemState::Approved).with_times(Timestamp::new(10), Timestamp::EPOCH);
        assert!(!never.is_expired(Timestamp::new(1_000_000)));
    }
}
