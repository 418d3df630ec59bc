//! Vote tally for one item under resync.
//!
//! ```text
//! WaitForVotes -> PendingToCommit -> IsCommitting -> CommitSuccessful
//!                                                 \-> CommitFailed
//! ```
//!
//! Each peer holds at most one vote. A new vote from the same peer replaces
//! the previous one. Once a decision is reached the tally stops deciding;
//! later votes are still recorded but change nothing.

use std::collections::HashMap;

use itemnet_store::{StateRecord, StoreError};
use itemnet_types::{HashId, ItemState, NodeInfo, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ConsensusError, Quorum};

/// Lifecycle of the tally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResyncState {
    WaitForVotes,
    PendingToCommit,
    IsCommitting,
    CommitSuccessful,
    CommitFailed,
}

/// Bucket a vote is counted in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VoteBucket {
    Approved,
    Revoked,
    Declined,
    Undefined,
}

impl VoteBucket {
    /// LOCKED counts as APPROVED. States without a bucket yield `None`.
    pub fn for_state(state: ItemState) -> Option<Self> {
        match state {
            ItemState::Approved | ItemState::Locked => Some(Self::Approved),
            ItemState::Revoked => Some(Self::Revoked),
            ItemState::Declined => Some(Self::Declined),
            ItemState::Undefined => Some(Self::Undefined),
            _ => None,
        }
    }

    pub fn decided_state(self) -> ItemState {
        match self {
            Self::Approved => ItemState::Approved,
            Self::Revoked => ItemState::Revoked,
            Self::Declined => ItemState::Declined,
            Self::Undefined => ItemState::Undefined,
        }
    }
}

/// What the commit routine must do for a decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitPlan {
    /// No consensus state was reached; the tally already failed.
    Abandon,
    /// Persist the decision. Timestamps are reconciled from these voters.
    Persist { voters: Vec<NodeInfo> },
}

#[derive(Clone, Debug)]
pub struct ResyncingItem {
    hash_id: HashId,
    record: StateRecord,
    state: ResyncState,
    quorum: Quorum,
    votes: HashMap<NodeInfo, VoteBucket>,
    decided: Option<ItemState>,
}

impl ResyncingItem {
    /// Seed the tally from the local record, or a fresh `UNDEFINED` one.
    pub fn new(hash_id: HashId, record: Option<StateRecord>, quorum: Quorum) -> Self {
        Self {
            hash_id,
            record: record.unwrap_or_else(|| StateRecord::new(hash_id)),
            state: ResyncState::WaitForVotes,
            quorum,
            votes: HashMap::new(),
            decided: None,
        }
    }

    pub fn hash_id(&self) -> HashId {
        self.hash_id
    }

    pub fn record(&self) -> &StateRecord {
        &self.record
    }

    pub fn resync_state(&self) -> ResyncState {
        self.state
    }

    pub fn decided(&self) -> Option<ItemState> {
        self.decided
    }

    /// The vote this node casts for itself: its own decided state, or
    /// `UNDEFINED` when it has none.
    pub fn local_vote(&self) -> ItemState {
        if self.record.state.is_consensus_found() {
            self.record.state
        } else {
            ItemState::Undefined
        }
    }

    pub fn is_polling_finished(&self) -> bool {
        self.state != ResyncState::WaitForVotes
    }

    pub fn is_commit_finished(&self) -> bool {
        matches!(
            self.state,
            ResyncState::CommitSuccessful | ResyncState::CommitFailed
        )
    }

    pub fn is_mid_commit(&self) -> bool {
        matches!(
            self.state,
            ResyncState::PendingToCommit | ResyncState::IsCommitting
        )
    }

    pub fn vote_of(&self, peer: &NodeInfo) -> Option<VoteBucket> {
        self.votes.get(peer).copied()
    }

    pub fn count(&self, bucket: VoteBucket) -> usize {
        self.votes.values().filter(|&&b| b == bucket).count()
    }

    pub fn voters(&self, bucket: VoteBucket) -> Vec<NodeInfo> {
        let mut voters: Vec<NodeInfo> = self
            .votes
            .iter()
            .filter(|(_, b)| **b == bucket)
            .map(|(peer, _)| peer.clone())
            .collect();
        voters.sort();
        voters
    }

    /// Record `peer`'s vote. Returns the decided state when this vote
    /// completes a quorum; the tally is then `PendingToCommit` and the
    /// caller must run the commit.
    pub fn cast_vote(&mut self, peer: &NodeInfo, state: ItemState) -> Option<ItemState> {
        match VoteBucket::for_state(state) {
            Some(bucket) => {
                self.votes.insert(peer.clone(), bucket);
            }
            None => {
                self.votes.remove(peer);
            }
        }

        if self.is_polling_finished() {
            return None;
        }

        let decided = self.evaluate()?;
        debug!(item = %self.hash_id.short(), decided = %decided, "resync quorum reached");
        self.state = ResyncState::PendingToCommit;
        self.decided = Some(decided);
        Some(decided)
    }

    fn evaluate(&self) -> Option<ItemState> {
        let positive = self.quorum.positive;
        [VoteBucket::Revoked, VoteBucket::Declined, VoteBucket::Approved]
            .into_iter()
            .find(|&b| self.count(b) >= positive)
            .or_else(|| {
                (self.count(VoteBucket::Undefined) >= self.quorum.resync_break)
                    .then_some(VoteBucket::Undefined)
            })
            .map(VoteBucket::decided_state)
    }

    /// Enter the commit for `decided`.
    pub fn begin_commit(&mut self, decided: ItemState) -> Result<CommitPlan, ConsensusError> {
        if self.state != ResyncState::PendingToCommit || self.decided != Some(decided) {
            return Err(self.violation(format!(
                "commit of {decided} requested in state {:?} (decided {:?})",
                self.state, self.decided
            )));
        }
        if !decided.is_consensus_found() {
            self.state = ResyncState::CommitFailed;
            return Ok(CommitPlan::Abandon);
        }
        self.state = ResyncState::IsCommitting;
        let voters = VoteBucket::for_state(decided)
            .map(|b| self.voters(b))
            .unwrap_or_default();
        Ok(CommitPlan::Persist { voters })
    }

    /// Leave the commit with the persistence outcome.
    pub fn finish_commit(&mut self, success: bool) -> Result<(), ConsensusError> {
        if self.state != ResyncState::IsCommitting {
            return Err(self.violation(format!(
                "commit finished in state {:?}",
                self.state
            )));
        }
        self.state = if success {
            ResyncState::CommitSuccessful
        } else {
            ResyncState::CommitFailed
        };
        Ok(())
    }

    /// Fail the tally regardless of its state.
    pub fn force_failed(&mut self) {
        self.state = ResyncState::CommitFailed;
    }

    /// Replace the seeded record with the one persisted by the commit.
    pub fn set_record(&mut self, record: StateRecord) {
        self.record = record;
    }

    fn violation(&self, detail: String) -> ConsensusError {
        ConsensusError::InvariantViolation {
            item: self.hash_id,
            detail,
        }
    }
}

/// Write a decision and its reconciled timestamps into `record`, forcing
/// the transition.
pub fn apply_decision(
    record: &mut StateRecord,
    decided: ItemState,
    created_at: Timestamp,
    expires_at: Timestamp,
) -> Result<(), StoreError> {
    record.created_at = created_at;
    record.expires_at = expires_at;
    match decided {
        ItemState::Approved | ItemState::Locked => record.approve(created_at, true),
        ItemState::Revoked => record.revoke(true),
        ItemState::Declined => record.decline(true),
        _ => record.set_undefined(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(n: u32) -> NodeInfo {
        NodeInfo::new(n, format!("node-{n}"))
    }

    fn tally(positive: usize, resync_break: usize) -> ResyncingItem {
        ResyncingItem::new(
            HashId::of(b"item"),
            None,
            Quorum::new(positive, resync_break).unwrap(),
        )
    }

    #[test]
    fn vote_replaces_previous_bucket() {
        let mut t = tally(5, 5);
        t.cast_vote(&node(1), ItemState::Approved);
        t.cast_vote(&node(1), ItemState::Declined);
        assert_eq!(t.count(VoteBucket::Approved), 0);
        assert_eq!(t.count(VoteBucket::Declined), 1);
        assert_eq!(t.vote_of(&node(1)), Some(VoteBucket::Declined));
    }

    #[test]
    fn locked_counts_as_approved() {
        let mut t = tally(2, 5);
        assert_eq!(t.cast_vote(&node(1), ItemState::Locked), None);
        assert_eq!(t.cast_vote(&node(2), ItemState::Approved), Some(ItemState::Approved));
    }

    #[test]
    fn unbucketed_state_withdraws_vote() {
        let mut t = tally(5, 5);
        t.cast_vote(&node(1), ItemState::Approved);
        t.cast_vote(&node(1), ItemState::Pending);
        assert_eq!(t.vote_of(&node(1)), None);
        assert_eq!(t.count(VoteBucket::Approved), 0);
    }

    #[test]
    fn approved_majority_beats_undefined() {
        // 10 nodes, positive 6: six approvals arrive before five undefined
        let mut t = tally(6, 8);
        let mut decisions = Vec::new();
        for n in 0..6 {
            decisions.extend(t.cast_vote(&node(n), ItemState::Approved));
        }
        for n in 6..11 {
            decisions.extend(t.cast_vote(&node(n), ItemState::Undefined));
        }
        assert_eq!(decisions, vec![ItemState::Approved]);
        assert_eq!(t.resync_state(), ResyncState::PendingToCommit);
    }

    #[test]
    fn decision_is_final() {
        let mut t = tally(2, 2);
        t.cast_vote(&node(1), ItemState::Declined);
        assert_eq!(t.cast_vote(&node(2), ItemState::Declined), Some(ItemState::Declined));
        for n in 3..10 {
            assert_eq!(t.cast_vote(&node(n), ItemState::Revoked), None);
        }
        assert_eq!(t.decided(), Some(ItemState::Declined));
    }

    #[test]
    fn priority_when_several_buckets_qualify() {
        let mut t = tally(2, 2);
        for (n, bucket) in [
            (1, VoteBucket::Undefined),
            (2, VoteBucket::Undefined),
            (3, VoteBucket::Approved),
            (4, VoteBucket::Approved),
            (5, VoteBucket::Declined),
            (6, VoteBucket::Declined),
        ] {
            t.votes.insert(node(n), bucket);
        }
        assert_eq!(t.evaluate(), Some(ItemState::Declined));
        t.votes.insert(node(7), VoteBucket::Revoked);
        t.votes.insert(node(8), VoteBucket::Revoked);
        assert_eq!(t.evaluate(), Some(ItemState::Revoked));
        t.votes.retain(|_, b| *b == VoteBucket::Undefined || *b == VoteBucket::Approved);
        assert_eq!(t.evaluate(), Some(ItemState::Approved));
    }

    #[test]
    fn undefined_break_abandons_without_persisting() {
        let mut t = tally(6, 8);
        let mut decided = None;
        for n in 0..8 {
            decided = decided.or(t.cast_vote(&node(n), ItemState::Undefined));
        }
        assert_eq!(decided, Some(ItemState::Undefined));
        assert_eq!(t.begin_commit(ItemState::Undefined).unwrap(), CommitPlan::Abandon);
        assert_eq!(t.resync_state(), ResyncState::CommitFailed);
        assert!(t.is_commit_finished());
    }

    #[test]
    fn commit_snapshot_lists_deciding_voters() {
        let mut t = tally(2, 5);
        t.cast_vote(&node(3), ItemState::Undefined);
        t.cast_vote(&node(2), ItemState::Revoked);
        t.cast_vote(&node(1), ItemState::Revoked);
        let plan = t.begin_commit(ItemState::Revoked).unwrap();
        assert_eq!(plan, CommitPlan::Persist { voters: vec![node(1), node(2)] });
        assert_eq!(t.resync_state(), ResyncState::IsCommitting);
        t.finish_commit(true).unwrap();
        assert_eq!(t.resync_state(), ResyncState::CommitSuccessful);
    }

    #[test]
    fn out_of_order_commit_is_an_invariant_violation() {
        let mut t = tally(2, 2);
        assert!(matches!(
            t.begin_commit(ItemState::Approved),
            Err(ConsensusError::InvariantViolation { .. })
        ));
        assert!(t.finish_commit(true).is_err());
        assert_eq!(t.resync_state(), ResyncState::WaitForVotes);
    }

    #[test]
    fn local_vote_uses_decided_record_only() {
        let id = HashId::of(b"item");
        let q = Quorum::new(3, 3).unwrap();
        let decided = StateRecord::new(id).with_state(ItemState::Revoked);
        assert_eq!(ResyncingItem::new(id, Some(decided), q).local_vote(), ItemState::Revoked);
        let pending = StateRecord::new(id).with_state(ItemState::PendingPositive);
        assert_eq!(ResyncingItem::new(id, Some(pending), q).local_vote(), ItemState::Undefined);
    }

    #[test]
    fn apply_decision_forces_transition() {
        let mut record = StateRecord::new(HashId::of(b"r")).with_state(ItemState::Declined);
        apply_decision(&mut record, ItemState::Approved, Timestamp::new(10), Timestamp::new(99))
            .unwrap();
        assert_eq!(record.state, ItemState::Approved);
        assert_eq!(record.created_at, Timestamp::new(10));
        assert_eq!(record.expires_at, Timestamp::new(99));
    }
}
