//! Item lifecycle states.
//!
//! The ordinals are part of the binary notification protocol and must never
//! be renumbered: peers running older builds decode states by ordinal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// Lifecycle state of an item as known by one node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ItemState {
    /// Nothing is known about the item.
    Undefined = 0,
    /// Checking is in progress.
    Pending = 1,
    /// Local check passed, network consensus not yet reached.
    PendingPositive = 2,
    /// Local check failed, network consensus not yet reached.
    PendingNegative = 3,
    /// Network approved the item.
    Approved = 4,
    /// Approved and locked for revocation by another item.
    Locked = 5,
    /// Previously approved, now revoked.
    Revoked = 6,
    /// Network declined the item.
    Declined = 7,
    /// Dropped without a decision.
    Discarded = 8,
    /// Reserved by an item that will create it on approval.
    LockedForCreation = 9,
    /// Reserved for creation, then revoked within the same transaction.
    LockedForCreationRevoked = 10,
}

impl ItemState {
    pub const ALL: [ItemState; 11] = [
        Self::Undefined,
        Self::Pending,
        Self::PendingPositive,
        Self::PendingNegative,
        Self::Approved,
        Self::Locked,
        Self::Revoked,
        Self::Declined,
        Self::Discarded,
        Self::LockedForCreation,
        Self::LockedForCreationRevoked,
    ];

    /// Whether the item is still being processed.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::Pending
                | Self::PendingPositive
                | Self::PendingNegative
                | Self::LockedForCreation
                | Self::LockedForCreationRevoked
        )
    }

    pub fn is_positive(&self) -> bool {
        matches!(
            self,
            Self::PendingPositive | Self::Approved | Self::Locked | Self::LockedForCreation
        )
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved | Self::Locked)
    }

    /// Whether the network has reached a final decision on the item.
    pub fn is_consensus_found(&self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Locked | Self::Revoked | Self::Declined
        )
    }

    pub fn ordinal(&self) -> u8 {
        *self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Result<Self, TypesError> {
        Self::ALL
            .get(ordinal as usize)
            .copied()
            .ok_or(TypesError::UnknownStateOrdinal(ordinal))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Undefined => "UNDEFINED",
            Self::Pending => "PENDING",
            Self::PendingPositive => "PENDING_POSITIVE",
            Self::PendingNegative => "PENDING_NEGATIVE",
            Self::Approved => "APPROVED",
            Self::Locked => "LOCKED",
            Self::Revoked => "REVOKED",
            Self::Declined => "DECLINED",
            Self::Discarded => "DISCARDED",
            Self::LockedForCreation => "LOCKED_FOR_CREATION",
            Self::LockedForCreationRevoked => "LOCKED_FOR_CREATION_REVOKED",
        }
    }
}

impl FromStr for ItemState {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|state| state.name() == s)
            .copied()
            .ok_or_else(|| TypesError::UnknownStateName(s.to_string()))
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
