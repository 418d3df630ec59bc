//! Vote thresholds for resync decisions.

use serde::{Deserialize, Serialize};

use crate::ConsensusError;

/// `positive`: votes a REVOKED, DECLINED or APPROVED bucket needs to win.
/// `resync_break`: UNDEFINED votes after which the resync is abandoned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quorum {
    pub positive: usize,
    pub resync_break: usize,
}

impl Quorum {
    pub fn new(positive: usize, resync_break: usize) -> Result<Self, ConsensusError> {
        if positive == 0 || resync_break == 0 {
            return Err(ConsensusError::InvalidQuorum(format!(
                "thresholds must be positive (positive={positive}, break={resync_break})"
            )));
        }
        Ok(Self {
            positive,
            resync_break,
        })
    }

    /// Derive thresholds from the network size: `ceil(nodes * ratio)`,
    /// never below one vote.
    pub fn from_ratios(
        node_count: usize,
        positive_ratio: f64,
        break_ratio: f64,
    ) -> Result<Self, ConsensusError> {
        if !(0.0..=1.0).contains(&positive_ratio) || !(0.0..=1.0).contains(&break_ratio) {
            return Err(ConsensusError::InvalidQuorum(format!(
                "ratios must lie in [0, 1] (positive={positive_ratio}, break={break_ratio})"
            )));
        }
        let threshold = |ratio: f64| ((node_count as f64 * ratio).ceil() as usize).max(1);
        Self::new(threshold(positive_ratio), threshold(break_ratio))
    }
}
