use thiserror::Error;

use itemnet_types::HashId;

#[derive(Debug, Error)]
pub enum ConsensusError {
    /// The tally was driven through an impossible transition.
    #[error("resync invariant violated for {item}: {detail}")]
    InvariantViolation { item: HashId, detail: String },

    #[error("invalid quorum: {0}")]
    InvalidQuorum(String),
}
