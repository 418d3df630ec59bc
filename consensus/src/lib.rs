//! Resync consensus: reducing peer votes on one item to a decision.
//!
//! Everything here is synchronous and deterministic; timers, peer queries
//! and persistence are driven by the node crate.
//!
//! ## Module overview
//!
//! - [`quorum`]: Positive and break thresholds.
//! - [`resyncing_item`]: Per-item vote tally and commit state machine.
//! - [`timestamp_cluster`]: Reconciling peer timestamps by clustering.
//! - [`subtree`]: Completion barrier over recursive sub-item resyncs.
//! - [`error`]: Consensus error types.

pub mod error;
pub mod quorum;
pub mod resyncing_item;
pub mod subtree;
pub mod timestamp_cluster;

pub use error::ConsensusError;
pub use quorum::Quorum;
pub use resyncing_item::{apply_decision, CommitPlan, ResyncState, ResyncingItem, VoteBucket};
pub use subtree::SubtreeBarrier;
pub use timestamp_cluster::TimestampClusters;
