//! Nullable infrastructure for deterministic testing.
//!
//! Test-friendly implementations of the node's external collaborators:
//! - [`NullNetwork`]: records outbound packets and answers resync requests
//!   and peer queries from programmed scripts
//! - [`NullLedger`]: in-memory records and environments with injectable
//!   save failures
//!
//! Nothing here touches the filesystem or a socket.

pub mod ledger;
pub mod network;

pub use ledger::NullLedger;
pub use network::NullNetwork;
