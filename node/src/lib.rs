//! Item node: resynchronizes item states with the network.
//!
//! The node:
//! - Dispatches inbound notifications, answering peers' resync queries
//! - Runs one [`ResyncProcessor`] per item being resynced
//! - Commits quorum decisions and reconciled timestamps to the ledger
//! - Catches up on unfinished records at startup (sanitation)

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod result_cache;
pub mod resync_processor;
pub mod sanitation;
pub mod shutdown;
pub mod tracing_spans;

pub use config::{CacheConfig, NodeConfig, ResyncConfig};
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::{ItemConsensus, Node};
pub use result_cache::ResultCache;
pub use resync_processor::{ResyncHandle, ResyncOutcome, ResyncProcessor};
pub use sanitation::{Sanitation, SanitationEvent};
pub use shutdown::ShutdownController;
