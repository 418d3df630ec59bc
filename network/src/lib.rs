//! Transport layer seen by the resync machinery.
//!
//! [`Network`] moves packets between nodes and exposes the two peer RPCs the
//! commit path needs. [`NetworkTopology`] is the static node list.

pub mod error;
pub mod topology;

pub use error::NetworkError;
pub use topology::NetworkTopology;

use async_trait::async_trait;
use itemnet_store::EnvironmentSnapshot;
use itemnet_types::{HashId, ItemResult, NodeInfo};
use tracing::warn;

#[async_trait]
pub trait Network: Send + Sync {
    fn topology(&self) -> &NetworkTopology;

    /// Send one encoded packet to `to`.
    async fn deliver(&self, to: &NodeInfo, packet: Vec<u8>) -> Result<(), NetworkError>;

    /// Ask `node` for its current result on `item_id`.
    async fn get_item_state(
        &self,
        node: &NodeInfo,
        item_id: &HashId,
    ) -> Result<ItemResult, NetworkError>;

    /// Fetch the environment `node` holds for `item_id`.
    async fn get_environment(
        &self,
        node: &NodeInfo,
        item_id: &HashId,
    ) -> Result<Option<EnvironmentSnapshot>, NetworkError>;

    /// Send `packet` to every peer except `except` and the local node.
    /// Returns how many deliveries succeeded; failures are logged.
    async fn broadcast(&self, except: Option<&NodeInfo>, packet: Vec<u8>) -> usize {
        let mut sent = 0;
        for node in self.topology().peers() {
            if Some(node) == except {
                continue;
            }
            match self.deliver(node, packet.clone()).await {
                Ok(()) => sent += 1,
                Err(e) => warn!(to = %node, error = %e, "broadcast delivery failed"),
            }
        }
        sent
    }

    fn all_nodes(&self) -> Vec<NodeInfo> {
        self.topology().nodes().to_vec()
    }

    fn node_count(&self) -> usize {
        self.topology().len()
    }

    fn node_by_number(&self, number: u32) -> Option<NodeInfo> {
        self.topology().by_number(number).cloned()
    }
}
