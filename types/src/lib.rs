//! Fundamental types for the itemnet node.
//!
//! This crate defines the vocabulary shared by every other crate in the
//! workspace: item identifiers, timestamps, node identities, the item state
//! lifecycle and the [`ItemResult`] snapshot nodes exchange about an item.

pub mod error;
pub mod hash;
pub mod item_result;
pub mod node_info;
pub mod state;
pub mod time;

pub use error::TypesError;
pub use hash::HashId;
pub use item_result::{ErrorRecord, ItemResult};
pub use node_info::NodeInfo;
pub use state::ItemState;
pub use time::Timestamp;
