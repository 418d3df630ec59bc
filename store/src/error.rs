use thiserror::Error;

use itemnet_types::{HashId, ItemState};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(HashId),

    #[error("refusing transition of {item} from {from} to {to}")]
    InvalidTransition {
        item: HashId,
        from: ItemState,
        to: ItemState,
    },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
