//! Ledger abstraction for item state records.
//!
//! Every ledger backend implements [`Ledger`]. The resync machinery only
//! depends on the trait; the persistence format is up to the backend.

pub mod environment;
pub mod error;
pub mod record;

pub use environment::EnvironmentSnapshot;
pub use error::StoreError;
pub use record::StateRecord;

use itemnet_types::HashId;

/// Durable storage of item records and their environments.
pub trait Ledger: Send + Sync {
    fn get_record(&self, item_id: &HashId) -> Result<Option<StateRecord>, StoreError>;

    /// Load the record for `item_id`, creating an `UNDEFINED` one if absent.
    fn find_or_create(&self, item_id: &HashId) -> Result<StateRecord, StoreError>;

    fn save(&self, record: &StateRecord) -> Result<(), StoreError>;

    fn get_environment(&self, item_id: &HashId)
        -> Result<Option<EnvironmentSnapshot>, StoreError>;

    /// Returns whether an environment was removed.
    fn remove_environment(&self, item_id: &HashId) -> Result<bool, StoreError>;

    /// Persist an environment fetched from a peer. Returns the ids of
    /// referenced items whose local state conflicts with it and must be
    /// resynced themselves.
    fn save_environment(&self, env: &EnvironmentSnapshot) -> Result<Vec<HashId>, StoreError>;

    /// Records left in a pending state by a previous run.
    fn unfinished_records(&self) -> Result<Vec<StateRecord>, StoreError>;

    fn has_environment(&self, item_id: &HashId) -> Result<bool, StoreError> {
        self.get_environment(item_id).map(|env| env.is_some())
    }
}
