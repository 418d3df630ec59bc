//! Nullable ledger: thread-safe in-memory storage for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use itemnet_store::{EnvironmentSnapshot, Ledger, StateRecord, StoreError};
use itemnet_types::HashId;

/// In-memory [`Ledger`]. Saving an environment reports as conflicting every
/// referenced item that is unknown or not yet decided here.
#[derive(Default)]
pub struct NullLedger {
    records: Mutex<HashMap<HashId, StateRecord>>,
    environments: Mutex<HashMap<HashId, EnvironmentSnapshot>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl NullLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_record(&self, record: StateRecord) {
        lock(&self.records).insert(record.item_id, record);
    }

    pub fn insert_environment(&self, env: EnvironmentSnapshot) {
        lock(&self.environments).insert(env.item_id, env);
    }

    pub fn record(&self, item_id: &HashId) -> Option<StateRecord> {
        lock(&self.records).get(item_id).cloned()
    }

    pub fn environment(&self, item_id: &HashId) -> Option<EnvironmentSnapshot> {
        lock(&self.environments).get(item_id).cloned()
    }

    /// Make every subsequent `save` fail with a backend error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl Ledger for NullLedger {
    fn get_record(&self, item_id: &HashId) -> Result<Option<StateRecord>, StoreError> {
        Ok(self.record(item_id))
    }

    fn find_or_create(&self, item_id: &HashId) -> Result<StateRecord, StoreError> {
        Ok(lock(&self.records)
            .entry(*item_id)
            .or_insert_with(|| StateRecord::new(*item_id))
            .clone())
    }

    fn save(&self, record: &StateRecord) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("save disabled".into()));
        }
        self.insert_record(record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_environment(
        &self,
        item_id: &HashId,
    ) -> Result<Option<EnvironmentSnapshot>, StoreError> {
        Ok(self.environment(item_id))
    }

    fn remove_environment(&self, item_id: &HashId) -> Result<bool, StoreError> {
        Ok(lock(&self.environments).remove(item_id).is_some())
    }

    fn save_environment(&self, env: &EnvironmentSnapshot) -> Result<Vec<HashId>, StoreError> {
        self.insert_environment(env.clone());
        let records = lock(&self.records);
        Ok(env
            .references
            .iter()
            .filter(|id| {
                records
                    .get(*id)
                    .map_or(true, |r| !r.state.is_consensus_found())
            })
            .copied()
            .collect())
    }

    fn unfinished_records(&self) -> Result<Vec<StateRecord>, StoreError> {
        let mut unfinished: Vec<StateRecord> = lock(&self.records)
            .values()
            .filter(|r| r.state.is_pending())
            .cloned()
            .collect();
        unfinished.sort_by_key(|r| r.item_id);
        Ok(unfinished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemnet_types::ItemState;

    fn make_hash(byte: u8) -> HashId {
        HashId::new([byte; 32])
    }

    #[test]
    fn find_or_create_persists_undefined_record() {
        let ledger = NullLedger::new();
        let record = ledger.find_or_create(&make_hash(1)).unwrap();
        assert_eq!(record.state, ItemState::Undefined);
        assert!(ledger.record(&make_hash(1)).is_some());
    }

    #[test]
    fn failing_saves() {
        let ledger = NullLedger::new();
        ledger.fail_saves(true);
        assert!(ledger.save(&StateRecord::new(make_hash(1))).is_err());
        assert_eq!(ledger.save_count(), 0);
    }

    #[test]
    fn environment_conflicts_are_undecided_references() {
        let ledger = NullLedger::new();
        ledger.insert_record(StateRecord::new(make_hash(2)).with_state(ItemState::Approved));
        ledger.insert_record(StateRecord::new(make_hash(3)).with_state(ItemState::Pending));
        let env = EnvironmentSnapshot::new(
            make_hash(1),
            vec![1, 2, 3],
            vec![make_hash(2), make_hash(3), make_hash(4)],
        );
        let conflicts = ledger.save_environment(&env).unwrap();
        assert_eq!(conflicts, vec![make_hash(3), make_hash(4)]);
        assert!(ledger.has_environment(&make_hash(1)).unwrap());
    }

    #[test]
    fn unfinished_records_are_pending_ones() {
        let ledger = NullLedger::new();
        ledger.insert_record(StateRecord::new(make_hash(1)).with_state(ItemState::PendingPositive));
        ledger.insert_record(StateRecord::new(make_hash(2)).with_state(ItemState::Approved));
        let unfinished = ledger.unfinished_records().unwrap();
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].item_id, make_hash(1));
    }
}
