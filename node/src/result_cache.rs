//! Recently computed item results.
//!
//! Bounded FIFO map with a maximum entry age. Commits write the decided
//! result here so that resync queries are answered without a ledger read.
//! When full, the oldest entry is evicted.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use itemnet_types::{HashId, ItemResult};
use tokio::time::Instant;

struct Entry {
    result: ItemResult,
    inserted_at: Instant,
    seq: u64,
}

pub struct ResultCache {
    entries: HashMap<HashId, Entry>,
    /// Insertion order; stale pairs (superseded seq) are skipped on eviction.
    order: VecDeque<(HashId, u64)>,
    capacity: usize,
    max_age: Duration,
    next_seq: u64,
}

impl ResultCache {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity.min(1024)),
            order: VecDeque::new(),
            capacity,
            max_age,
            next_seq: 0,
        }
    }

    /// Insert or replace the result for `id`. A replaced entry moves to the
    /// back of the eviction order.
    pub fn put(&mut self, id: HashId, result: ItemResult) {
        if self.capacity == 0 {
            return;
        }
        if !self.entries.contains_key(&id) {
            while self.entries.len() >= self.capacity {
                if !self.evict_oldest() {
                    break;
                }
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            id,
            Entry {
                result,
                inserted_at: Instant::now(),
                seq,
            },
        );
        self.order.push_back((id, seq));
        self.compact();
    }

    /// The cached result, unless it is older than the maximum age.
    pub fn get(&self, id: &HashId) -> Option<ItemResult> {
        self.entries
            .get(id)
            .filter(|e| e.inserted_at.elapsed() <= self.max_age)
            .map(|e| e.result.clone())
    }

    pub fn remove(&mut self, id: &HashId) -> Option<ItemResult> {
        self.entries.remove(id).map(|e| e.result)
    }

    /// Drop every entry older than the maximum age.
    pub fn purge_expired(&mut self) -> usize {
        let max_age = self.max_age;
        let before = self.entries.len();
        self.entries.retain(|_, e| e.inserted_at.elapsed() <= max_age);
        self.compact();
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_oldest(&mut self) -> bool {
        while let Some((id, seq)) = self.order.pop_front() {
            if self.entries.get(&id).is_some_and(|e| e.seq == seq) {
                self.entries.remove(&id);
                return true;
            }
        }
        false
    }

    /// Keep the order queue from growing without bound on repeated updates.
    fn compact(&mut self) {
        if self.order.len() > self.entries.len() * 2 + 16 {
            let entries = &self.entries;
            self.order
                .retain(|(id, seq)| entries.get(id).is_some_and(|e| e.seq == *seq));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemnet_types::ItemState;

    fn make_hash(byte: u8) -> HashId {
        HashId::new([byte; 32])
    }

    fn result(state: ItemState) -> ItemResult {
        ItemResult::new(state, true, None, None)
    }

    #[test]
    fn put_and_get() {
        let mut cache = ResultCache::new(10, Duration::from_secs(60));
        cache.put(make_hash(1), result(ItemState::Approved));
        assert_eq!(cache.get(&make_hash(1)).map(|r| r.state()), Some(ItemState::Approved));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn replace_keeps_single_entry() {
        let mut cache = ResultCache::new(10, Duration::from_secs(60));
        cache.put(make_hash(1), result(ItemState::Pending));
        cache.put(make_hash(1), result(ItemState::Declined));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&make_hash(1)).map(|r| r.state()), Some(ItemState::Declined));
    }

    #[test]
    fn fifo_eviction_order() {
        let mut cache = ResultCache::new(2, Duration::from_secs(60));
        cache.put(make_hash(1), result(ItemState::Approved));
        cache.put(make_hash(2), result(ItemState::Approved));
        // refreshing 1 makes 2 the oldest
        cache.put(make_hash(1), result(ItemState::Revoked));
        cache.put(make_hash(3), result(ItemState::Approved));
        assert!(cache.get(&make_hash(2)).is_none());
        assert!(cache.get(&make_hash(1)).is_some());
        assert!(cache.get(&make_hash(3)).is_some());
    }

    #[test]
    fn zero_capacity() {
        let mut cache = ResultCache::new(0, Duration::from_secs(60));
        cache.put(make_hash(1), result(ItemState::Approved));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let mut cache = ResultCache::new(10, Duration::from_secs(5));
        cache.put(make_hash(1), result(ItemState::Approved));
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.put(make_hash(2), result(ItemState::Approved));
        assert!(cache.get(&make_hash(1)).is_none());
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}
