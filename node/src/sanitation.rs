//! Startup sanitation: catching up on records a previous run left pending.
//!
//! While any item is still being sanitized the node is "sanitating" and
//! ignores ordinary item traffic; resync traffic keeps flowing so that the
//! catch-up itself can make progress.

use std::collections::HashSet;

use itemnet_types::HashId;
use tracing::{info, warn};

/// How a sanitized item's resync ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SanitationEvent {
    Done,
    Failed,
    Timeout,
}

#[derive(Debug, Default)]
pub struct Sanitation {
    pending: HashSet<HashId>,
    completed: usize,
    failed: usize,
    timed_out: usize,
}

impl Sanitation {
    /// Add items to sanitize. Returns how many were not already pending.
    pub fn begin<I: IntoIterator<Item = HashId>>(&mut self, items: I) -> usize {
        items
            .into_iter()
            .filter(|id| self.pending.insert(*id))
            .count()
    }

    /// Record the end of an item's resync. Returns true when this was the
    /// last pending item.
    pub fn finish(&mut self, id: &HashId, event: SanitationEvent) -> bool {
        if !self.pending.remove(id) {
            return false;
        }
        match event {
            SanitationEvent::Done => self.completed += 1,
            SanitationEvent::Failed => {
                self.failed += 1;
                warn!(item = %id.short(), "sanitation failed");
            }
            SanitationEvent::Timeout => {
                self.timed_out += 1;
                warn!(item = %id.short(), "sanitation timed out");
            }
        }
        if self.pending.is_empty() {
            info!(
                completed = self.completed,
                failed = self.failed,
                timed_out = self.timed_out,
                "sanitation finished"
            );
            true
        } else {
            false
        }
    }

    pub fn is_sanitating(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn contains(&self, id: &HashId) -> bool {
        self.pending.contains(id)
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_hash(byte: u8) -> HashId {
        HashId::new([byte; 32])
    }

    #[test]
    fn sanitating_until_every_item_finishes() {
        let mut s = Sanitation::default();
        assert!(!s.is_sanitating());
        assert_eq!(s.begin([make_hash(1), make_hash(2), make_hash(1)]), 2);
        assert!(s.is_sanitating());
        assert!(!s.finish(&make_hash(1), SanitationEvent::Done));
        assert!(s.finish(&make_hash(2), SanitationEvent::Timeout));
        assert!(!s.is_sanitating());
    }

    #[test]
    fn unknown_item_is_ignored() {
        let mut s = Sanitation::default();
        s.begin([make_hash(1)]);
        assert!(!s.finish(&make_hash(9), SanitationEvent::Failed));
        assert_eq!(s.remaining(), 1);
    }
}
