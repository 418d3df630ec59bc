//! Reconciling timestamps reported by different peers.
//!
//! Peers that agree on an item may still disagree on its creation or
//! expiration time by a few seconds or minutes. Samples are grouped into
//! clusters of nearby values and the most populous cluster wins.

use itemnet_types::Timestamp;

#[derive(Clone, Debug)]
struct Cluster {
    sum: u128,
    count: u64,
    /// Insertion sequence of the oldest sample in this cluster.
    seq: u64,
}

impl Cluster {
    fn representative(&self) -> u64 {
        // count >= 1 for every stored cluster
        (self.sum / u128::from(self.count)) as u64
    }
}

/// Clusters of timestamps lying within `window` seconds of each other.
#[derive(Clone, Debug)]
pub struct TimestampClusters {
    window: u64,
    clusters: Vec<Cluster>,
    next_seq: u64,
}

impl TimestampClusters {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window: window_secs,
            clusters: Vec::new(),
            next_seq: 0,
        }
    }

    /// Add one sample. It joins every cluster whose representative is within
    /// the window (inclusive); all of those collapse into one cluster.
    pub fn add(&mut self, ts: Timestamp) {
        let value = ts.as_secs();
        let seq = self.next_seq;
        self.next_seq += 1;

        let mut merged = Cluster {
            sum: u128::from(value),
            count: 1,
            seq,
        };
        let window = self.window;
        self.clusters.retain(|c| {
            if c.representative().abs_diff(value) <= window {
                merged.sum += c.sum;
                merged.count += c.count;
                merged.seq = merged.seq.min(c.seq);
                false
            } else {
                true
            }
        });
        self.clusters.push(merged);
    }

    pub fn extend<I: IntoIterator<Item = Timestamp>>(&mut self, samples: I) {
        for ts in samples {
            self.add(ts);
        }
    }

    /// Representative of the largest cluster; ties go to the cluster that
    /// started earliest.
    pub fn winner(&self) -> Option<Timestamp> {
        self.clusters
            .iter()
            .max_by(|a, b| a.count.cmp(&b.count).then(b.seq.cmp(&a.seq)))
            .map(|c| Timestamp::new(c.representative()))
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}
