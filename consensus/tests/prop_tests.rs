use std::collections::HashMap;

use itemnet_consensus::{Quorum, ResyncingItem, TimestampClusters, VoteBucket};
use itemnet_types::{HashId, ItemState, NodeInfo, Timestamp};
use proptest::prelude::*;

const WINDOW: u64 = 900;

fn arb_state() -> impl Strategy<Value = ItemState> {
    (0usize..ItemState::ALL.len()).prop_map(|i| ItemState::ALL[i])
}

fn arb_votes() -> impl Strategy<Value = Vec<(u32, ItemState)>> {
    prop::collection::vec((0u32..12, arb_state()), 0..80)
}

/// Samples in clusters spaced far beyond the window, the first cluster
/// strictly largest so no tie-break is involved. Yields the samples, the
/// expected winner and the cluster count.
fn arb_separated_clusters() -> impl Strategy<Value = (Vec<Timestamp>, Timestamp, usize)> {
    (
        prop::collection::vec(1usize..5, 1..5),
        prop::collection::vec(0u64..WINDOW / 2, 40),
    )
        .prop_map(|(counts, offsets)| {
            let biggest = counts.iter().max().copied().unwrap_or(1) + 1;
            let mut samples = Vec::new();
            let mut expected_sum = 0u64;
            let mut k = 0;
            for (i, &count) in counts.iter().enumerate() {
                let center = 1_000_000 + i as u64 * WINDOW * 10;
                let n = if i == 0 { biggest } else { count };
                for _ in 0..n {
                    let v = center + offsets[k % offsets.len()];
                    k += 1;
                    if i == 0 {
                        expected_sum += v;
                    }
                    samples.push(Timestamp::new(v));
                }
            }
            let expected = Timestamp::new(expected_sum / biggest as u64);
            (samples, expected, counts.len())
        })
}

fn node(n: u32) -> NodeInfo {
    NodeInfo::new(n, format!("node-{n}"))
}

fn tally(positive: usize, resync_break: usize) -> ResyncingItem {
    ResyncingItem::new(
        HashId::of(b"prop"),
        None,
        Quorum::new(positive, resync_break).unwrap(),
    )
}

proptest! {
    #[test]
    fn every_peer_sits_in_at_most_one_bucket(votes in arb_votes()) {
        let mut t = tally(100, 100);
        let mut last: HashMap<u32, ItemState> = HashMap::new();
        for (peer, state) in &votes {
            t.cast_vote(&node(*peer), *state);
            last.insert(*peer, *state);
        }

        let mut voting = 0;
        for (peer, state) in &last {
            let expected = VoteBucket::for_state(*state);
            prop_assert_eq!(t.vote_of(&node(*peer)), expected);
            voting += usize::from(expected.is_some());
        }
        let total: usize = [
            VoteBucket::Approved,
            VoteBucket::Revoked,
            VoteBucket::Declined,
            VoteBucket::Undefined,
        ]
        .into_iter()
        .map(|b| t.count(b))
        .sum();
        prop_assert_eq!(total, voting);
    }

    #[test]
    fn first_decision_is_final(
        votes in arb_votes(),
        positive in 1usize..6,
        resync_break in 1usize..8,
    ) {
        let mut t = tally(positive, resync_break);
        let mut decisions = Vec::new();
        for (peer, state) in &votes {
            if let Some(decided) = t.cast_vote(&node(*peer), *state) {
                // the deciding vote's bucket is the one that reached its threshold
                let bucket = VoteBucket::for_state(*state);
                prop_assert_eq!(bucket.map(VoteBucket::decided_state), Some(decided));
                decisions.push(decided);
            }
        }
        prop_assert!(decisions.len() <= 1);
        prop_assert_eq!(t.decided(), decisions.first().copied());
        prop_assert_eq!(t.is_polling_finished(), !decisions.is_empty());
    }

    #[test]
    fn separated_clusters_are_order_independent(
        (samples, shuffled, expected, clusters) in arb_separated_clusters()
            .prop_flat_map(|(samples, expected, clusters)| {
                (Just(samples.clone()), Just(samples).prop_shuffle(), Just(expected), Just(clusters))
            }),
    ) {
        let mut forward = TimestampClusters::new(WINDOW);
        forward.extend(samples);
        let mut reordered = TimestampClusters::new(WINDOW);
        reordered.extend(shuffled);

        prop_assert_eq!(forward.cluster_count(), clusters);
        prop_assert_eq!(forward.winner(), Some(expected));
        prop_assert_eq!(reordered.winner(), Some(expected));
    }
}
