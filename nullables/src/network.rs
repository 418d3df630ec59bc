//! Nullable network: records packets and answers from scripts.
//!
//! Every delivered packet is recorded. Resync requests addressed to a peer
//! with a scripted vote are answered by pushing an encoded answer packet,
//! with that peer as origin, into the attached inbound channel, as if the
//! peer had replied over the wire.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use itemnet_network::{Network, NetworkError, NetworkTopology};
use itemnet_protocol::{decode_packet, encode_packet, Notification, ResyncNotification};
use itemnet_store::EnvironmentSnapshot;
use itemnet_types::{HashId, ItemResult, ItemState, NodeInfo};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Copy)]
struct ScriptedVote {
    state: ItemState,
    has_environment: bool,
}

pub struct NullNetwork {
    topology: NetworkTopology,
    sent: Mutex<Vec<(NodeInfo, Vec<u8>)>>,
    inbound: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    votes: Mutex<HashMap<(u32, HashId), ScriptedVote>>,
    results: Mutex<HashMap<(u32, HashId), ItemResult>>,
    environments: Mutex<HashMap<(u32, HashId), EnvironmentSnapshot>>,
    unreachable: Mutex<HashSet<u32>>,
    state_queries: AtomicUsize,
}

impl NullNetwork {
    pub fn new(topology: NetworkTopology) -> Self {
        Self {
            topology,
            sent: Mutex::new(Vec::new()),
            inbound: Mutex::new(None),
            votes: Mutex::new(HashMap::new()),
            results: Mutex::new(HashMap::new()),
            environments: Mutex::new(HashMap::new()),
            unreachable: Mutex::new(HashSet::new()),
            state_queries: AtomicUsize::new(0),
        }
    }

    /// Topology of `count` nodes numbered from 0, the local one being 0.
    pub fn with_nodes(count: u32) -> Self {
        let nodes: Vec<NodeInfo> = (0..count)
            .map(|n| NodeInfo::new(n, format!("node-{n}")))
            .collect();
        let local = nodes
            .first()
            .cloned()
            .unwrap_or_else(|| NodeInfo::new(0, "node-0"));
        Self::new(NetworkTopology::new(local, nodes))
    }

    /// Channel scripted answers are pushed into, normally the one
    /// `Node::run` consumes.
    pub fn attach_inbound(&self, tx: mpsc::Sender<Vec<u8>>) {
        *lock(&self.inbound) = Some(tx);
    }

    /// Peer `number` answers resync requests for `item_id` with `state`.
    pub fn script_vote(&self, number: u32, item_id: HashId, state: ItemState, has_environment: bool) {
        lock(&self.votes).insert(
            (number, item_id),
            ScriptedVote {
                state,
                has_environment,
            },
        );
    }

    /// Peer `number` reports `result` when queried for `item_id`.
    pub fn script_result(&self, number: u32, item_id: HashId, result: ItemResult) {
        lock(&self.results).insert((number, item_id), result);
    }

    pub fn script_environment(&self, number: u32, env: EnvironmentSnapshot) {
        lock(&self.environments).insert((number, env.item_id), env);
    }

    /// Deliveries and queries to `number` fail from now on.
    pub fn set_unreachable(&self, number: u32) {
        lock(&self.unreachable).insert(number);
    }

    /// Every packet delivered so far with its destination.
    pub fn sent(&self) -> Vec<(NodeInfo, Vec<u8>)> {
        lock(&self.sent).clone()
    }

    /// Delivered notifications, decoded, with their destination.
    pub fn sent_notifications(&self) -> Vec<(NodeInfo, Notification)> {
        self.sent()
            .into_iter()
            .filter_map(|(to, packet)| {
                decode_packet(&packet, |n| self.topology.by_number(n).cloned())
                    .ok()
                    .map(|decoded| (to, decoded.notifications))
            })
            .flat_map(|(to, ns)| ns.into_iter().map(move |n| (to.clone(), n)))
            .collect()
    }

    /// Resync requests sent to `number`.
    pub fn requests_to(&self, number: u32) -> usize {
        self.sent_notifications()
            .iter()
            .filter(|(to, n)| {
                to.number == number
                    && matches!(n, Notification::Resync(r) if r.answer_is_requested())
            })
            .count()
    }

    /// Number of `get_item_state` calls received.
    pub fn state_queries(&self) -> usize {
        self.state_queries.load(Ordering::SeqCst)
    }

    pub fn clear_sent(&self) {
        lock(&self.sent).clear();
    }

    fn check_reachable(&self, node: &NodeInfo) -> Result<(), NetworkError> {
        if lock(&self.unreachable).contains(&node.number) {
            return Err(NetworkError::Unreachable(node.to_string()));
        }
        Ok(())
    }

    /// Answer packets `to` would send back for the requests in `packet`.
    fn scripted_replies(&self, to: &NodeInfo, packet: &[u8]) -> Vec<Vec<u8>> {
        let Ok(decoded) = decode_packet(packet, |n| self.topology.by_number(n).cloned()) else {
            return Vec::new();
        };
        let votes = lock(&self.votes);
        decoded
            .notifications
            .iter()
            .filter_map(|n| match n {
                Notification::Resync(r) if r.answer_is_requested() => votes
                    .get(&(to.number, r.item_id))
                    .map(|vote| {
                        ResyncNotification::answer(
                            to.clone(),
                            r.item_id,
                            vote.state,
                            vote.has_environment,
                        )
                    }),
                _ => None,
            })
            .filter_map(|answer| encode_packet(to, &[Notification::from(answer)]).ok())
            .collect()
    }
}

#[async_trait]
impl Network for NullNetwork {
    fn topology(&self) -> &NetworkTopology {
        &self.topology
    }

    async fn deliver(&self, to: &NodeInfo, packet: Vec<u8>) -> Result<(), NetworkError> {
        self.check_reachable(to)?;
        let replies = self.scripted_replies(to, &packet);
        lock(&self.sent).push((to.clone(), packet));

        let inbound = lock(&self.inbound).clone();
        if let Some(tx) = inbound {
            for reply in replies {
                if tx.send(reply).await.is_err() {
                    debug!("inbound channel closed, scripted reply dropped");
                    break;
                }
            }
        }
        Ok(())
    }

    async fn get_item_state(
        &self,
        node: &NodeInfo,
        item_id: &HashId,
    ) -> Result<ItemResult, NetworkError> {
        self.state_queries.fetch_add(1, Ordering::SeqCst);
        self.check_reachable(node)?;
        Ok(lock(&self.results)
            .get(&(node.number, *item_id))
            .cloned()
            .unwrap_or(ItemResult::UNDEFINED))
    }

    async fn get_environment(
        &self,
        node: &NodeInfo,
        item_id: &HashId,
    ) -> Result<Option<EnvironmentSnapshot>, NetworkError> {
        self.check_reachable(node)?;
        Ok(lock(&self.environments).get(&(node.number, *item_id)).cloned())
    }
}
