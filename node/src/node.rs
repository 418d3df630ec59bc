//! The item node: resync registry plus inbound notification dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, warn, Instrument};

use itemnet_consensus::Quorum;
use itemnet_network::Network;
use itemnet_protocol::{
    decode_packet, encode_packet, encode_packets, ItemNotification, Notification,
    ResyncNotification,
};
use itemnet_store::Ledger;
use itemnet_types::{HashId, ItemResult, ItemState, NodeInfo};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::metrics::NodeMetrics;
use crate::result_cache::ResultCache;
use crate::resync_processor::{ResyncHandle, ResyncOutcome, ResyncProcessor};
use crate::sanitation::{Sanitation, SanitationEvent};
use crate::tracing_spans::notification_recv_span;

/// Business-rule engine receiving ordinary item traffic.
pub trait ItemConsensus: Send + Sync {
    fn on_item_notification(&self, notification: &Notification);
}

/// State shared by the node handle and every resync processor.
pub(crate) struct NodeCore {
    pub(crate) config: NodeConfig,
    pub(crate) quorum: Quorum,
    pub(crate) network: Arc<dyn Network>,
    pub(crate) ledger: Arc<dyn Ledger>,
    pub(crate) metrics: NodeMetrics,
    pub(crate) cache: Mutex<ResultCache>,
    sanitation: Mutex<Sanitation>,
    resyncs: Mutex<HashMap<HashId, Arc<ResyncProcessor>>>,
    item_consensus: Option<Arc<dyn ItemConsensus>>,
}

impl NodeCore {
    pub(crate) fn local_node(&self) -> &NodeInfo {
        self.network.topology().local()
    }

    /// Get or create the processor for `item_id`. An existing one is
    /// restarted instead of duplicated.
    pub(crate) async fn resync(self: &Arc<Self>, item_id: HashId) -> Result<ResyncHandle, NodeError> {
        let mut registry = self.resyncs.lock().await;
        if let Some(existing) = registry.get(&item_id).cloned() {
            existing.restart_resync().await;
            return Ok(existing.handle());
        }
        let processor = ResyncProcessor::start(item_id, self.clone()).await?;
        let handle = processor.handle();
        registry.insert(item_id, processor);
        self.metrics.active_resyncs.set(registry.len() as i64);
        Ok(handle)
    }

    /// Drop `processor` from the registry if it is still the registered one.
    pub(crate) async fn retire(&self, item_id: HashId, processor: &Arc<ResyncProcessor>) {
        let mut registry = self.resyncs.lock().await;
        if registry
            .get(&item_id)
            .is_some_and(|current| Arc::ptr_eq(current, processor))
        {
            registry.remove(&item_id);
        }
        self.metrics.active_resyncs.set(registry.len() as i64);
    }

    pub(crate) async fn on_resync_finished(&self, item_id: HashId, outcome: ResyncOutcome) {
        let event = match outcome {
            ResyncOutcome::Done(_) => {
                self.metrics.resyncs_done.inc();
                SanitationEvent::Done
            }
            ResyncOutcome::Failed => {
                self.metrics.resyncs_failed.inc();
                SanitationEvent::Failed
            }
            ResyncOutcome::TimedOut => {
                self.metrics.resyncs_timed_out.inc();
                SanitationEvent::Timeout
            }
        };
        let mut sanitation = self.sanitation.lock().await;
        sanitation.finish(&item_id, event);
        self.metrics.sanitating_items.set(sanitation.remaining() as i64);
    }

    /// This node's current result for an item: the cache first, then the
    /// ledger, otherwise `UNDEFINED`.
    pub(crate) async fn local_result(&self, item_id: &HashId) -> Result<ItemResult, NodeError> {
        if let Some(cached) = self.cache.lock().await.get(item_id) {
            return Ok(cached);
        }
        match self.ledger.get_record(item_id)? {
            Some(record) => {
                let has_env = self.ledger.has_environment(item_id)?;
                Ok(record.to_item_result(has_env))
            }
            None => Ok(ItemResult::UNDEFINED),
        }
    }

    async fn resync_processor(&self, item_id: &HashId) -> Option<Arc<ResyncProcessor>> {
        self.resyncs.lock().await.get(item_id).cloned()
    }

    async fn reply(&self, to: &NodeInfo, notification: Notification) {
        let packet = match encode_packet(self.local_node(), &[notification]) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "failed to encode reply");
                return;
            }
        };
        if let Err(e) = self.network.deliver(to, packet).await {
            warn!(to = %to, error = %e, "reply not delivered");
        }
    }
}

/// Cloneable handle to a running node.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeCore>,
}

impl Node {
    pub fn new(
        config: NodeConfig,
        network: Arc<dyn Network>,
        ledger: Arc<dyn Ledger>,
    ) -> Result<Self, NodeError> {
        Self::build(config, network, ledger, None)
    }

    /// Like [`Node::new`], forwarding item and parcel traffic to `consensus`.
    pub fn with_item_consensus(
        config: NodeConfig,
        network: Arc<dyn Network>,
        ledger: Arc<dyn Ledger>,
        consensus: Arc<dyn ItemConsensus>,
    ) -> Result<Self, NodeError> {
        Self::build(config, network, ledger, Some(consensus))
    }

    fn build(
        config: NodeConfig,
        network: Arc<dyn Network>,
        ledger: Arc<dyn Ledger>,
        item_consensus: Option<Arc<dyn ItemConsensus>>,
    ) -> Result<Self, NodeError> {
        config.check_topology(network.topology())?;
        let quorum = config.resync.quorum(network.node_count())?;
        let cache = ResultCache::new(
            config.cache.capacity,
            Duration::from_secs(config.cache.max_age_secs),
        );
        info!(
            local = %network.topology().local(),
            nodes = network.node_count(),
            positive = quorum.positive,
            resync_break = quorum.resync_break,
            "node created"
        );
        Ok(Self {
            inner: Arc::new(NodeCore {
                config,
                quorum,
                network,
                ledger,
                metrics: NodeMetrics::new()?,
                cache: Mutex::new(cache),
                sanitation: Mutex::new(Sanitation::default()),
                resyncs: Mutex::new(HashMap::new()),
                item_consensus,
            }),
        })
    }

    pub fn local_node(&self) -> &NodeInfo {
        self.inner.local_node()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    pub fn quorum(&self) -> Quorum {
        self.inner.quorum
    }

    pub fn metrics(&self) -> &NodeMetrics {
        &self.inner.metrics
    }

    /// Start resyncing `item_id`, or restart polling if it is already being
    /// resynced. The handle resolves when the resync finalizes.
    pub async fn resync(&self, item_id: HashId) -> Result<ResyncHandle, NodeError> {
        self.inner.resync(item_id).await
    }

    pub async fn active_resyncs(&self) -> usize {
        self.inner.resyncs.lock().await.len()
    }

    pub async fn is_sanitating(&self) -> bool {
        self.inner.sanitation.lock().await.is_sanitating()
    }

    /// The node's current result for an item.
    pub async fn check_item(&self, item_id: &HashId) -> Result<ItemResult, NodeError> {
        self.inner.local_result(item_id).await
    }

    /// Resync every record a previous run left unfinished. The node
    /// sanitates until all of them have finished.
    pub async fn sanitize_unfinished(&self) -> Result<Vec<ResyncHandle>, NodeError> {
        let records = self.inner.ledger.unfinished_records()?;
        let ids: Vec<HashId> = records.iter().map(|r| r.item_id).collect();
        {
            let mut sanitation = self.inner.sanitation.lock().await;
            sanitation.begin(ids.iter().copied());
            self.inner.metrics.sanitating_items.set(sanitation.remaining() as i64);
        }
        info!(count = ids.len(), "sanitizing unfinished records");

        let mut handles = Vec::with_capacity(ids.len());
        for id in ids {
            match self.resync(id).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    warn!(item = %id.short(), error = %e, "sanitation resync not started");
                    self.inner
                        .on_resync_finished(id, ResyncOutcome::Failed)
                        .await;
                }
            }
        }
        Ok(handles)
    }

    /// Encode and broadcast notifications to every peer. Returns the number
    /// of successful deliveries.
    pub async fn broadcast_notifications(
        &self,
        notifications: &[Notification],
    ) -> Result<usize, NodeError> {
        let mut sent = 0;
        for packet in encode_packets(self.local_node(), notifications)? {
            sent += self.inner.network.broadcast(None, packet).await;
        }
        Ok(sent)
    }

    /// Decode one inbound packet and dispatch its notifications.
    pub async fn on_packet(&self, data: &[u8]) -> Result<usize, NodeError> {
        let topology = self.inner.network.topology();
        let packet = match decode_packet(data, |n| topology.by_number(n).cloned()) {
            Ok(packet) => packet,
            Err(e) => {
                self.inner.metrics.packets_rejected.inc();
                warn!(error = %e, len = data.len(), "notification packet rejected");
                return Err(e.into());
            }
        };
        self.inner
            .metrics
            .notifications_skipped
            .inc_by(packet.skipped as u64);
        let count = packet.notifications.len();
        for notification in packet.notifications {
            self.on_notification(notification).await;
        }
        Ok(count)
    }

    /// Route one notification. Resync traffic is always processed; item and
    /// parcel traffic is dropped while sanitating.
    pub async fn on_notification(&self, notification: Notification) {
        self.inner.metrics.notifications_received.inc();
        let span = notification_recv_span(&notification.sender().to_string(), notification.kind_name());
        async {
            match &notification {
                Notification::Resync(resync) => self.on_resync_notification(resync).await,
                Notification::Item(item) => {
                    if self.gate(&notification).await {
                        self.on_item_notification(item).await;
                        self.forward(&notification);
                    }
                }
                Notification::Parcel(parcel) => {
                    if self.gate(&notification).await {
                        self.on_item_notification(&parcel.item).await;
                        self.forward(&notification);
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn on_resync_notification(&self, resync: &ResyncNotification) {
        if resync.answer_is_requested() {
            let state = match self.inner.local_result(&resync.item_id).await {
                Ok(result) => result.state(),
                Err(e) => {
                    warn!(item = %resync.item_id.short(), error = %e, "local state unavailable");
                    ItemState::Undefined
                }
            };
            let has_env = self
                .inner
                .ledger
                .has_environment(&resync.item_id)
                .unwrap_or(false);
            let answer = ResyncNotification::answer(
                self.local_node().clone(),
                resync.item_id,
                state,
                has_env,
            );
            self.inner.reply(&resync.from, answer.into()).await;
        } else if let Some(processor) = self.inner.resync_processor(&resync.item_id).await {
            processor.obtain_answer(resync).await;
        } else {
            debug!(item = %resync.item_id.short(), from = %resync.from, "answer for unknown resync");
        }
    }

    async fn on_item_notification(&self, item: &ItemNotification) {
        if !item.answer_is_requested {
            return;
        }
        match self.inner.local_result(&item.item_id).await {
            Ok(result) => {
                let reply =
                    ItemNotification::new(self.local_node().clone(), item.item_id, result, false);
                self.inner.reply(&item.from, reply.into()).await;
            }
            Err(e) => warn!(item = %item.item_id.short(), error = %e, "cannot answer item query"),
        }
    }

    /// Returns false when the notification must be dropped.
    async fn gate(&self, notification: &Notification) -> bool {
        if self.is_sanitating().await {
            self.inner.metrics.notifications_gated.inc();
            debug!(item = %notification.item_id().short(), "sanitating, notification dropped");
            return false;
        }
        true
    }

    fn forward(&self, notification: &Notification) {
        if let Some(consensus) = &self.inner.item_consensus {
            consensus.on_item_notification(notification);
        }
    }

    /// Consume inbound packets until the channel closes or shutdown fires.
    pub async fn run(&self, mut inbound: mpsc::Receiver<Vec<u8>>, mut shutdown: broadcast::Receiver<()>) {
        info!(local = %self.local_node(), "node running");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("shutdown signal received, inbound loop exiting");
                    break;
                }
                packet = inbound.recv() => match packet {
                    Some(packet) => {
                        // errors are logged and counted by on_packet
                        let _ = self.on_packet(&packet).await;
                    }
                    None => {
                        debug!("inbound channel closed");
                        break;
                    }
                },
            }
        }
    }
}
