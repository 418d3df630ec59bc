//! Per-item resync orchestration.
//!
//! A [`ResyncProcessor`] polls every peer for its opinion on one item,
//! feeds the answers into a [`ResyncingItem`] tally and, once a quorum is
//! reached, commits the decision to the ledger. Afterwards it reconciles the
//! item's environment (possibly resyncing conflicting sub-items) and
//! finalizes, publishing a [`ResyncOutcome`] to every [`ResyncHandle`].
//!
//! Tasks per processor:
//! - poller: sends resync requests on the configured schedule until the
//!   deadline passes;
//! - expiry: one-shot backstop that finalizes at the deadline;
//! - commit: spawned on decision, never aborted;
//! - finalize: always runs in its own task so that aborting the poller or
//!   the expiry timer can never interrupt it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::stream::{FuturesUnordered, StreamExt};
use rand::seq::SliceRandom;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn, Instrument};

use itemnet_consensus::{
    apply_decision, CommitPlan, ResyncState, ResyncingItem, SubtreeBarrier, TimestampClusters,
};
use itemnet_protocol::{encode_packet, Notification, ResyncNotification};
use itemnet_store::StateRecord;
use itemnet_types::{HashId, ItemResult, ItemState, NodeInfo, Timestamp};

use crate::node::NodeCore;
use crate::tracing_spans::{resync_commit_span, resync_span};
use crate::NodeError;

/// Terminal result of one resync.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResyncOutcome {
    /// The decision was committed.
    Done(ItemState),
    /// No consensus state was reached, or persisting it failed.
    Failed,
    /// The deadline passed without a quorum.
    TimedOut,
}

impl ResyncOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// Awaitable view of a running resync.
#[derive(Clone, Debug)]
pub struct ResyncHandle {
    item_id: HashId,
    rx: watch::Receiver<Option<ResyncOutcome>>,
}

impl ResyncHandle {
    pub fn item_id(&self) -> HashId {
        self.item_id
    }

    /// The outcome if the resync already finished.
    pub fn try_outcome(&self) -> Option<ResyncOutcome> {
        *self.rx.borrow()
    }

    /// Wait for the resync to finish.
    pub async fn outcome(&mut self) -> ResyncOutcome {
        loop {
            if let Some(outcome) = *self.rx.borrow_and_update() {
                return outcome;
            }
            if self.rx.changed().await.is_err() {
                // processor dropped without publishing
                return self.try_outcome().unwrap_or(ResyncOutcome::Failed);
            }
        }
    }
}

struct ProcessorState {
    expires_at: Instant,
    answered: HashSet<NodeInfo>,
    env_sources: HashSet<NodeInfo>,
    tally: ResyncingItem,
    poller: Option<JoinHandle<()>>,
    expiry: Option<JoinHandle<()>>,
    subtree: Option<SubtreeBarrier>,
    ended: bool,
}

impl ProcessorState {
    fn stop_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

pub struct ResyncProcessor {
    item_id: HashId,
    core: Arc<NodeCore>,
    started_at: Instant,
    state: Mutex<ProcessorState>,
    finished: watch::Sender<Option<ResyncOutcome>>,
}

impl ResyncProcessor {
    /// Seed the tally from the ledger, cast the local vote and arm the
    /// poller and the expiry timer.
    pub(crate) async fn start(item_id: HashId, core: Arc<NodeCore>) -> Result<Arc<Self>, NodeError> {
        let record = core.ledger.get_record(&item_id)?;
        let tally = ResyncingItem::new(item_id, record, core.quorum);
        let max_time = core.config.resync.max_resync_time();
        let now = Instant::now();
        let (finished, _) = watch::channel(None);

        let processor = Arc::new(Self {
            item_id,
            core,
            started_at: now,
            state: Mutex::new(ProcessorState {
                expires_at: now + max_time,
                answered: HashSet::new(),
                env_sources: HashSet::new(),
                tally,
                poller: None,
                expiry: None,
                subtree: None,
                ended: false,
            }),
            finished,
        });
        processor.core.metrics.resyncs_started.inc();

        let mut state = processor.state.lock().await;
        let local = processor.core.local_node().clone();
        let own_vote = state.tally.local_vote();
        info!(item = %item_id.short(), own_vote = %own_vote, "resync started");

        let expiry = processor.clone();
        state.expiry = Some(tokio::spawn(async move {
            sleep(max_time).await;
            debug!(item = %expiry.item_id.short(), "resync deadline reached");
            expiry.schedule_end(Duration::ZERO);
        }));
        state.poller = Some(processor.spawn_poller());

        if let Some(decided) = state.tally.cast_vote(&local, own_vote) {
            processor.spawn_commit(decided);
        }
        drop(state);
        Ok(processor)
    }

    pub fn item_id(&self) -> HashId {
        self.item_id
    }

    pub fn handle(&self) -> ResyncHandle {
        ResyncHandle {
            item_id: self.item_id,
            rx: self.finished.subscribe(),
        }
    }

    pub async fn resync_state(&self) -> ResyncState {
        self.state.lock().await.tally.resync_state()
    }

    fn spawn_poller(self: &Arc<Self>) -> JoinHandle<()> {
        let processor = self.clone();
        tokio::spawn(
            async move {
                let mut attempt = 0;
                while processor.pulse_resync().await {
                    sleep(processor.core.config.resync.poll_period(attempt)).await;
                    attempt += 1;
                }
                debug!("resync polling stopped");
            }
            .instrument(resync_span(&self.item_id)),
        )
    }

    /// One polling round. Returns false once polling should stop.
    async fn pulse_resync(&self) -> bool {
        let targets: Vec<NodeInfo> = {
            let state = self.state.lock().await;
            if state.ended || state.tally.is_commit_finished() || Instant::now() > state.expires_at
            {
                return false;
            }
            self.core
                .network
                .topology()
                .peers()
                .filter(|node| !state.answered.contains(node))
                .cloned()
                .collect()
        };
        if targets.is_empty() {
            return true;
        }

        let local = self.core.local_node();
        let request = Notification::from(ResyncNotification::request(local.clone(), self.item_id));
        let packet = match encode_packet(local, &[request]) {
            Ok(packet) => packet,
            Err(e) => {
                error!(error = %e, "failed to encode resync request");
                return false;
            }
        };
        debug!(peers = targets.len(), "polling peers");
        for node in &targets {
            if let Err(e) = self.core.network.deliver(node, packet.clone()).await {
                warn!(to = %node, error = %e, "resync request not delivered");
            }
        }
        true
    }

    /// Clear the answered set and restart polling from the first period.
    /// The deadline and the tally are left alone.
    pub async fn restart_resync(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.ended || state.tally.is_commit_finished() {
            return;
        }
        state.answered.clear();
        state.stop_polling();
        state.poller = Some(self.spawn_poller());
        debug!(item = %self.item_id.short(), "resync restarted");
    }

    /// Handle a peer's resync answer.
    pub async fn obtain_answer(self: &Arc<Self>, answer: &ResyncNotification) {
        let Some(voted) = answer.item_state() else {
            return;
        };
        if self.core.network.topology().is_local(&answer.from) {
            return;
        }

        let mut state = self.state.lock().await;
        if state.ended || !state.answered.insert(answer.from.clone()) {
            debug!(item = %self.item_id.short(), from = %answer.from, "duplicate resync answer ignored");
            return;
        }
        if answer.has_environment() {
            state.env_sources.insert(answer.from.clone());
        }
        debug!(item = %self.item_id.short(), from = %answer.from, vote = %voted, "resync vote");

        if let Some(decided) = state.tally.cast_vote(&answer.from, voted) {
            self.spawn_commit(decided);
        }
        if state.tally.is_polling_finished() && state.tally.is_commit_finished() {
            state.stop_polling();
        }
    }

    fn spawn_commit(self: &Arc<Self>, decided: ItemState) {
        let processor = self.clone();
        let span = resync_commit_span(&self.item_id, decided.name());
        tokio::spawn(async move { processor.commit(decided).await }.instrument(span));
    }

    async fn commit(self: Arc<Self>, decided: ItemState) {
        let plan = self.state.lock().await.tally.begin_commit(decided);
        let success = match plan {
            Err(e) => {
                error!(error = %e, "resync commit rejected");
                let mut state = self.state.lock().await;
                state.tally.force_failed();
                state.stop_polling();
                drop(state);
                self.schedule_end(Duration::ZERO);
                return;
            }
            Ok(CommitPlan::Abandon) => {
                info!("no consensus state reached, resync abandoned");
                false
            }
            Ok(CommitPlan::Persist { voters }) => {
                let persisted = self.persist(decided, &voters).await;
                let mut state = self.state.lock().await;
                let ok = match persisted {
                    Ok(record) => {
                        state.tally.set_record(record);
                        true
                    }
                    Err(e) => {
                        error!(error = %e, "failed to persist resync decision");
                        false
                    }
                };
                if let Err(e) = state.tally.finish_commit(ok) {
                    error!(error = %e, "resync commit finished out of order");
                    state.tally.force_failed();
                }
                ok
            }
        };
        if success {
            info!(decided = %decided, "resync decision committed");
        }
        self.on_finish_resync(decided, success).await;
    }

    /// Reconcile timestamps from the deciding voters and write the decision.
    async fn persist(&self, decided: ItemState, voters: &[NodeInfo]) -> Result<StateRecord, NodeError> {
        let window = self.core.config.resync.max_elections_time_secs;
        let mut created = TimestampClusters::new(window);
        let mut expires = TimestampClusters::new(window);
        for result in self.query_voters(voters).await {
            created.extend(result.created_at());
            expires.extend(result.expires_at());
        }

        let ledger = &self.core.ledger;
        let mut record = ledger.find_or_create(&self.item_id)?;
        let created_at = created.winner().unwrap_or(if record.created_at == Timestamp::EPOCH {
            Timestamp::now()
        } else {
            record.created_at
        });
        let expires_at = expires.winner().unwrap_or(record.expires_at);
        apply_decision(&mut record, decided, created_at, expires_at)?;
        ledger.save(&record)?;
        // refreshed once the environment is reconciled
        self.core.cache.lock().await.remove(&self.item_id);
        Ok(record)
    }

    /// Cache the committed record with its current possession flag.
    async fn refresh_cached_result(&self) {
        let record = self.state.lock().await.tally.record().clone();
        match self.core.ledger.has_environment(&self.item_id) {
            Ok(has_env) => self
                .core
                .cache
                .lock()
                .await
                .put(self.item_id, record.to_item_result(has_env)),
            Err(e) => warn!(error = %e, "environment lookup failed, result not cached"),
        }
    }

    /// Best-effort query of every voter's result; unreachable or slow peers
    /// are skipped.
    async fn query_voters(&self, voters: &[NodeInfo]) -> Vec<ItemResult> {
        let query_timeout = self.core.config.resync.query_timeout();
        let queries = voters.iter().map(|node| async move {
            if self.core.network.topology().is_local(node) {
                return self.core.local_result(&self.item_id).await.ok();
            }
            match timeout(query_timeout, self.core.network.get_item_state(node, &self.item_id)).await {
                Ok(Ok(result)) => Some(result),
                Ok(Err(e)) => {
                    warn!(peer = %node, error = %e, "item state query failed");
                    None
                }
                Err(_) => {
                    warn!(peer = %node, "item state query timed out");
                    None
                }
            }
        });
        join_all(queries).await.into_iter().flatten().collect()
    }

    async fn on_finish_resync(self: &Arc<Self>, decided: ItemState, success: bool) {
        self.state.lock().await.stop_polling();

        if success && decided == ItemState::Revoked {
            if let Err(e) = self.core.ledger.remove_environment(&self.item_id) {
                warn!(error = %e, "failed to remove environment of revoked item");
            }
        }

        let children = self.save_resynced_environments().await;
        if success {
            self.refresh_cached_result().await;
        }
        if children.is_empty() {
            self.schedule_end(Duration::ZERO);
            return;
        }

        debug!(children = children.len(), "waiting for sub-item resyncs");
        self.state.lock().await.subtree = Some(SubtreeBarrier::new(children.len()));
        let mut pending: FuturesUnordered<_> = children
            .into_iter()
            .map(|mut handle| async move { handle.outcome().await })
            .collect();
        while let Some(outcome) = pending.next().await {
            if self.on_resync_subtree_item_finish(outcome).await {
                break;
            }
        }
        self.report_subtree().await;
        self.schedule_end(Duration::ZERO);
    }

    async fn report_subtree(&self) {
        let Some(barrier) = self.state.lock().await.subtree.clone() else {
            return;
        };
        if barrier.failed() > 0 {
            self.core
                .metrics
                .subtree_resyncs_failed
                .inc_by(barrier.failed() as u64);
            warn!(
                failed = barrier.failed(),
                expected = barrier.expected(),
                "sub-item resyncs did not all commit"
            );
        } else {
            debug!(expected = barrier.expected(), "sub-item resyncs committed");
        }
    }

    /// Returns true once every sub-item resync has reported.
    async fn on_resync_subtree_item_finish(&self, outcome: ResyncOutcome) -> bool {
        let mut state = self.state.lock().await;
        match state.subtree.as_mut() {
            Some(barrier) => barrier.record(outcome.is_done()),
            None => true,
        }
    }

    /// Fetch the environment from one advertising peer and hand it to the
    /// ledger. Returns handles of the resyncs started for conflicting
    /// sub-items.
    async fn save_resynced_environments(&self) -> Vec<ResyncHandle> {
        let source = {
            let state = self.state.lock().await;
            let sources: Vec<&NodeInfo> = state.env_sources.iter().collect();
            sources.choose(&mut rand::thread_rng()).map(|n| (*n).clone())
        };
        let Some(source) = source else {
            return Vec::new();
        };

        let query_timeout = self.core.config.resync.query_timeout();
        let env = match timeout(
            query_timeout,
            self.core.network.get_environment(&source, &self.item_id),
        )
        .await
        {
            Ok(Ok(Some(env))) => env,
            Ok(Ok(None)) => {
                debug!(peer = %source, "advertised environment not returned");
                return Vec::new();
            }
            Ok(Err(e)) => {
                warn!(peer = %source, error = %e, "environment fetch failed");
                return Vec::new();
            }
            Err(_) => {
                warn!(peer = %source, "environment fetch timed out");
                return Vec::new();
            }
        };

        let conflicts = match self.core.ledger.save_environment(&env) {
            Ok(conflicts) => conflicts,
            Err(e) => {
                warn!(error = %e, "failed to save resynced environment");
                return Vec::new();
            }
        };

        let mut handles = Vec::new();
        for child in conflicts.into_iter().filter(|c| *c != self.item_id) {
            match self.core.resync(child).await {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!(child = %child.short(), error = %e, "sub-item resync not started"),
            }
        }
        handles
    }

    fn schedule_end(self: &Arc<Self>, delay: Duration) {
        let processor = self.clone();
        tokio::spawn(
            async move {
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                processor.resync_ended().await;
            }
            .instrument(resync_span(&self.item_id)),
        );
    }

    /// Finalize. Retries later while a commit is running; otherwise
    /// publishes the outcome exactly once.
    async fn resync_ended(self: &Arc<Self>) {
        let outcome = {
            let mut state = self.state.lock().await;
            if state.ended {
                return;
            }
            if state.tally.is_mid_commit() {
                drop(state);
                debug!("commit in progress, finalize deferred");
                self.schedule_end(self.core.config.resync.finalize_retry());
                return;
            }
            state.ended = true;
            state.stop_polling();
            if let Some(expiry) = state.expiry.take() {
                expiry.abort();
            }
            if let Some(barrier) = state.subtree.as_ref().filter(|b| !b.is_complete()) {
                warn!(
                    finished = barrier.finished(),
                    expected = barrier.expected(),
                    "finalizing with sub-item resyncs still running"
                );
            }
            match state.tally.resync_state() {
                ResyncState::CommitSuccessful => {
                    ResyncOutcome::Done(state.tally.decided().unwrap_or(state.tally.record().state))
                }
                ResyncState::CommitFailed => ResyncOutcome::Failed,
                _ => ResyncOutcome::TimedOut,
            }
        };

        self.core
            .metrics
            .resync_duration_ms
            .observe(self.started_at.elapsed().as_millis() as f64);
        self.core.on_resync_finished(self.item_id, outcome).await;
        self.core.retire(self.item_id, self).await;
        self.finished.send_replace(Some(outcome));
        info!(outcome = ?outcome, "resync finished");
    }
}
