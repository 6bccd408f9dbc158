//! Sharded background dispatcher (spec.md §4.E): one task per shard polls
//! its owned `pending` rows, hands ready payloads to component D, and
//! applies the retry policy on failure.

use std::sync::Arc;

use mesh_common::errors::Result;
use mesh_common::ids::NodeId;
use mesh_common::model::Qos;
use mesh_common::time::Backoff;
use mesh_executor::resource_group::ServiceResourceGroup;

use crate::entry::{OutboxEntry, PayloadRef};
use crate::store::OutboxStore;

/// What `PayloadDispatch::dispatch` actually did, distinguishing a
/// successful send from a credit-exhausted no-op (spec.md §4.D: a target
/// with no credit left stays `pending` without being penalized as a failed
/// attempt).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DispatchOutcome {
    Sent,
    NoCredit,
}

/// Looks a payload back up from the DSG log it was committed to and resends
/// it through component D. Implemented by `mesh-service`, which is the only
/// component holding both a DSG's log store and a `Router`.
#[async_trait::async_trait]
pub trait PayloadDispatch: Send + Sync + 'static {
    async fn dispatch(&self, destination: NodeId, payload_ref: PayloadRef) -> Result<DispatchOutcome>;
}

pub struct RetryPolicy {
    pub max_attempts_reliable: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// spec.md §4.E: "`max_attempts` (default 20 for reliable, ∞ for
    /// exactly-once)". `is_exactly_once` entries never hit `failed_permanent`
    /// on attempt-count alone.
    pub fn exhausted(&self, attempts: u32, is_exactly_once: bool) -> bool {
        !is_exactly_once && attempts >= self.max_attempts_reliable
    }
}

pub struct OutboxDispatcher {
    store: Arc<dyn OutboxStore>,
    dispatch: Arc<dyn PayloadDispatch>,
    policy: RetryPolicy,
    shard_count: u32,
    poll_interval: std::time::Duration,
}

impl OutboxDispatcher {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        dispatch: Arc<dyn PayloadDispatch>,
        policy: RetryPolicy,
        shard_count: u32,
        poll_interval: std::time::Duration,
    ) -> Self {
        Self {
            store,
            dispatch,
            policy,
            shard_count,
            poll_interval,
        }
    }

    /// Resets any row left `in_flight` by a crash before the dispatcher
    /// shards start polling (spec.md §4.E).
    pub async fn recover(&self) -> Result<()> {
        self.store.requeue_in_flight().await
    }

    /// Registers one task per shard into `group` (spec.md §5: "one outbox
    /// dispatcher per shard").
    pub async fn spawn_tasks(self: Arc<Self>, group: &ServiceResourceGroup) {
        for shard_index in 0..self.shard_count {
            let this = self.clone();
            group
                .spawn(&format!("outbox-shard-{shard_index}"), move |token| async move {
                    loop {
                        if token.is_cancelled().await {
                            return Ok(());
                        }
                        this.run_once(shard_index).await?;
                        async_std::task::sleep(this.poll_interval).await;
                    }
                })
                .await;
        }
    }

    async fn run_once(&self, shard_index: u32) -> Result<()> {
        let now = mesh_common::time::MeshTime::now().wall_millis_since_epoch();
        let ready = self.store.claim_ready(shard_index, self.shard_count, now).await?;

        for entry in ready {
            self.attempt(entry).await?;
        }
        Ok(())
    }

    async fn attempt(&self, entry: OutboxEntry) -> Result<()> {
        match self.dispatch.dispatch(entry.destination_node, entry.payload_ref).await {
            Ok(DispatchOutcome::Sent) => {
                // Delivery handed off; the entry transitions to `acked` only
                // when the real `CHUNK_ACK` arrives (handled by the caller
                // that owns the ack stream), not here.
                Ok(())
            }
            Ok(DispatchOutcome::NoCredit) => {
                // Not a failure: the target's credit window is just
                // exhausted right now. Back off without counting this as an
                // attempt, so `max_attempts_reliable` isn't spent on a
                // target that's simply caught up on ack'ing.
                let next_retry_at = mesh_common::time::MeshTime::now().wall_millis_since_epoch()
                    + self.policy.backoff.duration_for_attempt(0).as_millis() as u64;
                self.store.release_without_penalty(entry.key(), next_retry_at).await
            }
            Err(e) => {
                log::warn!(
                    "outbox dispatch failed for stream {} seq {} -> {}: {}",
                    entry.stream_id,
                    entry.seq,
                    entry.destination_node,
                    e
                );
                let is_exactly_once = entry.qos == Qos::ExactlyOnce;
                if self.policy.exhausted(entry.attempts + 1, is_exactly_once) {
                    self.store.mark_failed_permanent(entry.key()).await?;
                } else {
                    let delay = self.policy.backoff.duration_for_attempt(entry.attempts);
                    let next_retry_at = mesh_common::time::MeshTime::now().wall_millis_since_epoch()
                        + delay.as_millis() as u64;
                    self.store.mark_retry(entry.key(), next_retry_at).await?;
                }
                Ok(())
            }
        }
    }
}
