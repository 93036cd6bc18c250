use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use uuid::Uuid;

use nlds_fabric::{Delivery, Fabric};
use nlds_model::{RoutingKey, SubState};
use nlds_monitor::MonitorStore;

use crate::error::Error;
use crate::transition::{self, Action};

/// Backoff applied when a delivery can't be parsed or re-published;
/// mirrors the redelivery delay the indexer/transfer stages use for
/// their own internal retries.
const REQUEUE_DELAY: Duration = Duration::from_secs(5);

/// Drains the marshaller's queue and, for every message, looks up the
/// next hop in the transition table, republishes it, and ratchets
/// Monitor's SubRecord forward to match — spec §4.2's "stateless router"
/// between stage queues, plus the bookkeeping side effect Monitor needs
/// to track overall progress (spec §4.9).
pub struct Worker {
    fabric: Arc<dyn Fabric>,
    monitor: MonitorStore,
    queue: String,
    prefetch: u32,
}

impl Worker {
    pub fn new(fabric: Arc<dyn Fabric>, monitor: MonitorStore, queue: impl Into<String>, prefetch: u32) -> Self {
        Self {
            fabric,
            monitor,
            queue: queue.into(),
            prefetch,
        }
    }

    /// Runs forever, consuming the marshaller's queue. Each delivery is
    /// acked once its successor (if any) has been durably published;
    /// a delivery that can't be routed is nacked so it isn't silently
    /// dropped on a transient fabric error.
    pub async fn run(&self) -> Result<(), Error> {
        let mut deliveries = self.fabric.consume(&self.queue, self.prefetch);

        while let Some(delivery) = deliveries.next().await {
            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(err) => {
                    tracing::error!(error = %err, "failed to claim delivery from the fabric");
                    continue;
                }
            };

            if let Err(err) = self.handle(&delivery).await {
                tracing::error!(error = %err, routing_key = %delivery.routing_key, "failed to route delivery");
                let _ = delivery.nack(REQUEUE_DELAY).await;
                continue;
            }

            if let Err(err) = delivery.ack().await {
                tracing::error!(error = %err, "failed to ack routed delivery");
            }
        }

        Ok(())
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), Error> {
        let key: RoutingKey = delivery.routing_key.parse()?;
        let details = &delivery.body.details;

        self.ensure_monitor_records(&key, delivery).await;

        match transition::next_action(&key.worker, &key.state, true) {
            Action::Publish(publication) => {
                let next_key = key.reply(publication.worker, publication.state)?;
                tracing::info!(
                    from = %delivery.routing_key,
                    to = %next_key,
                    transaction_id = %details.transaction_id,
                    "routing"
                );
                self.fabric.publish(&next_key, &delivery.body).await?;
                self.ratchet(details.sub_id, publication.substate).await;
            }
            Action::ReportFailureAndStop => {
                tracing::warn!(
                    routing_key = %delivery.routing_key,
                    transaction_id = %details.transaction_id,
                    sub_id = %details.sub_id,
                    "sub-transaction failed unrecoverably, stopping propagation"
                );
                self.record_failed_paths(details.sub_id, delivery).await;
                self.ratchet(details.sub_id, SubState::Failed).await;
            }
            Action::MarkComplete => {
                tracing::info!(
                    routing_key = %delivery.routing_key,
                    transaction_id = %details.transaction_id,
                    sub_id = %details.sub_id,
                    "sub-transaction reached its terminal success state"
                );
                self.ratchet(details.sub_id, SubState::Complete).await;
            }
            Action::Unhandled => {
                tracing::warn!(
                    routing_key = %delivery.routing_key,
                    "no transition defined for this worker/state, dropping"
                );
            }
        }

        Ok(())
    }

    /// Creates the TransactionRecord/SubRecord the first time a
    /// sub-transaction is seen; a no-op on replay (both opens are
    /// idempotent on their natural key).
    async fn ensure_monitor_records(&self, key: &RoutingKey, delivery: &Delivery) {
        let details = &delivery.body.details;
        let transaction = match self
            .monitor
            .open_transaction(
                details.transaction_id,
                details.job_label.as_deref(),
                &details.user,
                &details.group,
                details.api_action,
            )
            .await
        {
            Ok(transaction) => transaction,
            Err(err) => {
                tracing::error!(error = %err, "failed to open monitor transaction record");
                return;
            }
        };

        if let Err(err) = self
            .monitor
            .open_sub_record(transaction.id, details.sub_id, SubState::Routing)
            .await
        {
            tracing::error!(error = %err, routing_key = %key, "failed to open monitor sub record");
        }
    }

    async fn ratchet(&self, sub_id: Uuid, substate: SubState) {
        if let Err(err) = self.monitor.ratchet_update(sub_id, substate).await {
            tracing::error!(error = %err, %sub_id, ?substate, "failed to ratchet monitor state");
        }
    }

    async fn record_failed_paths(&self, sub_id: Uuid, delivery: &Delivery) {
        for path in &delivery.body.data.filelist {
            let reason = path.retry_reasons.last().map(String::as_str).unwrap_or("unknown");
            if let Err(err) = self.monitor.add_failed_file(sub_id, &path.original_path, reason).await {
                tracing::error!(error = %err, %sub_id, path = %path.original_path, "failed to record failed file");
            }
        }
    }
}
