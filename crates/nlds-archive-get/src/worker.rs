use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use nlds_fabric::{Delivery, Fabric};
use nlds_model::{Data, Envelope, PathDetails, RoutingKey};
use nlds_objectstore::ObjectStoreClient;
use nlds_tape::{AggregateRef, TapeClient};

use crate::error::Error;
use crate::group::group_by_aggregation;
use crate::restore::restore_aggregate;

const REQUEUE_DELAY: Duration = Duration::from_secs(30);

/// Archive-get worker configuration, taken from `ArchiveGetQConfig`.
#[derive(Debug, Clone)]
pub struct ArchiveGetSettings {
    pub require_secure: bool,
    /// Delay before a still-pending prepare is re-checked, per spec §4.8
    /// (default 30000 ms in the spec; see DESIGN.md for why this
    /// workspace defaults it higher).
    pub prepare_requeue: Duration,
}

/// Drives archive-get's three-state sub-machine (spec §4.8): `prepare`
/// groups an inbound filelist by owning tape aggregate and kicks off a
/// tape prepare for each one not already staged; `prepare-check` polls
/// those in-flight requests; `start` streams a ready aggregate and
/// re-uploads its wanted members to the object store.
pub struct Worker {
    fabric: Arc<dyn Fabric>,
    tape: Arc<dyn TapeClient>,
    settings: ArchiveGetSettings,
    queue: String,
    prefetch: u32,
}

impl Worker {
    pub fn new(
        fabric: Arc<dyn Fabric>,
        tape: Arc<dyn TapeClient>,
        settings: ArchiveGetSettings,
        queue: impl Into<String>,
        prefetch: u32,
    ) -> Self {
        Self {
            fabric,
            tape,
            settings,
            queue: queue.into(),
            prefetch,
        }
    }

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
                tracing::error!(error = %err, routing_key = %delivery.routing_key, "archive-get failed");
                let _ = delivery.nack(REQUEUE_DELAY).await;
                continue;
            }

            if let Err(err) = delivery.ack().await {
                tracing::error!(error = %err, "failed to ack archive-get delivery");
            }
        }

        Ok(())
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), Error> {
        let key: RoutingKey = delivery.routing_key.parse()?;

        match key.state.as_str() {
            "prepare" => self.handle_prepare(&key, delivery).await,
            "prepare-check" => self.handle_prepare_check(&key, delivery).await,
            "start" => self.handle_start(&key, delivery).await,
            other => {
                tracing::warn!(state = other, "archive-get ignoring unrecognised state");
                Ok(())
            }
        }
    }

    /// Groups the inbound filelist by owning aggregate: already-staged
    /// aggregates go straight to `archive-get.start`, the rest get a
    /// tape prepare request and a delayed `archive-get.prepare-check`.
    async fn handle_prepare(&self, key: &RoutingKey, delivery: &Delivery) -> Result<(), Error> {
        let (groups, unresolved) = group_by_aggregation(delivery.body.data.filelist.clone());
        let details = &delivery.body.details;

        if !unresolved.is_empty() {
            self.publish_failed(key, delivery, unresolved, "no tape location to prepare against").await?;
        }

        for group in groups {
            let aggregate_ref: AggregateRef = match group.members[0].tape_location.as_deref().unwrap_or_default().parse() {
                Ok(aggregate_ref) => aggregate_ref,
                Err(err) => {
                    self.publish_failed(key, delivery, group.members, &format!("malformed tape location: {err}")).await?;
                    continue;
                }
            };

            let stat = self.tape.stat(&aggregate_ref).await?;
            if stat.staged {
                self.publish_aggregate(key, "start", details, &aggregate_ref, group.members, None).await?;
                continue;
            }

            let prepare_id = self.tape.request_prepare(std::slice::from_ref(&aggregate_ref)).await?;
            tracing::info!(aggregation_id = group.aggregation_id, %prepare_id, "requested tape prepare");
            self.fabric
                .publish_delayed(
                    &key.reply("archive-get", "prepare-check")?,
                    &aggregate_envelope(details, &aggregate_ref, group.members, Some(prepare_id)),
                    self.settings.prepare_requeue,
                )
                .await?;
        }

        Ok(())
    }

    /// Polls one in-flight prepare request; re-emits a delayed
    /// `prepare-check` while still pending, or moves on to
    /// `archive-get.start` once tape reports it done.
    async fn handle_prepare_check(&self, key: &RoutingKey, delivery: &Delivery) -> Result<(), Error> {
        let details = &delivery.body.details;
        let members = delivery.body.data.filelist.clone();

        let Some(prepare_id) = delivery.body.data.prepare_id.clone() else {
            tracing::warn!("archive-get.prepare-check message carried no prepare_id; dropping");
            return Ok(());
        };

        let Some(location) = members.first().and_then(|m| m.tape_location.as_deref()) else {
            tracing::warn!(%prepare_id, "archive-get.prepare-check message carried no tape location; dropping");
            return Ok(());
        };
        let aggregate_ref: AggregateRef = location.parse()?;

        let poll = self.tape.poll_prepare(&prepare_id).await?;
        if poll.done.iter().any(|done| *done == aggregate_ref) {
            self.publish_aggregate(key, "start", details, &aggregate_ref, members, None).await?;
            return Ok(());
        }

        tracing::debug!(%prepare_id, "tape prepare still pending, re-checking later");
        self.fabric
            .publish_delayed(
                &key.reply("archive-get", "prepare-check")?,
                &aggregate_envelope(details, &aggregate_ref, members, Some(prepare_id)),
                self.settings.prepare_requeue,
            )
            .await?;
        Ok(())
    }

    /// Streams the now-ready aggregate from tape and re-uploads each
    /// wanted member to the object store.
    async fn handle_start(&self, key: &RoutingKey, delivery: &Delivery) -> Result<(), Error> {
        let details = &delivery.body.details;
        let members = delivery.body.data.filelist.clone();

        let Some(location) = members.first().and_then(|m| m.tape_location.as_deref()) else {
            self.publish_failed(key, delivery, members, "no tape location to recall from").await?;
            return Ok(());
        };
        let aggregate_ref: AggregateRef = location.parse()?;

        let object_store = ObjectStoreClient::connect(
            &details.tenancy,
            &details.transaction_id.to_string(),
            &details.access_key,
            &details.secret_key,
            self.settings.require_secure,
        )?;

        let outcome = restore_aggregate(self.tape.as_ref(), &object_store, &aggregate_ref, members).await?;

        if !outcome.completed.is_empty() {
            let data = Data { filelist: outcome.completed, ..Data::default() };
            self.fabric
                .publish(&key.reply("archive-get", "complete")?, &Envelope::new(details.clone(), data))
                .await?;
        }

        if !outcome.failed.is_empty() {
            let data = Data {
                filelist: outcome.failed.into_iter().map(|f| f.path).collect(),
                ..Data::default()
            };
            self.fabric
                .publish(&key.reply("archive-get", "failed")?, &Envelope::new(details.clone(), data))
                .await?;
        }

        Ok(())
    }

    async fn publish_aggregate(
        &self,
        key: &RoutingKey,
        state: &str,
        details: &nlds_model::Details,
        aggregate_ref: &AggregateRef,
        members: Vec<PathDetails>,
        prepare_id: Option<String>,
    ) -> Result<(), Error> {
        self.fabric
            .publish(&key.reply("archive-get", state)?, &aggregate_envelope(details, aggregate_ref, members, prepare_id))
            .await?;
        Ok(())
    }

    async fn publish_failed(
        &self,
        key: &RoutingKey,
        delivery: &Delivery,
        filelist: Vec<PathDetails>,
        reason: &str,
    ) -> Result<(), Error> {
        tracing::warn!(reason, paths = filelist.len(), "archive-get dropping unresolvable paths");
        let data = Data { filelist, ..Data::default() };
        self.fabric
            .publish(&key.reply("archive-get", "failed")?, &Envelope::new(delivery.body.details.clone(), data))
            .await?;
        Ok(())
    }
}

fn aggregate_envelope(
    details: &nlds_model::Details,
    aggregate_ref: &AggregateRef,
    filelist: Vec<PathDetails>,
    prepare_id: Option<String>,
) -> Envelope {
    let data = Data {
        filelist,
        aggregate_label: Some(aggregate_ref.aggregate.clone()),
        root: Some(aggregate_ref.root.clone()),
        prepare_id,
    };
    Envelope::new(details.clone(), data)
}
