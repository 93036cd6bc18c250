use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use uuid::Uuid;

use nlds_fabric::{Delivery, Fabric};
use nlds_model::{Data, Envelope, RoutingKey};

use crate::classify::WalkLimits;
use crate::error::Error;
use crate::permissions::Identity;
use crate::walk::{blank_path, split_filelist, walk_sublist};

const REQUEUE_DELAY: Duration = Duration::from_secs(30);

/// Indexer worker configuration, taken from `IndexQConfig` (spec §6).
#[derive(Debug, Clone)]
pub struct IndexerSettings {
    pub filelist_max_length: usize,
    pub message_threshold: u64,
    pub check_permissions: bool,
    pub check_filesize: bool,
    pub max_filesize: u64,
}

impl IndexerSettings {
    fn walk_limits(&self) -> WalkLimits {
        WalkLimits {
            batch_max_len: self.filelist_max_length,
            batch_max_bytes: self.message_threshold,
            max_filesize: self.max_filesize,
            check_permissions: self.check_permissions,
            check_filesize: self.check_filesize,
        }
    }
}

pub struct Worker {
    fabric: Arc<dyn Fabric>,
    settings: IndexerSettings,
    queue: String,
    prefetch: u32,
}

impl Worker {
    pub fn new(fabric: Arc<dyn Fabric>, settings: IndexerSettings, queue: impl Into<String>, prefetch: u32) -> Self {
        Self {
            fabric,
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
                tracing::error!(error = %err, routing_key = %delivery.routing_key, "failed to index delivery");
                let _ = delivery.nack(REQUEUE_DELAY).await;
                continue;
            }

            if let Err(err) = delivery.ack().await {
                tracing::error!(error = %err, "failed to ack indexed delivery");
            }
        }

        Ok(())
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), Error> {
        let key: RoutingKey = delivery.routing_key.parse()?;

        match key.state.as_str() {
            "init" => self.handle_init(&key, delivery).await,
            "start" => self.handle_start(&key, delivery).await,
            other => {
                tracing::warn!(state = other, "indexer ignoring unrecognised state");
                Ok(())
            }
        }
    }

    /// Splits the raw user filelist into `⌈N/L⌉` sub-transactions, each
    /// emitted as `index.start` with a fresh `sub_id` (spec §4.3's split
    /// step).
    async fn handle_init(&self, key: &RoutingKey, delivery: &Delivery) -> Result<(), Error> {
        let original_paths: Vec<String> = delivery
            .body
            .data
            .filelist
            .iter()
            .map(|p| p.original_path.clone())
            .collect();

        let sublists = split_filelist(&original_paths, self.settings.filelist_max_length);
        tracing::info!(
            transaction_id = %delivery.body.details.transaction_id,
            sublists = sublists.len(),
            "split filelist"
        );

        let start_key = key.reply("index", "start")?;
        for sublist in sublists {
            let mut details = delivery.body.details.clone();
            details.sub_id = Uuid::new_v4();
            let data = Data {
                filelist: sublist.iter().map(|p| blank_path(p)).collect(),
                aggregate_label: delivery.body.data.aggregate_label.clone(),
                ..Data::default()
            };
            self.fabric.publish(&start_key, &Envelope::new(details, data)).await?;
        }
        Ok(())
    }

    /// Walks one sub-transaction's paths and emits one `index.complete`
    /// (resp. `index.failed`) per batch boundary crossed (spec §4.3's
    /// walk step).
    async fn handle_start(&self, key: &RoutingKey, delivery: &Delivery) -> Result<(), Error> {
        let identity = Identity::resolve(&delivery.body.details.user)?;
        let paths: Vec<String> = delivery
            .body
            .data
            .filelist
            .iter()
            .map(|p| p.original_path.clone())
            .collect();

        let batches = walk_sublist(&paths, self.settings.walk_limits(), &identity);

        let complete_key = key.reply("index", "complete")?;
        let failed_key = key.reply("index", "failed")?;

        for batch in batches {
            if !batch.completed.is_empty() {
                let data = Data {
                    filelist: batch.completed,
                    aggregate_label: None,
                    ..Data::default()
                };
                self.fabric
                    .publish(&complete_key, &Envelope::new(delivery.body.details.clone(), data))
                    .await?;
            }
            if !batch.failed.is_empty() {
                let data = Data {
                    filelist: batch.failed.into_iter().map(|f| f.path).collect(),
                    aggregate_label: None,
                    ..Data::default()
                };
                self.fabric
                    .publish(&failed_key, &Envelope::new(delivery.body.details.clone(), data))
                    .await?;
            }
        }
        Ok(())
    }
}
