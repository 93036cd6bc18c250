use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use uuid::Uuid;

use nlds_fabric::{Delivery, Fabric};
use nlds_model::{Data, Envelope, Meta, PathDetails, RoutingKey};
use nlds_objectstore::ObjectStoreClient;

use crate::archive::archive_put_aggregate;
use crate::error::Error;
use crate::packer::pack;

const REQUEUE_DELAY: Duration = Duration::from_secs(30);

/// Archive-put worker configuration, taken from `ArchivePutQConfig`.
#[derive(Debug, Clone)]
pub struct ArchivePutSettings {
    pub tape_url: String,
    pub tape_pool: String,
    pub chunk_size: usize,
    pub max_aggregate_bytes: u64,
    pub require_secure: bool,
}

pub struct Worker {
    fabric: Arc<dyn Fabric>,
    settings: ArchivePutSettings,
    queue: String,
    prefetch: u32,
}

impl Worker {
    pub fn new(fabric: Arc<dyn Fabric>, settings: ArchivePutSettings, queue: impl Into<String>, prefetch: u32) -> Self {
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
                tracing::error!(error = %err, routing_key = %delivery.routing_key, "archive-put failed");
                let _ = delivery.nack(REQUEUE_DELAY).await;
                continue;
            }

            if let Err(err) = delivery.ack().await {
                tracing::error!(error = %err, "failed to ack archive-put delivery");
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
                tracing::warn!(state = other, "archive-put ignoring unrecognised state");
                Ok(())
            }
        }
    }

    /// Bin-packs the input list of catalog candidates into aggregates and
    /// emits one `archive-put.start` per aggregate, spec §4.7 step 1.
    async fn handle_init(&self, key: &RoutingKey, delivery: &Delivery) -> Result<(), Error> {
        let aggregates = pack(delivery.body.data.filelist.clone(), self.settings.max_aggregate_bytes);
        tracing::info!(
            transaction_id = %delivery.body.details.transaction_id,
            aggregates = aggregates.len(),
            "packed archive-put aggregates"
        );

        let start_key = key.reply("archive-put", "start")?;
        for members in aggregates {
            let mut details = delivery.body.details.clone();
            details.sub_id = Uuid::new_v4();
            let data = Data {
                filelist: members,
                aggregate_label: None,
                ..Data::default()
            };
            self.fabric.publish(&start_key, &Envelope::new(details, data)).await?;
        }
        Ok(())
    }

    async fn handle_start(&self, key: &RoutingKey, delivery: &Delivery) -> Result<(), Error> {
        let details = &delivery.body.details;
        let object_store = ObjectStoreClient::connect(
            &details.tenancy,
            &details.transaction_id.to_string(),
            &details.access_key,
            &details.secret_key,
            self.settings.require_secure,
        )?;

        let tape_url = reqwest::Url::parse(&self.settings.tape_url)?;
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!self.settings.require_secure)
            .build()
            .map_err(nlds_tape::Error::from)?;

        let members: Vec<PathDetails> = delivery.body.data.filelist.clone();
        let outcome = archive_put_aggregate(
            &object_store,
            http,
            tape_url.scheme(),
            tape_url.host_str().unwrap_or_default(),
            &self.settings.tape_pool,
            members,
            self.settings.chunk_size,
        )
        .await?;

        if !outcome.completed.is_empty() {
            let complete_key = key.reply("archive-put", "complete")?;
            let data = Data {
                filelist: outcome.completed,
                aggregate_label: Some(outcome.tarname.clone()),
                root: Some(self.settings.tape_pool.clone()),
            };
            let meta = Meta {
                checksum: Some(outcome.checksum.to_string()),
                algorithm: Some(outcome.algorithm.to_string()),
                ..Meta::default()
            };
            let envelope = Envelope {
                details: details.clone(),
                meta,
                data,
            };
            self.fabric.publish(&complete_key, &envelope).await?;
        }

        if !outcome.failed.is_empty() {
            let failed_key = key.reply("archive-put", "failed")?;
            let data = Data {
                filelist: outcome.failed.into_iter().map(|f| f.path).collect(),
                aggregate_label: Some(outcome.tarname),
                ..Data::default()
            };
            self.fabric.publish(&failed_key, &Envelope::new(details.clone(), data)).await?;
        }

        Ok(())
    }
}
