use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use uuid::Uuid;

use nlds_fabric::{Delivery, Fabric};
use nlds_model::{Data, Envelope, PathDetails, RoutingKey};

use crate::chown::Chowner;
use crate::error::Error;
use crate::transfer::transfer_get;

const REQUEUE_DELAY: Duration = Duration::from_secs(30);

/// Transfer-get worker configuration, taken from `TransferGetQConfig`.
#[derive(Debug, Clone)]
pub struct TransferGetSettings {
    pub require_secure: bool,
    /// Sub-list length an incoming `transfer-get.init` filelist is chunked
    /// into before each chunk is re-published as its own `transfer-get.start`.
    pub filelist_max_length: usize,
    pub chown_enable: bool,
    pub chown_helper_name: Option<String>,
}

pub struct Worker {
    fabric: Arc<dyn Fabric>,
    settings: TransferGetSettings,
    queue: String,
    prefetch: u32,
}

impl Worker {
    pub fn new(fabric: Arc<dyn Fabric>, settings: TransferGetSettings, queue: impl Into<String>, prefetch: u32) -> Self {
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
                tracing::error!(error = %err, routing_key = %delivery.routing_key, "transfer-get failed");
                let _ = delivery.nack(REQUEUE_DELAY).await;
                continue;
            }

            if let Err(err) = delivery.ack().await {
                tracing::error!(error = %err, "failed to ack transfer-get delivery");
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
                tracing::warn!(state = other, "transfer-get ignoring unrecognised state");
                Ok(())
            }
        }
    }

    /// Chunks an incoming filelist into sublists of at most `L` entries,
    /// each emitted as its own `transfer-get.start`, per spec §4.6.
    async fn handle_init(&self, key: &RoutingKey, delivery: &Delivery) -> Result<(), Error> {
        let filelist = &delivery.body.data.filelist;
        let max_len = self.settings.filelist_max_length.max(1);
        let start_key = key.reply("transfer-get", "start")?;

        for sublist in filelist.chunks(max_len) {
            let mut details = delivery.body.details.clone();
            details.sub_id = Uuid::new_v4();
            let data = Data {
                filelist: sublist.to_vec(),
                aggregate_label: delivery.body.data.aggregate_label.clone(),
                ..Data::default()
            };
            self.fabric.publish(&start_key, &Envelope::new(details, data)).await?;
        }
        Ok(())
    }

    async fn handle_start(&self, key: &RoutingKey, delivery: &Delivery) -> Result<(), Error> {
        let details = &delivery.body.details;
        let chowner = if self.settings.chown_enable {
            let helper_name = self
                .settings
                .chown_helper_name
                .as_deref()
                .unwrap_or("nlds-chown-helper");
            Chowner::via_helper(helper_name)?
        } else {
            Chowner::direct()
        };

        let filelist: Vec<PathDetails> = delivery.body.data.filelist.clone();
        let outcome = transfer_get(
            details.transaction_id,
            &details.access_key,
            &details.secret_key,
            &details.tenancy,
            Path::new(&details.target),
            filelist,
            self.settings.require_secure,
            &chowner,
        )
        .await;

        if !outcome.completed.is_empty() {
            let complete_key = key.reply("transfer-get", "complete")?;
            let data = Data {
                filelist: outcome.completed,
                aggregate_label: None,
                ..Data::default()
            };
            self.fabric
                .publish(&complete_key, &Envelope::new(details.clone(), data))
                .await?;
        }

        if !outcome.failed.is_empty() {
            let failed_key = key.reply("transfer-get", "failed")?;
            let data = Data {
                filelist: outcome.failed.into_iter().map(|f| f.path).collect(),
                aggregate_label: None,
                ..Data::default()
            };
            self.fabric.publish(&failed_key, &Envelope::new(details.clone(), data)).await?;
        }

        Ok(())
    }
}
