use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use nlds_fabric::{Delivery, Fabric};
use nlds_model::{Data, Envelope, RoutingKey};

use crate::error::Error;
use crate::transfer::transfer_put;

const REQUEUE_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct TransferPutSettings {
    pub require_secure: bool,
    pub max_retries: u32,
    /// Back-off delays indexed by `PathDetails.retries`, per spec §5.
    pub retry_delays: Vec<u64>,
}

impl TransferPutSettings {
    fn delay_for(&self, retries: u32) -> Duration {
        let idx = (retries as usize).min(self.retry_delays.len().saturating_sub(1));
        Duration::from_secs(self.retry_delays.get(idx).copied().unwrap_or(0))
    }
}

pub struct Worker {
    fabric: Arc<dyn Fabric>,
    settings: TransferPutSettings,
    queue: String,
    prefetch: u32,
}

impl Worker {
    pub fn new(fabric: Arc<dyn Fabric>, settings: TransferPutSettings, queue: impl Into<String>, prefetch: u32) -> Self {
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
                tracing::error!(error = %err, routing_key = %delivery.routing_key, "transfer-put failed");
                let _ = delivery.nack(REQUEUE_DELAY).await;
                continue;
            }

            if let Err(err) = delivery.ack().await {
                tracing::error!(error = %err, "failed to ack transfer-put delivery");
            }
        }

        Ok(())
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), Error> {
        let key: RoutingKey = delivery.routing_key.parse()?;
        let details = delivery.body.details.clone();

        let outcome = transfer_put(
            details.transaction_id,
            &details.access_key,
            &details.secret_key,
            &details.tenancy,
            delivery.body.data.filelist.clone(),
            self.settings.require_secure,
            self.settings.max_retries,
        )
        .await;

        if !outcome.completed.is_empty() {
            let next_key = key.reply("transfer-put", "complete")?;
            let data = Data {
                filelist: outcome.completed,
                aggregate_label: None,
                ..Data::default()
            };
            self.fabric.publish(&next_key, &Envelope::new(details.clone(), data)).await?;
        }

        if !outcome.failed.is_empty() {
            let next_key = key.reply("transfer-put", "failed")?;
            let data = Data {
                filelist: outcome.failed.into_iter().map(|f| f.path).collect(),
                aggregate_label: None,
                ..Data::default()
            };
            self.fabric.publish(&next_key, &Envelope::new(details.clone(), data)).await?;
        }

        for path in outcome.retry {
            let retries = path.retries;
            let data = Data {
                filelist: vec![path],
                aggregate_label: None,
                ..Data::default()
            };
            self.fabric
                .publish_delayed(&key, &Envelope::new(details.clone(), data), self.settings.delay_for(retries))
                .await?;
        }

        Ok(())
    }
}
