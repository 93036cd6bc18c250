use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use nlds_fabric::Fabric;
use nlds_model::{ApiAction, Data, Details, Envelope, RoutingKey};

use crate::ops::CatalogStore;
use crate::worker_error::Error;

/// Credentials the periodic `catalog-archive-next` poll uses when seeding
/// `archive-put.init`, since its candidates span many original requesters.
#[derive(Debug, Clone)]
pub struct ArchiveNextSettings {
    pub application: String,
    pub tenancy: String,
    pub access_key: String,
    pub secret_key: String,
    pub interval: Duration,
}

/// Spec §4.4's "out-of-band periodic trigger": not driven by an inbound
/// message, this polls `catalog_archive_next` directly and, when it finds
/// any tape-less files, publishes `catalog-archive-next.complete` so the
/// marshaller's transition table (`("catalog-archive-next", "complete")
/// => archive-put.init`) picks up the pipeline from there.
pub async fn run(fabric: Arc<dyn Fabric>, store: Arc<CatalogStore>, settings: ArchiveNextSettings) -> Result<(), Error> {
    let mut ticker = tokio::time::interval(settings.interval);
    loop {
        ticker.tick().await;

        let candidates = match store.catalog_archive_next().await {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::error!(error = %err, "catalog-archive-next scan failed");
                continue;
            }
        };

        if candidates.is_empty() {
            continue;
        }

        tracing::info!(candidates = candidates.len(), "catalog-archive-next found tape-less files");

        let key = match RoutingKey::new(settings.application.clone(), "catalog-archive-next", "complete") {
            Ok(key) => key,
            Err(err) => {
                tracing::error!(error = %err, "failed to build catalog-archive-next routing key");
                continue;
            }
        };

        let details = Details {
            transaction_id: Uuid::new_v4(),
            sub_id: Uuid::new_v4(),
            api_action: ApiAction::ArchivePut,
            user: "nlds".to_string(),
            group: "nlds".to_string(),
            target: "tape".to_string(),
            tenancy: settings.tenancy.clone(),
            access_key: settings.access_key.clone(),
            secret_key: settings.secret_key.clone(),
            job_label: None,
            holding_label: None,
            holding_id: None,
            tag_map: HashMap::new(),
            retry_filelist: false,
        };
        let data = Data { filelist: candidates, ..Data::default() };

        if let Err(err) = fabric.publish(&key, &Envelope::new(details, data)).await {
            tracing::error!(error = %err, "failed to publish catalog-archive-next.complete");
        }
    }
}
