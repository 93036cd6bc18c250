use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use nlds_fabric::{Delivery, Fabric};
use nlds_model::{ApiAction, Data, Details, Envelope, RoutingKey};

use crate::permissions::RoleResolver;
use crate::worker_error::Error;
use crate::{CatalogStore, GetSelector};

const REQUEUE_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct CatalogSettings {
    pub full_unpack: bool,
}

/// Consumes the catalog queue's `*.start` states (spec §4.4), each a
/// distinct fixed operation serialised through this single consumer so
/// writes never race. Every operation publishes its own `.complete`
/// (rarely `.failed`) so the marshaller can route onward — see the
/// dispatch table in `handle` for the routing-key-to-op mapping, including
/// two states whose routing-key name doesn't match the Location type they
/// actually strip (documented inline and in DESIGN.md).
pub struct Worker {
    fabric: Arc<dyn Fabric>,
    store: CatalogStore,
    settings: CatalogSettings,
    role_resolver: Arc<dyn RoleResolver>,
    queue: String,
    prefetch: u32,
}

impl Worker {
    pub fn new(
        fabric: Arc<dyn Fabric>,
        store: CatalogStore,
        settings: CatalogSettings,
        role_resolver: Arc<dyn RoleResolver>,
        queue: impl Into<String>,
        prefetch: u32,
    ) -> Self {
        Self {
            fabric,
            store,
            settings,
            role_resolver,
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
                tracing::error!(error = %err, routing_key = %delivery.routing_key, "catalog operation failed");
                let _ = delivery.nack(REQUEUE_DELAY).await;
                continue;
            }

            if let Err(err) = delivery.ack().await {
                tracing::error!(error = %err, "failed to ack catalog delivery");
            }
        }

        Ok(())
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), Error> {
        let key: RoutingKey = delivery.routing_key.parse()?;

        if key.state != "start" {
            tracing::warn!(routing_key = %delivery.routing_key, "catalog ignoring unrecognised state");
            return Ok(());
        }

        match key.worker.as_str() {
            "catalog-put" => self.handle_put(&key, delivery).await,
            "catalog-update" => self.handle_update(&key, delivery).await,
            "catalog-del" => self.handle_del(&key, delivery).await,
            "catalog-remove" => self.handle_remove(&key, delivery).await,
            "catalog-get" => self.handle_get(&key, delivery).await,
            "catalog-archive-update" => self.handle_archive_update(&key, delivery).await,
            "catalog-archive-del" => self.handle_archive_del(&key, delivery).await,
            "catalog-archive-remove" => self.handle_archive_remove(&key, delivery).await,
            other => {
                tracing::warn!(worker = other, "catalog ignoring unrecognised worker segment");
                Ok(())
            }
        }
    }

    async fn handle_put(&self, key: &RoutingKey, delivery: &Delivery) -> Result<(), Error> {
        let details = &delivery.body.details;
        let label = details
            .holding_label
            .clone()
            .unwrap_or_else(|| details.transaction_id.to_string());

        let result = self
            .store
            .catalog_put(details.transaction_id, &details.user, &details.group, &label, delivery.body.data.filelist.clone())
            .await?;

        if !result.completed.is_empty() {
            let data = Data { filelist: result.completed, ..Data::default() };
            self.fabric
                .publish(&key.reply("catalog-put", "complete")?, &Envelope::new(details.clone(), data))
                .await?;
        }
        if !result.failed.is_empty() {
            let data = Data {
                filelist: result.failed.into_iter().map(|f| f.path).collect(),
                ..Data::default()
            };
            self.fabric
                .publish(&key.reply("catalog-put", "failed")?, &Envelope::new(details.clone(), data))
                .await?;
        }
        Ok(())
    }

    /// Attaches an OBJECT_STORE Location to each file this transaction
    /// transferred, then publishes onward. Reached by two distinct flows:
    /// a `put`'s `transfer-put.complete` (fresh location, publishes
    /// `catalog-update.complete` — a pipeline-terminal success hop, the
    /// marshaller ratchets Monitor straight to `Complete` from here) and a
    /// tape recall's `archive-get.complete` (fills the empty marker
    /// `catalog-get` left behind, publishes `catalog-update.recall-complete`
    /// so the marshaller continues on to `transfer-get`).
    async fn handle_update(&self, key: &RoutingKey, delivery: &Delivery) -> Result<(), Error> {
        let details = &delivery.body.details;
        self.store
            .catalog_update(details.transaction_id, &details.tenancy, &delivery.body.data.filelist)
            .await?;

        let state = match details.api_action {
            ApiAction::Get | ApiAction::GetList | ApiAction::ArchiveGet => "recall-complete",
            _ => "complete",
        };

        let data = Data { filelist: delivery.body.data.filelist.clone(), ..Data::default() };
        self.fabric
            .publish(&key.reply("catalog-update", state)?, &Envelope::new(details.clone(), data))
            .await?;
        Ok(())
    }

    /// `transfer-put.failed` lands here: removes the provisional File rows
    /// catalog-put created, since the transfer never completed. Also the
    /// only production entry point for a user-initiated delete, so it
    /// resolves the caller's role and enforces `check_delete`.
    async fn handle_del(&self, key: &RoutingKey, delivery: &Delivery) -> Result<(), Error> {
        let details = &delivery.body.details;
        let original_paths = original_paths(delivery);
        let role = self.role_resolver.role_of(&details.user);

        let failed = self
            .store
            .catalog_del(&details.user, &details.group, role, &original_paths)
            .await?;

        if !failed.is_empty() {
            let data = Data {
                filelist: failed.into_iter().map(|f| f.path).collect(),
                ..Data::default()
            };
            self.fabric
                .publish(&key.reply("catalog-del", "failed")?, &Envelope::new(details.clone(), data))
                .await?;
        }

        self.publish_cleanup_complete(key, "catalog-del", delivery).await
    }

    /// `archive-get.failed` lands here: strips the empty OBJECT_STORE
    /// recall markers `catalog-get` created, so a later get retries the
    /// tape recall cleanly instead of finding a dangling empty Location.
    async fn handle_remove(&self, key: &RoutingKey, delivery: &Delivery) -> Result<(), Error> {
        let original_paths = original_paths(delivery);
        self.store.catalog_archive_remove(&original_paths).await?;
        self.publish_cleanup_complete(key, "catalog-remove", delivery).await
    }

    /// Resolves files by whatever selector fields `details`/`data` carry
    /// and sorts them into up to three outgoing messages: ready-to-transfer
    /// paths, tape-pending paths routed through archive-get, and
    /// permission/missing-location failures.
    async fn handle_get(&self, key: &RoutingKey, delivery: &Delivery) -> Result<(), Error> {
        let details = &delivery.body.details;
        let selector = build_selector(details, &delivery.body.data);

        let result = self.store.catalog_get(&details.group, &selector, self.settings.full_unpack).await?;

        if !result.transfer_list.is_empty() {
            let data = Data { filelist: result.transfer_list, ..Data::default() };
            self.fabric
                .publish(&key.reply("catalog-get", "complete")?, &Envelope::new(details.clone(), data))
                .await?;
        }

        if !result.archive_list.is_empty() {
            let filelist = result
                .archive_list
                .into_iter()
                .map(|(mut path, aggregation_id)| {
                    path.aggregation_id = Some(aggregation_id);
                    path
                })
                .collect();
            let data = Data { filelist, ..Data::default() };
            self.fabric
                .publish(&key.reply("catalog-get", "archive-restore")?, &Envelope::new(details.clone(), data))
                .await?;
        }

        if !result.failed.is_empty() {
            let data = Data {
                filelist: result.failed.into_iter().map(|f| f.path).collect(),
                ..Data::default()
            };
            self.fabric
                .publish(&key.reply("catalog-get", "failed")?, &Envelope::new(details.clone(), data))
                .await?;
        }
        Ok(())
    }

    /// On archive-put success: creates the Aggregation and fills in each
    /// member's TAPE path, then publishes `catalog-archive-update.complete`
    /// — the pipeline-terminal success hop for the archive side of a put.
    async fn handle_archive_update(&self, key: &RoutingKey, delivery: &Delivery) -> Result<(), Error> {
        let tarname = delivery.body.data.aggregate_label.as_deref().unwrap_or_default();
        let root = delivery.body.data.root.as_deref().unwrap_or_default();
        let checksum = delivery.body.meta.checksum.as_deref().unwrap_or_default();
        let algorithm = delivery.body.meta.algorithm.as_deref().unwrap_or_default();

        self.store
            .catalog_archive_update(tarname, checksum, algorithm, root, &delivery.body.data.filelist)
            .await?;

        let data = Data { filelist: delivery.body.data.filelist.clone(), ..Data::default() };
        self.fabric
            .publish(&key.reply("catalog-archive-update", "complete")?, &Envelope::new(delivery.body.details.clone(), data))
            .await?;
        Ok(())
    }

    /// Not reached by the current transition table (kept for manual /
    /// forward-compatible triggering): strips the empty TAPE markers
    /// `catalog-archive-next` created, by name.
    async fn handle_archive_del(&self, key: &RoutingKey, delivery: &Delivery) -> Result<(), Error> {
        let original_paths = original_paths(delivery);
        self.store.catalog_archive_del(&original_paths).await?;
        self.publish_cleanup_complete(key, "catalog-archive-del", delivery).await
    }

    /// `archive-put.failed` lands here. The marshaller's transition table
    /// names this state `catalog-archive-remove`, but the Locations left
    /// behind by a failed archive-put are the empty **TAPE** markers
    /// `catalog-archive-next` created — not OBJECT_STORE ones — so this
    /// dispatches to `catalog_archive_del`, not `catalog_archive_remove`,
    /// despite the state's name. See DESIGN.md.
    async fn handle_archive_remove(&self, key: &RoutingKey, delivery: &Delivery) -> Result<(), Error> {
        let original_paths = original_paths(delivery);
        self.store.catalog_archive_del(&original_paths).await?;
        self.publish_cleanup_complete(key, "catalog-archive-remove", delivery).await
    }

    async fn publish_cleanup_complete(&self, key: &RoutingKey, worker: &str, delivery: &Delivery) -> Result<(), Error> {
        let data = Data { filelist: delivery.body.data.filelist.clone(), ..Data::default() };
        self.fabric
            .publish(&key.reply(worker, "complete")?, &Envelope::new(delivery.body.details.clone(), data))
            .await?;
        Ok(())
    }
}

fn original_paths(delivery: &Delivery) -> Vec<String> {
    delivery.body.data.filelist.iter().map(|p| p.original_path.clone()).collect()
}

/// Builds a `GetSelector` from whatever the inbound message carries:
/// explicit paths in the filelist take priority inside `resolve_files`,
/// with transaction/holding/tag fields along for the ride as fallbacks.
fn build_selector(details: &Details, data: &Data) -> GetSelector {
    let original_paths: Vec<String> = data.filelist.iter().map(|p| p.original_path.clone()).collect();
    let tag = details.tag_map.iter().next().map(|(k, v)| (k.clone(), v.clone()));

    GetSelector {
        transaction_id: Some(details.transaction_id),
        holding_id: details.holding_id,
        holding_label: details.holding_label.clone(),
        original_paths,
        tag,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use uuid::Uuid;

    use nlds_model::{ApiAction, PathType};

    use super::*;

    fn sample_details() -> Details {
        Details {
            transaction_id: Uuid::new_v4(),
            sub_id: Uuid::new_v4(),
            api_action: ApiAction::Get,
            user: "alice".into(),
            group: "users".into(),
            target: "object-store".into(),
            tenancy: "default".into(),
            access_key: "AKIAEXAMPLE".into(),
            secret_key: "secretexample".into(),
            job_label: None,
            holding_label: Some("my-holding".into()),
            holding_id: Some(42),
            tag_map: {
                let mut map = HashMap::new();
                map.insert("project".to_string(), "weather".to_string());
                map
            },
            retry_filelist: false,
        }
    }

    fn sample_path(original_path: &str) -> PathDetails {
        PathDetails::new(original_path, PathType::File, 1024, 1000, 1000, 0o644, Utc::now())
    }

    #[test]
    fn original_paths_reads_straight_off_the_filelist() {
        let delivery_data = Data {
            filelist: vec![sample_path("/a/one"), sample_path("/a/two")],
            ..Data::default()
        };
        let paths: Vec<String> = delivery_data.filelist.iter().map(|p| p.original_path.clone()).collect();
        assert_eq!(paths, vec!["/a/one".to_string(), "/a/two".to_string()]);
    }

    #[test]
    fn build_selector_carries_transaction_holding_and_one_tag() {
        let details = sample_details();
        let data = Data {
            filelist: vec![sample_path("/a/one")],
            ..Data::default()
        };

        let selector = build_selector(&details, &data);

        assert_eq!(selector.transaction_id, Some(details.transaction_id));
        assert_eq!(selector.holding_id, Some(42));
        assert_eq!(selector.holding_label.as_deref(), Some("my-holding"));
        assert_eq!(selector.original_paths, vec!["/a/one".to_string()]);
        assert_eq!(selector.tag, Some(("project".to_string(), "weather".to_string())));
    }

    #[test]
    fn build_selector_with_no_tags_or_filelist_still_carries_identity() {
        let mut details = sample_details();
        details.tag_map.clear();
        details.holding_label = None;
        details.holding_id = None;
        let data = Data::default();

        let selector = build_selector(&details, &data);

        assert!(selector.original_paths.is_empty());
        assert!(selector.tag.is_none());
        assert!(selector.holding_label.is_none());
        assert_eq!(selector.transaction_id, Some(details.transaction_id));
    }
}
