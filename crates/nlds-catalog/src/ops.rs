use chrono::Utc;
use uuid::Uuid;

use nlds_model::PathDetails;

use crate::error::Error;
use crate::models::{Aggregation, Holding, Location};
use crate::permissions::{check_delete, Role};

/// A file the `catalog-put` scan rejected because the same transaction
/// already catalogued a file at that path (spec §4.4's duplicate check).
#[derive(Debug, Clone)]
pub struct FailedPath {
    pub path: PathDetails,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogPutResult {
    pub completed: Vec<PathDetails>,
    pub failed: Vec<FailedPath>,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogGetResult {
    pub transfer_list: Vec<PathDetails>,
    pub archive_list: Vec<(PathDetails, i64)>,
    pub failed: Vec<FailedPath>,
}

/// Selects which files `catalog-get` should resolve. The caller (the
/// catalog worker, driven by the envelope it received) builds one of
/// these from whichever fields were present in `details`/`data`.
#[derive(Debug, Clone, Default)]
pub struct GetSelector {
    pub transaction_id: Option<Uuid>,
    pub holding_id: Option<i64>,
    pub holding_label: Option<String>,
    pub original_paths: Vec<String>,
    pub tag: Option<(String, String)>,
}

#[derive(Clone)]
pub struct CatalogStore {
    pool: sqlx::PgPool,
}

impl CatalogStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub async fn resolve_or_create_holding(
        &self,
        user: &str,
        group: &str,
        label: &str,
    ) -> Result<Holding, Error> {
        if let Some(holding) = sqlx::query_as::<_, Holding>(
            r#"SELECT id, label, "user", "group" FROM catalog.holdings WHERE "user" = $1 AND label = $2"#,
        )
        .bind(user)
        .bind(label)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(holding);
        }

        sqlx::query_as::<_, Holding>(
            r#"INSERT INTO catalog.holdings (label, "user", "group") VALUES ($1, $2, $3)
               RETURNING id, label, "user", "group""#,
        )
        .bind(label)
        .bind(user)
        .bind(group)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::from)
    }

    async fn resolve_or_create_transaction(
        &self,
        holding_id: i64,
        transaction_id: Uuid,
    ) -> Result<i64, Error> {
        if let Some(row) = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM catalog.transactions WHERE uuid = $1",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(row);
        }

        sqlx::query_scalar::<_, i64>(
            "INSERT INTO catalog.transactions (uuid, holding_id) VALUES ($1, $2) RETURNING id",
        )
        .bind(transaction_id)
        .bind(holding_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::from)
    }

    /// `catalog-put.start`: provisionally files each path under a
    /// resolved holding, rejecting duplicates within the same
    /// transaction.
    pub async fn catalog_put(
        &self,
        transaction_id: Uuid,
        user: &str,
        group: &str,
        label: &str,
        filelist: Vec<PathDetails>,
    ) -> Result<CatalogPutResult, Error> {
        let holding = self.resolve_or_create_holding(user, group, label).await?;
        let txn_row_id = self
            .resolve_or_create_transaction(holding.id, transaction_id)
            .await?;

        let mut result = CatalogPutResult::default();
        for path in filelist {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM catalog.files WHERE transaction_id = $1 AND original_path = $2)",
            )
            .bind(txn_row_id)
            .bind(&path.original_path)
            .fetch_one(&self.pool)
            .await?;

            if exists {
                result.failed.push(FailedPath {
                    reason: format!(
                        "file already catalogued in this transaction: {}",
                        path.original_path
                    ),
                    path,
                });
                continue;
            }

            sqlx::query(
                r#"INSERT INTO catalog.files
                   (original_path, path_type, link_path, size, "user", "group", permissions, transaction_id)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
            )
            .bind(&path.original_path)
            .bind(format!("{:?}", path.path_type))
            .bind(&path.link_target)
            .bind(path.size as i64)
            .bind(user)
            .bind(group)
            .bind(path.permissions as i32)
            .bind(txn_row_id)
            .execute(&self.pool)
            .await?;

            result.completed.push(path);
        }

        Ok(result)
    }

    /// `catalog-update.start`: attaches an OBJECT_STORE location to each
    /// file this transaction transferred. Used by two flows: a `put`
    /// attaching the first OBJECT_STORE location to a freshly catalogued
    /// file, and a tape recall filling in the empty marker `catalog-get`
    /// left behind (spec §8.1) once the recalled object lands back in
    /// object store. The lookup is scoped to `transaction_id` so two
    /// transactions holding the same `original_path` can't cross-attach
    /// each other's locations.
    pub async fn catalog_update(
        &self,
        transaction_id: Uuid,
        tenancy: &str,
        filelist: &[PathDetails],
    ) -> Result<(), Error> {
        for path in filelist {
            let Some(object_name) = &path.object_name else {
                continue;
            };
            let file_id: Option<i64> = sqlx::query_scalar(
                "SELECT f.id FROM catalog.files f \
                 JOIN catalog.transactions t ON t.id = f.transaction_id \
                 WHERE t.uuid = $1 AND f.original_path = $2",
            )
            .bind(transaction_id)
            .bind(&path.original_path)
            .fetch_optional(&self.pool)
            .await?;

            let Some(file_id) = file_id else { continue };

            let filled = sqlx::query(
                "UPDATE catalog.locations SET path = $1, url_netloc = $2, access_time = $3 \
                 WHERE storage_type = 'OBJECT_STORE' AND path = '' AND file_id = $4",
            )
            .bind(object_name)
            .bind(tenancy)
            .bind(Utc::now())
            .bind(file_id)
            .execute(&self.pool)
            .await?;

            if filled.rows_affected() > 0 {
                continue;
            }

            sqlx::query(
                r#"INSERT INTO catalog.locations
                   (storage_type, url_scheme, url_netloc, root, path, access_time, file_id)
                   VALUES ('OBJECT_STORE', 's3', $1, $2, $3, $4, $5)"#,
            )
            .bind(tenancy)
            .bind(tenancy)
            .bind(object_name)
            .bind(Utc::now())
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// `catalog-del.start`: removes provisional File rows, enforcing spec
    /// §4.4's delete permission policy (`check_delete`) per path — the
    /// caller's group must match the file's Holding group, and deleting a
    /// file owned by someone else needs a deputy/manager role. Paths that
    /// fail the check are reported back rather than silently skipped.
    pub async fn catalog_del(
        &self,
        caller_user: &str,
        caller_group: &str,
        role: Role,
        original_paths: &[String],
    ) -> Result<Vec<FailedPath>, Error> {
        let mut failed = Vec::new();

        for path in original_paths {
            let owner: Option<(String, String)> = sqlx::query_as(
                "SELECT f.\"user\", h.\"group\" FROM catalog.files f \
                 JOIN catalog.transactions t ON t.id = f.transaction_id \
                 JOIN catalog.holdings h ON h.id = t.holding_id \
                 WHERE f.original_path = $1 \
                 ORDER BY f.id DESC LIMIT 1",
            )
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

            let Some((file_owner, holding_group)) = owner else {
                continue;
            };

            if check_delete(caller_user, caller_group, &file_owner, &holding_group, role).is_err() {
                failed.push(FailedPath {
                    path: blank_path(path),
                    reason: "permission denied".into(),
                });
                continue;
            }

            sqlx::query("DELETE FROM catalog.files WHERE original_path = $1")
                .bind(path)
                .execute(&self.pool)
                .await?;
        }
        Ok(failed)
    }

    pub async fn catalog_remove_empty_locations(
        &self,
        storage_type: &str,
        original_paths: &[String],
    ) -> Result<(), Error> {
        for path in original_paths {
            sqlx::query(
                "DELETE FROM catalog.locations \
                 WHERE storage_type = $1 AND path = '' \
                   AND file_id IN (SELECT id FROM catalog.files WHERE original_path = $2)",
            )
            .bind(storage_type)
            .bind(path)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// `catalog-get.start`: resolves files by the given selector and
    /// sorts them into transfer-ready, archive-pending (creating the
    /// recall marker Location), or failed.
    pub async fn catalog_get(
        &self,
        caller_group: &str,
        selector: &GetSelector,
        full_unpack: bool,
    ) -> Result<CatalogGetResult, Error> {
        let files = self.resolve_files(selector).await?;
        let mut result = CatalogGetResult::default();

        for file_id in files {
            let holding_group: Option<String> = sqlx::query_scalar(
                "SELECT h.\"group\" FROM catalog.holdings h \
                 JOIN catalog.transactions t ON t.holding_id = h.id \
                 JOIN catalog.files f ON f.transaction_id = t.id \
                 WHERE f.id = $1",
            )
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;

            let original_path: String =
                sqlx::query_scalar("SELECT original_path FROM catalog.files WHERE id = $1")
                    .bind(file_id)
                    .fetch_one(&self.pool)
                    .await?;

            if crate::permissions::check_get(caller_group, holding_group.as_deref().unwrap_or_default()).is_err() {
                result.failed.push(FailedPath {
                    path: blank_path(&original_path),
                    reason: "permission denied".into(),
                });
                continue;
            }

            let locations = sqlx::query_as::<_, Location>(
                "SELECT * FROM catalog.locations WHERE file_id = $1",
            )
            .bind(file_id)
            .fetch_all(&self.pool)
            .await?;

            if let Some(os_loc) = locations
                .iter()
                .find(|l| l.storage_type == "OBJECT_STORE" && !l.path.is_empty())
            {
                result
                    .transfer_list
                    .push(located_path(file_id, &original_path, os_loc));
                continue;
            }

            if let Some(tape_loc) = locations.iter().find(|l| l.storage_type == "TAPE") {
                self.create_recall_marker(file_id).await?;
                let aggregation_id = tape_loc.aggregation_id;
                if let Some(aggregation_id) = aggregation_id {
                    let path = located_tape_path(
                        file_id,
                        &original_path,
                        tape_loc,
                        self.aggregate_tarname(aggregation_id).await?,
                    );
                    result.archive_list.push((path, aggregation_id));

                    if full_unpack {
                        self.enqueue_aggregation_siblings(aggregation_id, file_id, &mut result)
                            .await?;
                    }
                } else {
                    result.failed.push(FailedPath {
                        path: blank_path(&original_path),
                        reason: "tape location missing aggregation".into(),
                    });
                }
                continue;
            }

            result.failed.push(FailedPath {
                path: blank_path(&original_path),
                reason: "no location".into(),
            });
        }

        Ok(result)
    }

    async fn create_recall_marker(&self, file_id: i64) -> Result<(), Error> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM catalog.locations \
             WHERE file_id = $1 AND storage_type = 'OBJECT_STORE')",
        )
        .bind(file_id)
        .fetch_one(&self.pool)
        .await?;

        if exists {
            return Ok(());
        }

        sqlx::query(
            "INSERT INTO catalog.locations (storage_type, url_scheme, url_netloc, root, path, file_id) \
             VALUES ('OBJECT_STORE', '', '', '', '', $1)",
        )
        .bind(file_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn enqueue_aggregation_siblings(
        &self,
        aggregation_id: i64,
        already: i64,
        result: &mut CatalogGetResult,
    ) -> Result<(), Error> {
        let siblings: Vec<(i64, String)> = sqlx::query_as(
            "SELECT f.id, f.original_path FROM catalog.files f \
             JOIN catalog.locations l ON l.file_id = f.id \
             WHERE l.aggregation_id = $1 AND f.id != $2",
        )
        .bind(aggregation_id)
        .bind(already)
        .fetch_all(&self.pool)
        .await?;

        let tarname = self.aggregate_tarname(aggregation_id).await?;

        for (sibling_id, original_path) in siblings {
            self.create_recall_marker(sibling_id).await?;

            let sibling_loc = sqlx::query_as::<_, Location>(
                "SELECT * FROM catalog.locations WHERE file_id = $1 AND aggregation_id = $2",
            )
            .bind(sibling_id)
            .bind(aggregation_id)
            .fetch_optional(&self.pool)
            .await?;

            let path = match sibling_loc {
                Some(loc) => located_tape_path(sibling_id, &original_path, &loc, tarname.clone()),
                None => blank_path(&original_path),
            };
            result.archive_list.push((path, aggregation_id));
        }
        Ok(())
    }

    /// Looks up the `Aggregation.tarname` for `aggregation_id`, used to
    /// build the full tape address `catalog-get` attaches to each
    /// archive-bound path so archive-get doesn't need its own catalog
    /// lookup.
    async fn aggregate_tarname(&self, aggregation_id: i64) -> Result<Option<String>, Error> {
        let tarname: Option<String> =
            sqlx::query_scalar("SELECT tarname FROM catalog.aggregations WHERE id = $1")
                .bind(aggregation_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(tarname)
    }

    async fn resolve_files(&self, selector: &GetSelector) -> Result<Vec<i64>, Error> {
        if !selector.original_paths.is_empty() {
            let ids = sqlx::query_scalar::<_, i64>(
                "SELECT id FROM catalog.files WHERE original_path = ANY($1)",
            )
            .bind(&selector.original_paths)
            .fetch_all(&self.pool)
            .await?;
            return Ok(ids);
        }

        if let Some(transaction_id) = selector.transaction_id {
            let ids = sqlx::query_scalar::<_, i64>(
                "SELECT f.id FROM catalog.files f \
                 JOIN catalog.transactions t ON t.id = f.transaction_id \
                 WHERE t.uuid = $1",
            )
            .bind(transaction_id)
            .fetch_all(&self.pool)
            .await?;
            return Ok(ids);
        }

        if let Some(holding_id) = selector.holding_id {
            let ids = sqlx::query_scalar::<_, i64>(
                "SELECT f.id FROM catalog.files f \
                 JOIN catalog.transactions t ON t.id = f.transaction_id \
                 WHERE t.holding_id = $1",
            )
            .bind(holding_id)
            .fetch_all(&self.pool)
            .await?;
            return Ok(ids);
        }

        if let Some(label) = &selector.holding_label {
            let ids = sqlx::query_scalar::<_, i64>(
                "SELECT f.id FROM catalog.files f \
                 JOIN catalog.transactions t ON t.id = f.transaction_id \
                 JOIN catalog.holdings h ON h.id = t.holding_id \
                 WHERE h.label = $1",
            )
            .bind(label)
            .fetch_all(&self.pool)
            .await?;
            return Ok(ids);
        }

        if let Some((key, value)) = &selector.tag {
            let ids = sqlx::query_scalar::<_, i64>(
                "SELECT f.id FROM catalog.files f \
                 JOIN catalog.transactions t ON t.id = f.transaction_id \
                 JOIN catalog.tags tag ON tag.holding_id = t.holding_id \
                 WHERE tag.key = $1 AND tag.value = $2",
            )
            .bind(key)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;
            return Ok(ids);
        }

        Ok(Vec::new())
    }

    /// `catalog-archive-next.start`: the oldest holding with any
    /// tape-less file becomes the next archive candidate batch.
    pub async fn catalog_archive_next(&self) -> Result<Vec<PathDetails>, Error> {
        let rows: Vec<(i64, String, i64, i64, i32)> = sqlx::query_as(
            "SELECT f.id, f.original_path, f.size, h.id as holding_id, f.permissions \
             FROM catalog.files f \
             JOIN catalog.transactions t ON t.id = f.transaction_id \
             JOIN catalog.holdings h ON h.id = t.holding_id \
             WHERE f.id NOT IN ( \
                 SELECT file_id FROM catalog.locations WHERE storage_type = 'TAPE' \
             ) \
             ORDER BY h.id ASC \
             LIMIT 1000",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for (file_id, original_path, size, _holding_id, permissions) in rows {
            sqlx::query(
                "INSERT INTO catalog.locations (storage_type, url_scheme, url_netloc, root, path, file_id) \
                 VALUES ('TAPE', '', '', '', '', $1)",
            )
            .bind(file_id)
            .execute(&self.pool)
            .await?;

            let mut path = blank_path(&original_path);
            path.size = size as u64;
            path.permissions = permissions as u32;
            path.catalog_file_id = Some(file_id);
            out.push(path);
        }
        Ok(out)
    }

    /// `catalog-archive-update.start`: on archive-put success, creates
    /// (or reuses) the Aggregation and fills in each member's TAPE path.
    pub async fn catalog_archive_update(
        &self,
        tarname: &str,
        checksum: &str,
        algorithm: &str,
        root: &str,
        members: &[PathDetails],
    ) -> Result<Aggregation, Error> {
        let aggregation = sqlx::query_as::<_, Aggregation>(
            "INSERT INTO catalog.aggregations (tarname, checksum, algorithm) \
             VALUES ($1, $2, $3) RETURNING id, tarname, checksum, algorithm, failed",
        )
        .bind(tarname)
        .bind(checksum)
        .bind(algorithm)
        .fetch_one(&self.pool)
        .await?;

        for member in members {
            // `catalog_file_id` is set by `catalog-archive-next` when it
            // first creates this member's empty TAPE marker, so the write
            // back targets that exact row rather than re-resolving
            // `original_path`, which is not unique across transactions.
            let Some(file_id) = member.catalog_file_id else {
                continue;
            };

            sqlx::query(
                "UPDATE catalog.locations SET path = $1, root = $2, aggregation_id = $3, access_time = NOW() \
                 WHERE storage_type = 'TAPE' AND file_id = $4",
            )
            .bind(member.object_name.as_deref().unwrap_or_default())
            .bind(root)
            .bind(aggregation.id)
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        }
        Ok(aggregation)
    }

    /// `catalog-archive-del.start` / `catalog-archive-remove.start`:
    /// strips the empty TAPE (resp. OBJECT_STORE) markers so the next
    /// archive-next or get cycle retries cleanly.
    pub async fn catalog_archive_del(&self, original_paths: &[String]) -> Result<(), Error> {
        self.catalog_remove_empty_locations("TAPE", original_paths)
            .await
    }

    pub async fn catalog_archive_remove(&self, original_paths: &[String]) -> Result<(), Error> {
        self.catalog_remove_empty_locations("OBJECT_STORE", original_paths)
            .await
    }
}

fn blank_path(original_path: &str) -> PathDetails {
    PathDetails::new(
        original_path,
        nlds_model::PathType::File,
        0,
        0,
        0,
        0,
        Utc::now(),
    )
}

fn located_path(file_id: i64, original_path: &str, location: &Location) -> PathDetails {
    let mut path = blank_path(original_path);
    path.object_name = Some(location.path.clone());
    path.catalog_file_id = Some(file_id);
    path
}

/// Builds the `PathDetails` archive-get receives for one tape-bound
/// member: `object_name` is the member's key inside the tar, and
/// `tape_location` is the full tape address, built from the Location's
/// own scheme/netloc/root plus the owning Aggregation's tarname (absent
/// if the aggregation row went missing somehow, in which case archive-get
/// will fail the path for lack of a tape address). `catalog_file_id` lets
/// the later `catalog-update` recall-fill target this exact row.
fn located_tape_path(
    file_id: i64,
    original_path: &str,
    location: &Location,
    tarname: Option<String>,
) -> PathDetails {
    let mut path = blank_path(original_path);
    path.object_name = Some(location.path.clone());
    path.tape_location = tarname.map(|tarname| {
        format!("{}://{}/{}/{}", location.url_scheme, location.url_netloc, location.root, tarname)
    });
    path.catalog_file_id = Some(file_id);
    path
}
