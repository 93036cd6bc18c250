use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Classifies a filesystem entry the indexer discovered, per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathType {
    File,
    Directory,
    LinkCommon,
    LinkAbsolute,
}

/// One filesystem entry as it travels through the fabric, from indexing
/// through to completion or permanent failure.
///
/// `retries` counts delivery attempts already made for this path by the
/// current stage; it resets to zero when the path moves to a new stage.
/// `retry_reasons` accumulates a short, human-readable reason per attempt
/// and is never truncated — the spec places no separate length bound on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathDetails {
    pub original_path: String,
    pub path_type: PathType,
    pub link_target: Option<String>,

    pub size: u64,
    pub owner_uid: u32,
    pub group_gid: u32,
    pub permissions: u32,
    pub access_time: chrono::DateTime<chrono::Utc>,

    /// Deterministic object-store / tape key, set once by the indexer and
    /// stable for the lifetime of the path. `None` until assigned.
    pub object_name: Option<String>,

    /// The catalog Aggregation this path was bundled into on tape, set by
    /// `catalog-get` when resolving a recall so archive-get can group
    /// sibling paths sharing one tape aggregate into a single prepare
    /// request (spec §4.8). `None` for paths that never went to tape.
    #[serde(default)]
    pub aggregation_id: Option<i64>,

    /// The full tape address (`scheme://netloc/root/aggregate`) this
    /// path's member was archived under, set by `catalog-get` alongside
    /// `aggregation_id` so archive-get can build an `AggregateRef`
    /// without a second catalog lookup. `None` for paths that never
    /// went to tape.
    #[serde(default)]
    pub tape_location: Option<String>,

    /// The `catalog.files.id` this path resolves to, set by `catalog-get`
    /// and `catalog-archive-next` so a later stage writing back a Location
    /// (`catalog-update`, `catalog-archive-update`) can target the exact
    /// row instead of re-resolving `original_path`, which is not unique
    /// across transactions. `None` for paths that haven't been catalogued
    /// yet (indexing, routing).
    #[serde(default)]
    pub catalog_file_id: Option<i64>,

    pub retries: u32,
    pub retry_reasons: Vec<String>,
}

impl PathDetails {
    pub fn new(
        original_path: impl Into<String>,
        path_type: PathType,
        size: u64,
        owner_uid: u32,
        group_gid: u32,
        permissions: u32,
        access_time: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            original_path: original_path.into(),
            path_type,
            link_target: None,
            size,
            owner_uid,
            group_gid,
            permissions,
            access_time,
            object_name: None,
            aggregation_id: None,
            tape_location: None,
            catalog_file_id: None,
            retries: 0,
            retry_reasons: Vec::new(),
        }
    }

    /// Derives and assigns this path's object-store/tape key: the hex SHA-256
    /// digest of `transaction_id` and `original_path`, so the name is stable
    /// for retries but unique across transactions touching the same path.
    pub fn assign_object_name(&mut self, transaction_id: Uuid) {
        let mut hasher = Sha256::new();
        hasher.update(transaction_id.as_bytes());
        hasher.update(self.original_path.as_bytes());
        self.object_name = Some(hex::encode(hasher.finalize()));
    }

    /// Records a failed attempt against this path. The caller decides,
    /// based on its own max-retries configuration, whether to requeue or
    /// to fail the path permanently — this only appends to the history.
    pub fn record_retry(&mut self, reason: impl Into<String>) {
        self.retries += 1;
        self.retry_reasons.push(reason.into());
    }

    pub fn reset_retries(&mut self) {
        self.retries = 0;
        self.retry_reasons.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PathDetails {
        PathDetails::new(
            "/data/project/file.nc",
            PathType::File,
            1024,
            1000,
            1000,
            0o644,
            chrono::Utc::now(),
        )
    }

    #[test]
    fn object_name_is_stable_for_same_transaction_and_path() {
        let txn = Uuid::new_v4();
        let mut a = sample();
        let mut b = sample();
        a.assign_object_name(txn);
        b.assign_object_name(txn);
        assert_eq!(a.object_name, b.object_name);
    }

    #[test]
    fn object_name_differs_across_transactions() {
        let mut a = sample();
        let mut b = sample();
        a.assign_object_name(Uuid::new_v4());
        b.assign_object_name(Uuid::new_v4());
        assert_ne!(a.object_name, b.object_name);
    }

    #[test]
    fn record_retry_accumulates_reasons() {
        let mut p = sample();
        p.record_retry("connection reset");
        p.record_retry("timeout");
        assert_eq!(p.retries, 2);
        assert_eq!(p.retry_reasons, vec!["connection reset", "timeout"]);
    }
}
