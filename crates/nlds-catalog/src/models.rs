use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mirrors the `storage_type` text column's two allowed values. Not
/// itself an `sqlx::Type`: the column is plain `TEXT` with a `CHECK`
/// constraint (see migrations/0001_init.sql), so rows are read as
/// `String` and converted with `FromStr`/`Display` at the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageType {
    ObjectStore,
    Tape,
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StorageType::ObjectStore => "OBJECT_STORE",
            StorageType::Tape => "TAPE",
        })
    }
}

impl std::str::FromStr for StorageType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OBJECT_STORE" => Ok(StorageType::ObjectStore),
            "TAPE" => Ok(StorageType::Tape),
            other => Err(crate::error::Error::UnknownStorageType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Holding {
    pub id: i64,
    pub label: String,
    pub user: String,
    pub group: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub uuid: Uuid,
    pub ingest_time: DateTime<Utc>,
    pub holding_id: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub key: String,
    pub value: String,
    pub holding_id: i64,
}

/// A File as catalog-put provisionally creates it: no Location yet, no
/// guarantee it will ever get one (transfer-put may still fail it).
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct File {
    pub id: i64,
    pub original_path: String,
    pub path_type: String,
    pub link_path: Option<String>,
    pub size: i64,
    pub user: String,
    pub group: String,
    pub permissions: i32,
    pub transaction_id: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Location {
    pub id: i64,
    pub storage_type: String,
    pub url_scheme: String,
    pub url_netloc: String,
    pub root: String,
    pub path: String,
    pub access_time: Option<DateTime<Utc>>,
    pub file_id: i64,
    pub aggregation_id: Option<i64>,
}

impl Location {
    /// An OBJECT_STORE location with an empty path is the "recall
    /// pending" marker described in spec §3.
    pub fn is_recall_pending(&self) -> bool {
        self.storage_type == "OBJECT_STORE" && self.path.is_empty()
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Aggregation {
    pub id: i64,
    pub tarname: String,
    pub checksum: Option<String>,
    pub algorithm: Option<String>,
    pub failed: bool,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Checksum {
    pub id: i64,
    pub value: String,
    pub algorithm: String,
    pub file_id: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Quota {
    pub id: i64,
    pub group: String,
    pub size: i64,
    pub used: i64,
}
