use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nlds_model::{ApiAction, SubState};

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: i64,
    pub transaction_id: Uuid,
    pub job_label: Option<String>,
    pub user: String,
    pub group: String,
    pub api_action: ApiAction,
    pub creation_time: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct SubRecord {
    pub id: i64,
    pub sub_id: Uuid,
    pub transaction_record_id: i64,
    pub state: SubState,
    pub retry_count: i32,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct FailedFile {
    pub id: i64,
    pub filepath: String,
    pub reason: String,
    pub sub_record_id: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Warning {
    pub id: i64,
    pub warning: String,
    pub transaction_record_id: i64,
}
