use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `authentication`: backend name plus whatever URLs/secrets that backend
/// needs, which the spec leaves backend-specific — carried as an opaque
/// bag rather than modeled field-by-field, since HTTP-facing auth is out
/// of core scope (§1) and nothing downstream of it interprets these keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationConfig {
    pub backend: String,
    #[serde(flatten)]
    pub options: HashMap<String, String>,
}

/// `general`: the default back-off table and retry ceiling shared by every
/// stage, per §5's retry discipline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub retry_delays: Vec<u64>,
    pub max_retries: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            retry_delays: vec![1, 2, 4, 8, 16, 32, 64, 128, 256],
            max_retries: 5,
        }
    }
}

/// Per-stage override block: each stage-specific group below embeds one
/// of these for `print_tracebacks` and an optional `logging_q` override,
/// plus whatever stage-specific knobs it doesn't already model explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageOverrides {
    #[serde(default)]
    pub print_tracebacks: bool,
    #[serde(default)]
    pub logging: Option<LoggingQConfig>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbEngine {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexQConfig {
    #[serde(flatten)]
    pub overrides: StageOverrides,
    pub filelist_max_length: u32,
    pub message_threshold: u64,
    #[serde(default = "default_true")]
    pub check_permissions: bool,
    #[serde(default = "default_true")]
    pub check_filesize: bool,
    pub max_filesize: u64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogQConfig {
    #[serde(flatten)]
    pub overrides: StageOverrides,
    pub db_engine: DbEngine,
    pub db_options: String,
    pub default_tenancy: String,
    pub default_tape_url: String,
    /// When a `catalog-get` resolves a tape-backed file, also enqueue
    /// every sibling sharing its Aggregation, per spec §4.4's
    /// "full-unpack" deployment mode (default on: tape recalls are
    /// expensive enough that amortising them is the common case).
    #[serde(default = "default_true")]
    pub full_unpack: bool,
    /// Object-store credentials `catalog-archive-next`'s periodic trigger
    /// uses when seeding `archive-put.init`: the archive candidates it
    /// selects can span many original callers' transactions, so it reads
    /// them back under one system-level credential rather than the
    /// original requester's.
    #[serde(default)]
    pub system_access_key: String,
    #[serde(default)]
    pub system_secret_key: String,
    /// How often `catalog-archive-next` is polled (default 5 minutes).
    #[serde(with = "humantime_serde", default = "default_archive_next_interval")]
    pub archive_next_interval: Duration,
}

fn default_archive_next_interval() -> Duration {
    Duration::from_secs(300)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferPutQConfig {
    #[serde(flatten)]
    pub overrides: StageOverrides,
    pub tenancy: String,
    #[serde(default)]
    pub require_secure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferGetQConfig {
    #[serde(flatten)]
    pub overrides: StageOverrides,
    pub tenancy: String,
    #[serde(default)]
    pub require_secure: bool,
    #[serde(default)]
    pub chown_enable: bool,
    pub chown_helper_name: Option<String>,
    /// Sub-list length an oversized `transfer-get.init` filelist is
    /// chunked into, per spec §4.6 (default 1000).
    #[serde(default = "default_transfer_get_filelist_max_length")]
    pub filelist_max_length: u32,
}

fn default_transfer_get_filelist_max_length() -> u32 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivePutQConfig {
    #[serde(flatten)]
    pub overrides: StageOverrides,
    pub tape_url: String,
    pub tape_pool: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default)]
    pub query_checksum: bool,
    /// Upper bound on one aggregate's cumulative member size before
    /// archive-put starts a new one, per spec §4.7 step 1 (default 10 GiB).
    #[serde(default = "default_max_aggregate_bytes")]
    pub max_aggregate_bytes: u64,
    #[serde(default)]
    pub require_secure: bool,
}

fn default_chunk_size() -> u64 {
    5 * 1024 * 1024
}

fn default_max_aggregate_bytes() -> u64 {
    10 * 1024 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveGetQConfig {
    #[serde(flatten)]
    pub overrides: StageOverrides,
    pub tape_url: String,
    pub tape_pool: String,
    pub chunk_size: u64,
    #[serde(default)]
    pub query_checksum: bool,
    #[serde(with = "humantime_serde", default = "default_prepare_requeue")]
    pub prepare_requeue: Duration,
    #[serde(default)]
    pub require_secure: bool,
}

fn default_prepare_requeue() -> Duration {
    Duration::from_secs(300)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorQConfig {
    #[serde(flatten)]
    pub overrides: StageOverrides,
    pub db_engine: DbEngine,
    pub db_options: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingQConfig {
    #[serde(default)]
    pub log_files: Vec<String>,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_backup_count")]
    pub backup_count: u32,
}

fn default_max_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_backup_count() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcPublisherConfig {
    #[serde(with = "humantime_serde")]
    pub time_limit: Duration,
    #[serde(default)]
    pub queue_exclusivity: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_q_fills_in_defaults() {
        let yaml = r#"
filelist_max_length: 10000
message_threshold: 5000000
max_filesize: 107374182400
"#;
        let cfg: IndexQConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.check_permissions);
        assert!(cfg.check_filesize);
        assert!(!cfg.overrides.print_tracebacks);
    }

    #[test]
    fn rpc_publisher_parses_humantime_duration() {
        let yaml = r#"
time_limit: "30s"
queue_exclusivity: true
"#;
        let cfg: RpcPublisherConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.time_limit, Duration::from_secs(30));
        assert!(cfg.queue_exclusivity);
    }
}
