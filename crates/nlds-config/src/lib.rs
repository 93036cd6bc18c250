//! Deserializes the NLDS configuration file (spec §6) into a `Settings`
//! tree, with a thin environment-variable override layer for the secrets
//! an operator would rather not commit to a config file on disk.
//!
//! Loaded once at process startup (per spec §9, the only process-global
//! state) and handed to every stage as an `Arc<Settings>`.

mod fabric;
mod stage;

pub use fabric::{BindingConfig, ExchangeConfig, FabricConfig, QueueConfig};
pub use stage::{
    ArchiveGetQConfig, ArchivePutQConfig, AuthenticationConfig, CatalogQConfig, DbEngine,
    GeneralConfig, IndexQConfig, LoggingQConfig, MonitorQConfig, RpcPublisherConfig,
    StageOverrides, TransferGetQConfig, TransferPutQConfig,
};

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path} as YAML")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub authentication: AuthenticationConfig,
    pub fabric: FabricConfig,
    #[serde(default)]
    pub general: GeneralConfig,
    pub index_q: IndexQConfig,
    pub catalog_q: CatalogQConfig,
    pub transfer_put_q: TransferPutQConfig,
    pub transfer_get_q: TransferGetQConfig,
    pub archive_put_q: ArchivePutQConfig,
    pub archive_get_q: ArchiveGetQConfig,
    pub monitor_q: MonitorQConfig,
    #[serde(default)]
    pub logging_q: LoggingQConfig,
    pub rpc_publisher: RpcPublisherConfig,
}

impl Settings {
    /// Reads and parses the YAML config file at `path`, then applies the
    /// small set of environment variable overrides operators use to keep
    /// database and fabric credentials out of the file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut settings: Settings =
            serde_yaml::from_str(&raw).map_err(|source| Error::Parse {
                path: path.display().to_string(),
                source,
            })?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var("NLDS_FABRIC_PASSWORD") {
            self.fabric.password = password;
        }
        if let Ok(db_options) = std::env::var("NLDS_CATALOG_DB_OPTIONS") {
            self.catalog_q.db_options = db_options;
        }
        if let Ok(db_options) = std::env::var("NLDS_MONITOR_DB_OPTIONS") {
            self.monitor_q.db_options = db_options;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
authentication:
  backend: jasmin

fabric:
  user: nlds
  password: nlds
  server: fabric.example.org
  exchange:
    name: nlds-exchange
    type: topic
  admin_port: 15672

index_q:
  filelist_max_length: 10000
  message_threshold: 5000000
  max_filesize: 107374182400

catalog_q:
  db_engine: postgres
  db_options: "postgres://nlds@localhost/catalog"
  default_tenancy: default
  default_tape_url: "root://tape.example.org//nlds"

transfer_put_q:
  tenancy: default

transfer_get_q:
  tenancy: default

archive_put_q:
  tape_url: "root://tape.example.org//nlds"
  tape_pool: nlds-pool
  chunk_size: 5368709120

archive_get_q:
  tape_url: "root://tape.example.org//nlds"
  tape_pool: nlds-pool
  chunk_size: 5368709120

monitor_q:
  db_engine: postgres
  db_options: "postgres://nlds@localhost/monitor"

rpc_publisher:
  time_limit: "30s"
"#
    }

    #[test]
    fn parses_full_settings_document() {
        let settings: Settings = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(settings.general.max_retries, 5);
        assert_eq!(settings.fabric.vhost, "/");
        assert_eq!(settings.logging_q.backup_count, 5);
        assert_eq!(
            settings.archive_get_q.prepare_requeue,
            std::time::Duration::from_secs(300)
        );
    }

    #[test]
    fn env_override_replaces_fabric_password() {
        let mut settings: Settings = serde_yaml::from_str(minimal_yaml()).unwrap();
        std::env::set_var("NLDS_FABRIC_PASSWORD", "overridden");
        settings.apply_env_overrides();
        std::env::remove_var("NLDS_FABRIC_PASSWORD");
        assert_eq!(settings.fabric.password, "overridden");
    }
}
