use serde::{Deserialize, Serialize};

/// The `fabric` configuration group from spec §6: connection details for
/// the message fabric plus the static topology (exchange + queue
/// bindings) every worker binds to on startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricConfig {
    pub user: String,
    pub password: String,
    pub server: String,
    #[serde(default = "default_vhost")]
    pub vhost: String,
    #[serde(default = "default_heartbeat")]
    pub heartbeat: u32,
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub queues: Vec<QueueConfig>,
    pub admin_port: u16,
}

fn default_vhost() -> String {
    "/".to_string()
}

fn default_heartbeat() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub exchange_type: String,
    #[serde(default)]
    pub delayed: bool,
}

/// A queue this worker should declare and bind on startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub name: String,
    #[serde(default)]
    pub bindings: Vec<BindingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingConfig {
    pub exchange: String,
    pub routing_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_minimal_fabric_block() {
        let yaml = r#"
user: nlds
password: nlds
server: fabric.example.org
exchange:
  name: nlds-exchange
  type: topic
queues:
  - name: nlds-api.index
    bindings:
      - exchange: nlds-exchange
        routing_key: "*.index.*"
admin_port: 15672
"#;
        let cfg: FabricConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.vhost, "/");
        assert_eq!(cfg.heartbeat, 30);
        assert_eq!(cfg.queues.len(), 1);
        assert_eq!(cfg.queues[0].bindings[0].routing_key, "*.index.*");
    }
}
