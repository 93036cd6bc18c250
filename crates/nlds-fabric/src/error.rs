/// The fabric's own error type. Stage binaries narrow this further using
/// their crate's `Classify` trait (see `nlds-model`'s error taxonomy note)
/// to decide retry vs. fail-fast.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("fabric database error")]
    Database(#[from] sqlx::Error),

    #[error("failed to serialize message envelope")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to deserialize message envelope")]
    Deserialize(#[source] serde_json::Error),

    #[error("invalid routing key")]
    RoutingKey(#[from] nlds_model::RoutingKeyError),

    #[error("rpc call to {routing_key} timed out after {time_limit:?}")]
    RpcTimeout {
        routing_key: String,
        time_limit: std::time::Duration,
    },
}
