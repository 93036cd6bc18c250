#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("catalog store error")]
    Store(#[from] crate::error::Error),
    #[error("fabric error")]
    Fabric(#[from] nlds_fabric::Error),
    #[error("inbound routing key was malformed")]
    RoutingKey(#[from] nlds_model::RoutingKeyError),
}
