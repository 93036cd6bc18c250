#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("fabric error")]
    Fabric(#[from] nlds_fabric::Error),
    #[error("inbound routing key was malformed")]
    RoutingKey(#[from] nlds_model::RoutingKeyError),
}
