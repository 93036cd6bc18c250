#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("fabric error")]
    Fabric(#[from] nlds_fabric::Error),
    #[error("inbound routing key was malformed")]
    RoutingKey(#[from] nlds_model::RoutingKeyError),
    #[error("object store error")]
    ObjectStore(#[from] nlds_objectstore::Error),
    #[error("could not locate the chown helper binary")]
    ChownHelper(#[source] anyhow::Error),
}
