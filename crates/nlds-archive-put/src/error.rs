#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("fabric error")]
    Fabric(#[from] nlds_fabric::Error),
    #[error("inbound routing key was malformed")]
    RoutingKey(#[from] nlds_model::RoutingKeyError),
    #[error("object store error")]
    ObjectStore(#[from] nlds_objectstore::Error),
    #[error("tape error")]
    Tape(#[from] nlds_tape::Error),
    #[error("malformed tape URL")]
    TapeUrl(#[from] url::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("tape write task was dropped without reporting a result")]
    WriterTaskLost,
}
