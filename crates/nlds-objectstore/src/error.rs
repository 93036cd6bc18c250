#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("object store error")]
    Store(#[from] object_store::Error),

    #[error("failed to build S3 client for tenancy {tenancy:?}")]
    Build {
        tenancy: String,
        #[source]
        source: object_store::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
