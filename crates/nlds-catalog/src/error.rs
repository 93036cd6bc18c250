#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("catalog database error")]
    Database(#[from] sqlx::Error),

    #[error("unknown storage_type value {0:?}")]
    UnknownStorageType(String),

    #[error("file already catalogued for holding {holding_id} at {original_path:?}")]
    DuplicateFile {
        holding_id: i64,
        original_path: String,
    },

    #[error("no file matched the given selector")]
    NotFound,

    #[error("caller's group {caller_group:?} does not match holding group {holding_group:?}")]
    PermissionDenied {
        caller_group: String,
        holding_group: String,
    },
}
