#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("monitor database error")]
    Database(#[from] sqlx::Error),

    #[error("no sub-record found for sub_id {0}")]
    UnknownSubId(uuid::Uuid),

    #[error("no transaction record found for transaction_id {0}")]
    UnknownTransactionId(uuid::Uuid),
}
