#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("tape endpoint request failed")]
    Request(#[from] reqwest::Error),

    #[error("tape endpoint returned an unexpected response for {aggregate:?}")]
    UnexpectedResponse { aggregate: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed tape location {0:?}, expected scheme://netloc/root/aggregate")]
    MalformedAggregateRef(String),
}
