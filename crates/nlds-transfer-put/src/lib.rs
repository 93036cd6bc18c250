mod error;
mod transfer;
mod worker;

pub use error::Error;
pub use transfer::{transfer_put, FailedPath, TransferOutcome};
pub use worker::{TransferPutSettings, Worker};

pub const DEFAULT_BINDINGS: &[&str] = &["*.transfer-put.*"];
