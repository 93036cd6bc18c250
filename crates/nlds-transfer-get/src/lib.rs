mod chown;
mod error;
mod transfer;
mod worker;

pub use chown::Chowner;
pub use error::Error;
pub use transfer::{transfer_get, FailedPath, TransferOutcome};
pub use worker::{TransferGetSettings, Worker};

pub const DEFAULT_BINDINGS: &[&str] = &["*.transfer-get.init", "*.transfer-get.start"];
