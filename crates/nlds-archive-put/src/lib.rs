mod archive;
mod error;
mod packer;
mod tar_stream;
mod worker;
mod writer;

pub use archive::{archive_put_aggregate, AggregateOutcome, FailedPath, CHECKSUM_ALGORITHM};
pub use error::Error;
pub use packer::pack;
pub use worker::{ArchivePutSettings, Worker};

pub const DEFAULT_BINDINGS: &[&str] = &["*.archive-put.init", "*.archive-put.start"];
