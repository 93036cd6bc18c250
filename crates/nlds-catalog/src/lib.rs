//! The Catalog store (spec §4.4): the durable record of every Holding,
//! Transaction, File and Location, serialised through a single-consumer
//! queue so writes never race.

mod error;
mod models;
mod ops;
pub mod permissions;
mod periodic;
mod worker;
mod worker_error;

pub use error::Error;
pub use models::{Aggregation, Checksum, File, Holding, Location, Quota, StorageType, Tag, Transaction};
pub use ops::{CatalogGetResult, CatalogPutResult, CatalogStore, FailedPath, GetSelector};
pub use periodic::{run as run_archive_next, ArchiveNextSettings};
pub use worker::{CatalogSettings, Worker};
pub use worker_error::Error as WorkerError;

/// Default bindings for the catalog queue: every fixed operation spec §4.4
/// names, each a `<worker>.start` routing key.
pub const DEFAULT_BINDINGS: &[&str] = &[
    "*.catalog-put.start",
    "*.catalog-update.start",
    "*.catalog-del.start",
    "*.catalog-remove.start",
    "*.catalog-get.start",
    "*.catalog-archive-update.start",
    "*.catalog-archive-del.start",
    "*.catalog-archive-remove.start",
];
