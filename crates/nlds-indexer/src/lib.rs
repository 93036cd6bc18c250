//! The indexer (spec §4.3): expands a user's raw path list into a
//! verified, chunked filelist. Two entry states drive it —
//! `index.init` splits the raw list into sub-transactions, `index.start`
//! walks one sub-transaction's paths and emits batches bounded by entry
//! count or cumulative size.

mod classify;
mod error;
mod permissions;
mod walk;
mod worker;

pub use classify::WalkLimits;
pub use error::Error;
pub use permissions::Identity;
pub use walk::{split_filelist, walk_sublist, Batch, FailedPath};
pub use worker::Worker;
