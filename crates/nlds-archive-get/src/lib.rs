//! Tape retrieval (spec §4.8): a three-state sub-state-machine that
//! stages an aggregate off tape before streaming it and re-uploading
//! its members to the object store.

mod error;
mod extract;
mod group;
mod restore;
mod worker;

pub use error::Error;
pub use worker::{ArchiveGetSettings, Worker};

pub const DEFAULT_BINDINGS: &[&str] = &[
    "*.archive-get.prepare",
    "*.archive-get.prepare-check",
    "*.archive-get.start",
];
