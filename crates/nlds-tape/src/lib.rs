//! The tape (cold-tier) client (spec §4.7/§4.8): prepare/poll/stream
//! against an xrootd-style tape system. No xrootd crate exists in the
//! corpus this workspace was built from, so the prepare/poll/stat
//! surface is modeled as a small HTTP gateway API via `reqwest`, behind
//! the `TapeClient` trait archive-put/archive-get actually depend on.

mod client;
mod error;

pub use client::{AggregateRef, HttpTapeClient, PollResult, StatResult, TapeClient};
pub use error::Error;
