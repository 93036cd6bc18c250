//! S3-compatible warm-tier client (spec §4.5/§4.6), addressed per
//! tenancy with credentials carried in the message envelope rather than
//! configured once for the whole process.

mod client;
mod error;

pub use client::ObjectStoreClient;
pub use error::Error;
