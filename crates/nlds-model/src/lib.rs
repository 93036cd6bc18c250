//! Shared vocabulary for NLDS: the message envelope, the per-path record
//! that travels inside it, the routing-key wire format, and the
//! transaction/sub-transaction state enums used by the catalog, monitor
//! and marshaller crates alike.
//!
//! Kept dependency-light and broker-agnostic on purpose — every other NLDS
//! crate depends on this one, but it depends on nothing that talks to
//! Postgres or the fabric directly (the `sqlx-support` feature only adds
//! `sqlx::Type`/`sqlx::FromRow` friendly conversions, never a `PgPool`).

mod envelope;
mod path_details;
mod routing_key;
mod state;

pub use envelope::{Data, Details, Envelope, Meta};
pub use path_details::{PathDetails, PathType};
pub use routing_key::{Error as RoutingKeyError, RoutingKey};
pub use state::{ApiAction, SubState};
