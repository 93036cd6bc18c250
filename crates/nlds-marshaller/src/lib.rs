//! The marshaller (spec §4.2): a stateless router sitting on the message
//! fabric that inspects an inbound `application.worker.state` routing key
//! and republishes the envelope, unchanged, to whatever the transition
//! table says comes next. It holds no state across messages — every
//! decision is a pure function of one delivery.

mod error;
mod transition;
mod worker;

pub use error::Error;
pub use transition::{next_action, Action, Publication};
pub use worker::Worker;

/// Default bindings the marshaller's queue needs if the operator hasn't
/// declared its own in the fabric config: every `*.*.complete`,
/// `*.*.failed`, `*.*.archive-restore` and `*.*.recall-complete` message,
/// since those are the only routing-key shapes the transition table in
/// `transition.rs` acts on.
pub const DEFAULT_BINDINGS: &[&str] = &[
    "*.*.complete",
    "*.*.failed",
    "*.*.archive-restore",
    "*.*.recall-complete",
];
