//! The message fabric (spec §4.1): topic-routed, durable delivery between
//! NLDS stages, plus the RPC convention (§4.10) layered on top of it.
//!
//! No AMQP broker crate exists anywhere in the corpus this workspace was
//! built from, so the fabric's observable contract — topic matching,
//! delayed delivery, prefetch, durability, request/reply — is implemented
//! directly against Postgres, using the `FOR UPDATE SKIP LOCKED` dequeue
//! idiom of a control-plane task queue. The `Fabric` trait keeps stage
//! code from depending on that choice directly; only `PgFabric` ships.

mod binding;
mod delivery;
mod error;
mod pg;
mod rpc;

pub use delivery::Delivery;
pub use error::Error;
pub use pg::{Fabric, PgFabric};
pub use rpc::RpcClient;

#[cfg(test)]
mod tests {
    use super::*;
    use nlds_model::{Data, Details, Envelope, RoutingKey};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn sample_envelope() -> Envelope {
        Envelope::new(
            Details {
                transaction_id: Uuid::new_v4(),
                sub_id: Uuid::new_v4(),
                api_action: nlds_model::ApiAction::Put,
                user: "alice".into(),
                group: "users".into(),
                target: "object-store".into(),
                tenancy: "default".into(),
                access_key: "AKIAEXAMPLE".into(),
                secret_key: "secretexample".into(),
                job_label: None,
                holding_label: None,
                holding_id: None,
                tag_map: HashMap::new(),
                retry_filelist: false,
            },
            Data::default(),
        )
    }

    #[test]
    fn routing_key_round_trips_through_envelope_serialization() {
        let key: RoutingKey = "nlds-api.index.init".parse().unwrap();
        let envelope = sample_envelope();
        let _ = serde_json::to_string(&envelope).unwrap();
        assert_eq!(key.to_string(), "nlds-api.index.init");
    }
}
