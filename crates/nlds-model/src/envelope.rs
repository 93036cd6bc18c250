use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::path_details::PathDetails;
use crate::state::ApiAction;

/// Identifies the transaction and sub-transaction a message belongs to, and
/// carries the caller-supplied context every stage needs downstream:
/// target tier, tenancy, object-store credentials, and the optional
/// holding/tag metadata used by Catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Details {
    pub transaction_id: Uuid,
    pub sub_id: Uuid,
    pub api_action: ApiAction,

    pub user: String,
    pub group: String,

    pub target: String,
    pub tenancy: String,
    pub access_key: String,
    pub secret_key: String,

    pub job_label: Option<String>,
    pub holding_label: Option<String>,
    pub holding_id: Option<i64>,
    #[serde(default)]
    pub tag_map: HashMap<String, String>,

    pub retry_filelist: bool,
}

/// Free-form bookkeeping a stage may attach for the next stage or for
/// Monitor's warning log; unlike `Details` this is not required to be
/// preserved verbatim end-to-end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub label: Option<String>,
    /// Aggregate checksum, carried on `archive-put.complete` alongside
    /// `data.aggregate_label` (the tarname) for catalog-archive-update to
    /// persist onto the `Aggregation` row.
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub algorithm: Option<String>,
}

/// The payload a stage actually acts on: the filelist for this
/// sub-transaction, plus the optional aggregate label archive-put/get use
/// to group many paths into one tape bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Data {
    #[serde(default)]
    pub filelist: Vec<PathDetails>,
    #[serde(default)]
    pub aggregate_label: Option<String>,
    /// The tape pool the aggregate was written under, carried on
    /// `archive-put.complete` so `catalog-archive-update` can persist the
    /// Location's `root` without needing its own copy of the tape config.
    #[serde(default)]
    pub root: Option<String>,
    /// The tape-issued prepare request id, carried from
    /// `archive-get.prepare` to `archive-get.prepare-check` so the poll
    /// knows which in-flight request this message is tracking.
    #[serde(default)]
    pub prepare_id: Option<String>,
}

/// The message body every stage publishes and consumes, per spec §6's wire
/// format: `{details, meta, data}` serialized as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub details: Details,
    #[serde(default)]
    pub meta: Meta,
    pub data: Data,
}

impl Envelope {
    pub fn new(details: Details, data: Data) -> Self {
        Self {
            details,
            meta: Meta::default(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_details() -> Details {
        Details {
            transaction_id: Uuid::new_v4(),
            sub_id: Uuid::new_v4(),
            api_action: ApiAction::Put,
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
        }
    }

    #[test]
    fn round_trips_through_json() {
        let envelope = Envelope::new(sample_details(), Data::default());
        let json = serde_json::to_string(&envelope).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.details.transaction_id, envelope.details.transaction_id);
        assert_eq!(back.details.api_action, ApiAction::Put);
    }

    #[test]
    fn meta_and_tag_map_default_when_absent() {
        let json = serde_json::json!({
            "details": sample_details(),
            "data": {},
        });
        let envelope: Envelope = serde_json::from_value(json).unwrap();
        assert!(envelope.meta.warnings.is_empty());
        assert!(envelope.details.tag_map.is_empty());
        assert!(envelope.data.filelist.is_empty());
    }
}
