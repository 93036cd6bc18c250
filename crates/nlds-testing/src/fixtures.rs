use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use nlds_model::{ApiAction, Data, Details, Envelope, PathDetails, PathType};

/// A `Details` block with one of every field filled in plausibly, so tests
/// only need to override what they actually care about.
pub fn sample_details(api_action: ApiAction) -> Details {
    Details {
        transaction_id: Uuid::new_v4(),
        sub_id: Uuid::new_v4(),
        api_action,
        user: "alice".into(),
        group: "users".into(),
        target: "object-store".into(),
        tenancy: "default".into(),
        access_key: "AKIAEXAMPLE".into(),
        secret_key: "secretexample".into(),
        job_label: None,
        holding_label: Some("my-holding".into()),
        holding_id: Some(1),
        tag_map: HashMap::new(),
        retry_filelist: false,
    }
}

/// A regular file `PathDetails` at `original_path`, owned by uid/gid 1000
/// with mode 0644 and a fixed access time, the shape every stage crate's
/// tests end up hand-rolling.
pub fn sample_path(original_path: &str) -> PathDetails {
    PathDetails::new(original_path, PathType::File, 1024, 1000, 1000, 0o644, Utc::now())
}

/// Wraps `filelist` in an `Envelope` carrying `sample_details`, for tests
/// that only need a plausible message body and don't care about `Details`.
pub fn sample_envelope(filelist: Vec<PathDetails>) -> Envelope {
    Envelope::new(
        sample_details(ApiAction::Put),
        Data {
            filelist,
            ..Data::default()
        },
    )
}
