use uuid::Uuid;

use nlds_model::PathDetails;
use nlds_objectstore::ObjectStoreClient;

/// One path permanently given up on — either a user-class error, or a
/// system error that has exhausted `max_retries` (spec §5's retry
/// discipline).
#[derive(Debug)]
pub struct FailedPath {
    pub path: PathDetails,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct TransferOutcome {
    pub completed: Vec<PathDetails>,
    pub failed: Vec<FailedPath>,
    /// System-error paths still under `max_retries`, each with its
    /// `retries` counter already bumped; the caller re-schedules these
    /// with the back-off delay for their new retry count.
    pub retry: Vec<PathDetails>,
}

/// Streams each path in `filelist` from the local filesystem to the
/// object store, per spec §4.5. `object_name` is assigned deterministically
/// on first sight and then stable across retries.
pub async fn transfer_put(
    transaction_id: Uuid,
    access_key: &str,
    secret_key: &str,
    tenancy: &str,
    filelist: Vec<PathDetails>,
    require_secure: bool,
    max_retries: u32,
) -> TransferOutcome {
    let bucket = transaction_id.to_string();
    let client = match ObjectStoreClient::connect(tenancy, &bucket, access_key, secret_key, require_secure) {
        Ok(client) => client,
        Err(err) => {
            // Can't even open the tenancy: every path in this batch is a
            // system-error retry candidate.
            let reason = err.to_string();
            let mut outcome = TransferOutcome::default();
            for path in filelist {
                classify_system_failure(path, reason.clone(), max_retries, &mut outcome);
            }
            return outcome;
        }
    };

    let mut outcome = TransferOutcome::default();
    for mut path in filelist {
        if path.object_name.is_none() {
            path.assign_object_name(transaction_id);
        }
        let object_name = path.object_name.clone().expect("assigned above");

        match client.exists(&object_name).await {
            Ok(true) => {
                // Already transferred by a previous, replayed delivery.
                outcome.completed.push(path);
                continue;
            }
            Ok(false) => {}
            Err(err) => {
                classify_system_failure(path, err.to_string(), max_retries, &mut outcome);
                continue;
            }
        }

        let file = match tokio::fs::File::open(&path.original_path).await {
            Ok(file) => file,
            Err(err) => {
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
                ) {
                    classify_user_failure(path, err.to_string(), &mut outcome);
                } else {
                    classify_system_failure(path, err.to_string(), max_retries, &mut outcome);
                }
                continue;
            }
        };

        match client.put_stream(&object_name, file).await {
            Ok(()) => outcome.completed.push(path),
            Err(err) => classify_system_failure(path, err.to_string(), max_retries, &mut outcome),
        }
    }

    outcome
}

fn classify_user_failure(mut path: PathDetails, reason: String, outcome: &mut TransferOutcome) {
    path.record_retry(reason.clone());
    path.retries = u32::MAX;
    outcome.failed.push(FailedPath { path, reason });
}

fn classify_system_failure(mut path: PathDetails, reason: String, max_retries: u32, outcome: &mut TransferOutcome) {
    path.record_retry(reason.clone());
    if path.retries >= max_retries {
        outcome.failed.push(FailedPath { path, reason });
    } else {
        outcome.retry.push(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nlds_model::PathType;

    fn sample_path(original_path: &str) -> PathDetails {
        PathDetails::new(original_path, PathType::File, 0, 0, 0, 0o644, chrono::Utc::now())
    }

    #[tokio::test]
    async fn missing_source_file_is_a_permanent_user_failure() {
        let outcome = transfer_put(
            Uuid::new_v4(),
            "AKIAEXAMPLE",
            "secretexample",
            "https://object-store.example.org",
            vec![sample_path("/definitely/missing")],
            true,
            5,
        )
        .await;
        assert!(outcome.completed.is_empty());
        assert!(outcome.retry.is_empty());
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].path.retries, u32::MAX);
    }

    #[test]
    fn system_failure_retries_until_max_retries_then_fails_permanently() {
        let mut outcome = TransferOutcome::default();
        let mut path = sample_path("/data/f");
        path.retries = 3;
        classify_system_failure(path, "connection reset".into(), 5, &mut outcome);
        assert_eq!(outcome.retry.len(), 1);
        assert!(outcome.failed.is_empty());

        let mut outcome = TransferOutcome::default();
        let mut path = sample_path("/data/f");
        path.retries = 4;
        classify_system_failure(path, "connection reset".into(), 5, &mut outcome);
        assert_eq!(outcome.failed.len(), 1);
        assert!(outcome.retry.is_empty());
    }
}
