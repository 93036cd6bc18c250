use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use nlds_model::{PathDetails, PathType};
use nlds_objectstore::ObjectStoreClient;

use crate::chown::Chowner;

/// One path permanently given up on (spec §4.6). Transfer-get has no
/// retry loop of its own in the spec; a failure here is reported
/// straight to `transfer-get.failed` and left to the marshaller.
#[derive(Debug)]
pub struct FailedPath {
    pub path: PathDetails,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct TransferOutcome {
    pub completed: Vec<PathDetails>,
    pub failed: Vec<FailedPath>,
}

/// Streams each path in `filelist` from the object store back onto
/// `target_root`, restoring ownership/permissions and recreating
/// symlinks, per spec §4.6.
pub async fn transfer_get(
    transaction_id: Uuid,
    access_key: &str,
    secret_key: &str,
    tenancy: &str,
    target_root: &Path,
    filelist: Vec<PathDetails>,
    require_secure: bool,
    chowner: &Chowner,
) -> TransferOutcome {
    let bucket = transaction_id.to_string();
    let client = match ObjectStoreClient::connect(tenancy, &bucket, access_key, secret_key, require_secure) {
        Ok(client) => client,
        Err(err) => {
            let reason = err.to_string();
            let mut outcome = TransferOutcome::default();
            for path in filelist {
                outcome.failed.push(FailedPath { path, reason: reason.clone() });
            }
            return outcome;
        }
    };

    let mut outcome = TransferOutcome::default();
    for path in filelist {
        match restore_one(&client, target_root, &path).await {
            Ok(()) => outcome.completed.push(path),
            Err(reason) => outcome.failed.push(FailedPath { path, reason }),
        }
    }

    for path in &outcome.completed {
        let dest = destination_for(target_root, path);
        if let Err(err) = chowner.chown(&dest, path.owner_uid, path.group_gid).await {
            tracing::warn!(
                path = %path.original_path,
                error = %err,
                "failed to restore ownership after transfer-get"
            );
        }
    }

    outcome
}

fn destination_for(target_root: &Path, path: &PathDetails) -> PathBuf {
    let relative = path.original_path.trim_start_matches('/');
    target_root.join(relative)
}

async fn restore_one(client: &ObjectStoreClient, target_root: &Path, path: &PathDetails) -> Result<(), String> {
    let dest = destination_for(target_root, path);
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|err| err.to_string())?;
    }

    match path.path_type {
        PathType::LinkCommon | PathType::LinkAbsolute => {
            let target = path
                .link_target
                .as_deref()
                .ok_or_else(|| "symlink path has no recorded link_target".to_string())?;
            tokio::fs::symlink(target, &dest).await.map_err(|err| err.to_string())
        }
        PathType::Directory => tokio::fs::create_dir_all(&dest).await.map_err(|err| err.to_string()),
        PathType::File => {
            let object_name = path
                .object_name
                .as_deref()
                .ok_or_else(|| "path has no object_name; not yet transferred".to_string())?;
            let mut reader = client.get_stream(object_name).await.map_err(|err| err.to_string())?;
            let mut file = tokio::fs::File::create(&dest).await.map_err(|err| err.to_string())?;
            tokio::io::copy(&mut reader, &mut file)
                .await
                .map_err(|err| err.to_string())?;
            tokio::fs::set_permissions(&dest, std::fs::Permissions::from_mode(path.permissions))
                .await
                .map_err(|err| err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_file(original_path: &str) -> PathDetails {
        let mut p = PathDetails::new(original_path, PathType::File, 4, 1000, 1000, 0o644, Utc::now());
        p.object_name = None;
        p
    }

    #[tokio::test]
    async fn missing_object_name_is_a_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let chowner = Chowner::direct();
        let outcome = transfer_get(
            Uuid::new_v4(),
            "AKIAEXAMPLE",
            "secretexample",
            "https://object-store.example.org",
            tmp.path(),
            vec![sample_file("/data/a.nc")],
            true,
            &chowner,
        )
        .await;
        assert!(outcome.completed.is_empty());
        assert_eq!(outcome.failed.len(), 1);
        assert!(outcome.failed[0].reason.contains("object_name"));
    }

    #[tokio::test]
    async fn symlink_without_link_target_is_a_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let chowner = Chowner::direct();
        let mut link = PathDetails::new("/data/a.link", PathType::LinkCommon, 0, 1000, 1000, 0o777, Utc::now());
        link.link_target = None;
        let outcome = transfer_get(
            Uuid::new_v4(),
            "AKIAEXAMPLE",
            "secretexample",
            "https://object-store.example.org",
            tmp.path(),
            vec![link],
            true,
            &chowner,
        )
        .await;
        assert_eq!(outcome.failed.len(), 1);
        assert!(outcome.failed[0].reason.contains("link_target"));
    }
}
