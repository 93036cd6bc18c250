use std::os::unix::fs::MetadataExt;
use std::path::Path;

use chrono::{DateTime, Utc};

use nlds_model::{PathDetails, PathType};

use crate::permissions::{can_read, Identity};

/// Ceilings and toggles the indexer applies while walking, per spec §4.3.
#[derive(Debug, Clone)]
pub struct WalkLimits {
    pub batch_max_len: usize,
    pub batch_max_bytes: u64,
    pub max_filesize: u64,
    pub check_permissions: bool,
    pub check_filesize: bool,
}

pub enum ClassifyResult {
    Path(PathDetails),
    Descend,
    Failed { reason: String, user_error: bool },
}

/// Classifies one filesystem entry without following symlinks, per
/// spec §4.3's per-file outcomes. `common_root` is the top-level path this
/// entry was reached from, used to decide link-common vs link-absolute.
pub fn classify_one(
    path: &Path,
    common_root: &Path,
    limits: &WalkLimits,
    identity: &Identity,
) -> ClassifyResult {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return ClassifyResult::Failed {
                reason: "file not found".to_string(),
                user_error: true,
            }
        }
        Err(_) => {
            return ClassifyResult::Failed {
                reason: "filesystem unavailable".to_string(),
                user_error: false,
            }
        }
    };

    if metadata.file_type().is_symlink() {
        return classify_symlink(path, common_root, &metadata);
    }

    if metadata.is_dir() {
        if limits.check_permissions && !can_read(&metadata, identity) {
            return ClassifyResult::Failed {
                reason: "permission denied".to_string(),
                user_error: true,
            };
        }
        return ClassifyResult::Descend;
    }

    if limits.check_permissions && !can_read(&metadata, identity) {
        return ClassifyResult::Failed {
            reason: "permission denied".to_string(),
            user_error: true,
        };
    }
    if limits.check_filesize && metadata.len() > limits.max_filesize {
        return ClassifyResult::Failed {
            reason: "file too large".to_string(),
            user_error: true,
        };
    }

    ClassifyResult::Path(PathDetails::new(
        path.to_string_lossy(),
        PathType::File,
        metadata.len(),
        metadata.uid(),
        metadata.gid(),
        metadata.mode() & 0o7777,
        access_time(&metadata),
    ))
}

fn classify_symlink(
    path: &Path,
    common_root: &Path,
    metadata: &std::fs::Metadata,
) -> ClassifyResult {
    let target = match std::fs::read_link(path) {
        Ok(target) => target,
        Err(_) => {
            return ClassifyResult::Failed {
                reason: "file not found".to_string(),
                user_error: true,
            }
        }
    };

    let resolved = if target.is_absolute() {
        target.clone()
    } else {
        path.parent().unwrap_or(Path::new("/")).join(&target)
    };

    let path_type = if resolved.starts_with(common_root) {
        PathType::LinkCommon
    } else {
        PathType::LinkAbsolute
    };

    let mut details = PathDetails::new(
        path.to_string_lossy(),
        path_type,
        metadata.len(),
        metadata.uid(),
        metadata.gid(),
        metadata.mode() & 0o7777,
        access_time(metadata),
    );
    details.link_target = Some(target.to_string_lossy().into_owned());
    ClassifyResult::Path(details)
}

fn access_time(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    DateTime::from_timestamp(metadata.atime(), metadata.atime_nsec() as u32).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            uid: unsafe { libc::getuid() },
            gids: vec![unsafe { libc::getgid() }],
        }
    }

    fn limits() -> WalkLimits {
        WalkLimits {
            batch_max_len: 1000,
            batch_max_bytes: u64::MAX,
            max_filesize: u64::MAX,
            check_permissions: true,
            check_filesize: true,
        }
    }

    #[test]
    fn missing_path_is_failed_as_not_found() {
        let result = classify_one(
            Path::new("/nonexistent/definitely/missing"),
            Path::new("/"),
            &limits(),
            &identity(),
        );
        assert!(matches!(
            result,
            ClassifyResult::Failed { user_error: true, .. }
        ));
    }

    #[test]
    fn oversized_file_is_failed() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"hello world").unwrap();
        let mut limits = limits();
        limits.max_filesize = 1;
        let result = classify_one(tmp.path(), tmp.path().parent().unwrap(), &limits, &identity());
        match result {
            ClassifyResult::Failed { reason, user_error } => {
                assert_eq!(reason, "file too large");
                assert!(user_error);
            }
            _ => panic!("expected Failed"),
        }
    }

    #[test]
    fn ordinary_file_classifies_as_path() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"hello world").unwrap();
        let result = classify_one(tmp.path(), tmp.path().parent().unwrap(), &limits(), &identity());
        match result {
            ClassifyResult::Path(details) => {
                assert_eq!(details.size, 11);
                assert_eq!(details.path_type, PathType::File);
            }
            _ => panic!("expected Path"),
        }
    }
}
