use std::path::Path;

use chrono::Utc;

use nlds_model::{PathDetails, PathType};

use crate::classify::{classify_one, ClassifyResult, WalkLimits};
use crate::permissions::Identity;

/// One path the indexer gave up on, with a human-readable reason. The
/// caller decides (from `PathDetails.retries`) whether it's retryable.
#[derive(Debug, Clone)]
pub struct FailedPath {
    pub path: PathDetails,
    pub reason: String,
}

/// One `index.complete` worth of work: the batch boundary the walk
/// crossed when it hit `batch_max_len` entries or `batch_max_bytes`
/// cumulative size.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub completed: Vec<PathDetails>,
    pub failed: Vec<FailedPath>,
}

impl Batch {
    fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.failed.is_empty()
    }

    fn len(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

struct Accumulator {
    batches: Vec<Batch>,
    current: Batch,
    current_bytes: u64,
    limits: WalkLimits,
}

impl Accumulator {
    fn new(limits: WalkLimits) -> Self {
        Self {
            batches: Vec::new(),
            current: Batch::default(),
            current_bytes: 0,
            limits,
        }
    }

    fn push_completed(&mut self, path: PathDetails) {
        self.current_bytes += path.size;
        self.current.completed.push(path);
        self.maybe_flush();
    }

    fn push_failed(&mut self, mut path: PathDetails, reason: String, user_error: bool) {
        path.record_retry(reason.clone());
        if user_error {
            // User-class errors are permanently failed on first sight;
            // there's no retry schedule left to exhaust (spec §4.3).
            path.retries = u32::MAX;
        }
        self.current.failed.push(FailedPath { path, reason });
        self.maybe_flush();
    }

    fn maybe_flush(&mut self) {
        if self.current.len() >= self.limits.batch_max_len || self.current_bytes >= self.limits.batch_max_bytes {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.batches.push(std::mem::take(&mut self.current));
            self.current_bytes = 0;
        }
    }
}

pub(crate) fn blank_path(original_path: &str) -> PathDetails {
    PathDetails::new(original_path, PathType::File, 0, 0, 0, 0, Utc::now())
}

fn walk_one(path: &Path, common_root: &Path, limits: &WalkLimits, identity: &Identity, acc: &mut Accumulator) {
    match classify_one(path, common_root, limits, identity) {
        ClassifyResult::Path(details) => acc.push_completed(details),
        ClassifyResult::Failed { reason, user_error } => {
            acc.push_failed(blank_path(&path.to_string_lossy()), reason, user_error)
        }
        ClassifyResult::Descend => match std::fs::read_dir(path) {
            Ok(entries) => {
                for entry in entries {
                    match entry {
                        Ok(entry) => walk_one(&entry.path(), common_root, limits, identity, acc),
                        Err(_) => acc.push_failed(
                            blank_path(&path.to_string_lossy()),
                            "filesystem unavailable".to_string(),
                            false,
                        ),
                    }
                }
            }
            Err(_) => acc.push_failed(
                blank_path(&path.to_string_lossy()),
                "filesystem unavailable".to_string(),
                false,
            ),
        },
    }
}

/// Walks every path in a sub-transaction's list depth-first, splitting the
/// results into batches bounded by `limits.batch_max_len` entries or
/// `limits.batch_max_bytes` cumulative size — each batch becomes one
/// `index.complete` publication.
pub fn walk_sublist(paths: &[String], limits: WalkLimits, identity: &Identity) -> Vec<Batch> {
    let classify_limits = limits.clone();
    let mut acc = Accumulator::new(limits);
    for raw in paths {
        let path = Path::new(raw);
        let common_root = path.parent().unwrap_or(path);
        walk_one(path, common_root, &classify_limits, identity, &mut acc);
    }
    acc.flush();
    acc.batches
}

/// Splits a raw user file list into `ceil(N/L)` sub-transaction lists of
/// at most `max_len` paths each, per spec §4.3's init/split step.
pub fn split_filelist(paths: &[String], max_len: usize) -> Vec<Vec<String>> {
    if paths.is_empty() {
        return Vec::new();
    }
    paths
        .chunks(max_len.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
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
    fn split_produces_ceil_n_over_l_chunks() {
        let paths: Vec<String> = (0..2500).map(|i| format!("/data/f{i}")).collect();
        let chunks = split_filelist(&paths, 1000);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1000);
        assert_eq!(chunks[2].len(), 500);
    }

    #[test]
    fn split_of_empty_list_is_empty() {
        assert!(split_filelist(&[], 1000).is_empty());
    }

    #[test]
    fn walk_collects_missing_and_present_files_into_one_batch() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"hello").unwrap();
        let paths = vec![
            tmp.path().to_string_lossy().into_owned(),
            "/definitely/missing/path".to_string(),
        ];
        let batches = walk_sublist(&paths, limits(), &identity());
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].completed.len(), 1);
        assert_eq!(batches[0].failed.len(), 1);
        assert_eq!(batches[0].failed[0].reason, "file not found");
    }

    #[test]
    fn batch_boundary_splits_on_max_len() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for i in 0..5 {
            let p = dir.path().join(format!("f{i}"));
            std::fs::write(&p, b"x").unwrap();
            paths.push(p.to_string_lossy().into_owned());
        }
        let mut limits = limits();
        limits.batch_max_len = 2;
        let batches = walk_sublist(&paths, limits, &identity());
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[2].len(), 1);
    }
}
