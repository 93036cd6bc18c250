use adler32::RollingAdler32;
use uuid::Uuid;

use nlds_model::PathDetails;
use nlds_objectstore::ObjectStoreClient;
use nlds_tape::AggregateRef;

use crate::error::Error;
use crate::tar_stream::{append_member, write_end_marker};
use crate::writer::AggregateWriter;

#[derive(Debug)]
pub struct FailedPath {
    pub path: PathDetails,
    pub reason: String,
}

#[derive(Debug)]
pub struct AggregateOutcome {
    pub tarname: String,
    pub checksum: u32,
    pub algorithm: &'static str,
    pub completed: Vec<PathDetails>,
    pub failed: Vec<FailedPath>,
    /// Set when the tape write itself failed: every member, not just the
    /// ones already streamed, belongs in `failed` (spec §4.7 step 2).
    pub aggregate_failed: bool,
}

pub const CHECKSUM_ALGORITHM: &str = "adler32";

/// Streams every member of one aggregate from the object store into a
/// single tar-like bundle on tape, per spec §4.7 step 2.
///
/// This bypasses `TapeClient::open_write` (deliberately unimplemented —
/// see its doc comment) and instead PUTs the tar stream directly at the
/// aggregate's URL, built from the tape endpoint's scheme/netloc plus
/// the configured pool and a freshly generated tarname.
pub async fn archive_put_aggregate(
    object_store: &ObjectStoreClient,
    http: reqwest::Client,
    tape_scheme: &str,
    tape_netloc: &str,
    tape_pool: &str,
    members: Vec<PathDetails>,
    chunk_size: usize,
) -> Result<AggregateOutcome, Error> {
    let tarname = format!("{}.tar", Uuid::new_v4());
    let aggregate_ref = AggregateRef {
        scheme: tape_scheme.to_string(),
        netloc: tape_netloc.to_string(),
        root: tape_pool.to_string(),
        aggregate: tarname.clone(),
    };

    let url = reqwest::Url::parse(&aggregate_ref.to_string())?;
    let mut writer = AggregateWriter::open(http, url);
    let mut checksum = RollingAdler32::new();

    let mut completed = Vec::new();
    let mut failed = Vec::new();

    for member in members {
        let object_name = match &member.object_name {
            Some(name) => name.clone(),
            None => {
                failed.push(FailedPath {
                    reason: "path has no object_name; not yet transferred".to_string(),
                    path: member,
                });
                continue;
            }
        };

        let reader = match object_store.get_stream(&object_name).await {
            Ok(reader) => reader,
            Err(err) => {
                failed.push(FailedPath { path: member, reason: err.to_string() });
                continue;
            }
        };

        let append_result = append_member(
            &mut writer,
            reader,
            member.original_path.trim_start_matches('/'),
            member.size,
            member.permissions,
            chunk_size,
            &mut checksum,
        )
        .await;

        match append_result {
            Ok(()) => completed.push(member),
            Err(err) => {
                // A tape I/O failure here fails the whole aggregate: every
                // remaining byte written so far is unusable.
                return Ok(AggregateOutcome {
                    tarname,
                    checksum: checksum.hash(),
                    algorithm: CHECKSUM_ALGORITHM,
                    failed: completed
                        .into_iter()
                        .map(|path| FailedPath { path, reason: err.to_string() })
                        .chain(failed)
                        .chain(std::iter::once(FailedPath { path: member, reason: err.to_string() }))
                        .collect(),
                    completed: Vec::new(),
                    aggregate_failed: true,
                });
            }
        }
    }

    if let Err(err) = write_end_marker(&mut writer).await {
        return Ok(AggregateOutcome {
            tarname,
            checksum: checksum.hash(),
            algorithm: CHECKSUM_ALGORITHM,
            failed: completed
                .into_iter()
                .map(|path| FailedPath { path, reason: err.to_string() })
                .chain(failed)
                .collect(),
            completed: Vec::new(),
            aggregate_failed: true,
        });
    }

    if let Err(err) = writer.finish().await {
        return Ok(AggregateOutcome {
            tarname,
            checksum: checksum.hash(),
            algorithm: CHECKSUM_ALGORITHM,
            failed: completed
                .into_iter()
                .map(|path| FailedPath { path, reason: err.to_string() })
                .chain(failed)
                .collect(),
            completed: Vec::new(),
            aggregate_failed: true,
        });
    }

    Ok(AggregateOutcome {
        tarname,
        checksum: checksum.hash(),
        algorithm: CHECKSUM_ALGORITHM,
        completed,
        failed,
        aggregate_failed: false,
    })
}
