use std::collections::HashMap;

use nlds_model::PathDetails;
use nlds_objectstore::ObjectStoreClient;
use nlds_tape::{AggregateRef, TapeClient};

use crate::error::Error;
use crate::extract::{bounded_reader, next_header, skip_member, skip_padding};

#[derive(Debug)]
pub struct FailedPath {
    pub path: PathDetails,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct RestoreOutcome {
    pub completed: Vec<PathDetails>,
    pub failed: Vec<FailedPath>,
}

/// Streams one tape aggregate and re-uploads each wanted member to the
/// object store under its existing `object_name`, per spec §4.8's
/// `start` state.
///
/// A failure opening the aggregate, or any I/O error once streaming has
/// begun, fails every member not yet completed — once the stream
/// position can't be trusted there is no way to recover the remaining
/// members from it. A member simply absent from the aggregate (stream
/// read to completion without ever seeing its path) fails only that
/// member.
pub async fn restore_aggregate(
    tape: &dyn TapeClient,
    object_store: &ObjectStoreClient,
    aggregate_ref: &AggregateRef,
    members: Vec<PathDetails>,
) -> Result<RestoreOutcome, Error> {
    let mut outcome = RestoreOutcome::default();

    let mut wanted: HashMap<String, PathDetails> = HashMap::new();
    for member in members {
        match member.object_name.clone() {
            Some(object_name) => {
                wanted.insert(object_name, member);
            }
            None => outcome.failed.push(FailedPath {
                path: member,
                reason: "path has no object_name; nothing to restore".to_string(),
            }),
        }
    }

    if wanted.is_empty() {
        return Ok(outcome);
    }

    let mut reader = match tape.open_read(aggregate_ref).await {
        Ok(reader) => reader,
        Err(err) => {
            fail_remaining(&mut wanted, &mut outcome, &err.to_string());
            return Ok(outcome);
        }
    };

    loop {
        let header = match next_header(&mut reader).await {
            Ok(Some(header)) => header,
            Ok(None) => break,
            Err(err) => {
                fail_remaining(&mut wanted, &mut outcome, &err.to_string());
                return Ok(outcome);
            }
        };

        let Some(target) = wanted.remove(&header.path) else {
            if let Err(err) = skip_member(&mut reader, header.size).await {
                fail_remaining(&mut wanted, &mut outcome, &err.to_string());
                return Ok(outcome);
            }
            continue;
        };

        let upload = {
            let bounded = bounded_reader(&mut reader, header.size);
            object_store.put_stream(&header.path, bounded).await
        };

        match upload {
            Ok(()) => {
                if let Err(err) = skip_padding(&mut reader, header.size).await {
                    outcome.failed.push(FailedPath { path: target, reason: err.to_string() });
                    fail_remaining(&mut wanted, &mut outcome, &err.to_string());
                    return Ok(outcome);
                }
                outcome.completed.push(target);
            }
            Err(err) => {
                // The tar stream's position can no longer be trusted once
                // a read mid-member is abandoned; fail this member and
                // everything still unseen rather than keep reading.
                outcome.failed.push(FailedPath { path: target, reason: err.to_string() });
                fail_remaining(&mut wanted, &mut outcome, &err.to_string());
                return Ok(outcome);
            }
        }
    }

    for (_, path) in wanted {
        outcome.failed.push(FailedPath { path, reason: "member not found in tape aggregate".to_string() });
    }

    Ok(outcome)
}

fn fail_remaining(wanted: &mut HashMap<String, PathDetails>, outcome: &mut RestoreOutcome, reason: &str) {
    for (_, path) in wanted.drain() {
        outcome.failed.push(FailedPath { path, reason: reason.to_string() });
    }
}
