use nlds_model::SubState;

/// One hop of the transition table: publish to this `worker.state`, and
/// ratchet Monitor's SubRecord to `substate` once the publish succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Publication {
    pub worker: &'static str,
    pub state: &'static str,
    pub substate: SubState,
}

/// What the marshaller does in response to one inbound message. The
/// marshaller itself holds no state between calls — every decision is a
/// pure function of the inbound routing key and whether `details`
/// carries an unrecoverable error flag (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Publish(Publication),
    /// Any `*.failed` whose error was classified unrecoverable: ratchet
    /// Monitor to `Failed` and stop propagating — there is no further hop.
    ReportFailureAndStop,
    /// A pipeline-terminal success hop (`catalog-update.complete` for a
    /// put, `transfer-get.complete` for a get): ratchet Monitor to
    /// `Complete` and stop, there is nothing left to publish.
    MarkComplete,
    /// No transition defined for this (worker, state); the marshaller
    /// drops the message after logging it at `warn`.
    Unhandled,
}

const fn publish(worker: &'static str, state: &'static str, substate: SubState) -> Action {
    Action::Publish(Publication { worker, state, substate })
}

/// Looks up the next hop for an inbound `worker.state` pair, per the
/// transition table in spec §4.2. `unrecoverable` reflects the error
/// classification the failing stage already attached to `details` — the
/// marshaller does not reclassify errors itself.
pub fn next_action(worker: &str, state: &str, unrecoverable: bool) -> Action {
    if state == "failed" && unrecoverable && !matches!(worker, "transfer-put" | "archive-get" | "archive-put") {
        return Action::ReportFailureAndStop;
    }

    match (worker, state) {
        ("route", "put") => publish("index", "init", SubState::Splitting),
        ("index", "complete") => publish("catalog-put", "start", SubState::CatalogPutting),
        ("catalog-put", "complete") => publish("transfer-put", "init", SubState::TransferPutting),
        ("transfer-put", "complete") => publish("catalog-update", "start", SubState::Cataloging),
        ("transfer-put", "failed") => publish("catalog-del", "start", SubState::Failed),
        ("catalog-update", "complete") => Action::MarkComplete,
        ("route", "get") => publish("catalog-get", "start", SubState::CatalogGetting),
        ("catalog-get", "archive-restore") => publish("archive-get", "prepare", SubState::ArchiveGetting),
        ("catalog-get", "complete") => publish("transfer-get", "init", SubState::TransferGetting),
        ("archive-get", "complete") => publish("catalog-update", "start", SubState::Cataloging),
        ("catalog-update", "recall-complete") => publish("transfer-get", "init", SubState::TransferGetting),
        ("archive-get", "failed") => publish("catalog-remove", "start", SubState::Failed),
        ("transfer-get", "complete") => Action::MarkComplete,
        ("catalog-archive-next", "complete") => publish("archive-put", "init", SubState::ArchivePutting),
        ("archive-put", "complete") => {
            publish("catalog-archive-update", "start", SubState::CatalogArchiveAggregating)
        }
        ("catalog-archive-update", "complete") => Action::MarkComplete,
        ("archive-put", "failed") => publish("catalog-archive-remove", "start", SubState::Failed),
        _ => {
            if state == "failed" && unrecoverable {
                Action::ReportFailureAndStop
            } else {
                Action::Unhandled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pub_to(worker: &'static str, state: &'static str, substate: SubState) -> Action {
        Action::Publish(Publication { worker, state, substate })
    }

    #[test]
    fn put_flow_routes_through_index_then_catalog_then_transfer() {
        assert_eq!(
            next_action("route", "put", false),
            pub_to("index", "init", SubState::Splitting)
        );
        assert_eq!(
            next_action("index", "complete", false),
            pub_to("catalog-put", "start", SubState::CatalogPutting)
        );
        assert_eq!(
            next_action("catalog-put", "complete", false),
            pub_to("transfer-put", "init", SubState::TransferPutting)
        );
    }

    #[test]
    fn transfer_put_completion_and_failure_diverge() {
        assert_eq!(
            next_action("transfer-put", "complete", false),
            pub_to("catalog-update", "start", SubState::Cataloging)
        );
        assert_eq!(
            next_action("transfer-put", "failed", true),
            pub_to("catalog-del", "start", SubState::Failed)
        );
    }

    #[test]
    fn catalog_get_completion_goes_straight_to_transfer_get() {
        assert_eq!(
            next_action("catalog-get", "complete", false),
            pub_to("transfer-get", "init", SubState::TransferGetting)
        );
    }

    #[test]
    fn archive_get_completion_fills_the_recall_marker_before_transfer_get() {
        assert_eq!(
            next_action("archive-get", "complete", false),
            pub_to("catalog-update", "start", SubState::Cataloging)
        );
        assert_eq!(
            next_action("catalog-update", "recall-complete", false),
            pub_to("transfer-get", "init", SubState::TransferGetting)
        );
    }

    #[test]
    fn unrecoverable_failure_outside_the_named_failed_hops_stops_propagation() {
        assert_eq!(next_action("index", "failed", true), Action::ReportFailureAndStop);
    }

    #[test]
    fn recoverable_failure_with_no_table_entry_is_unhandled() {
        assert_eq!(next_action("index", "failed", false), Action::Unhandled);
    }

    #[test]
    fn put_and_get_terminal_hops_mark_complete() {
        assert_eq!(next_action("catalog-update", "complete", false), Action::MarkComplete);
        assert_eq!(next_action("transfer-get", "complete", false), Action::MarkComplete);
    }
}
