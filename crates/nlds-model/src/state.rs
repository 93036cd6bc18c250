use serde::{Deserialize, Serialize};

/// The top-level action a transaction was opened to perform, recorded on
/// `TransactionRecord.api_action` and used by the marshaller to pick the
/// initial transition-table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx-support", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx-support",
    sqlx(type_name = "api_action", rename_all = "kebab-case")
)]
#[serde(rename_all = "kebab-case")]
pub enum ApiAction {
    Put,
    PutList,
    Get,
    GetList,
    Del,
    DelList,
    ArchivePut,
    ArchiveGet,
}

/// A sub-transaction's position in the per-action pipeline, per spec §3's
/// Monitor `SubRecord` and §4.9's ratchet rule: state only ever moves
/// forward, never backward, and a later stage's report for an earlier
/// state is ignored rather than rolling the record back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx-support", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx-support",
    sqlx(type_name = "sub_state", rename_all = "kebab-case")
)]
#[serde(rename_all = "kebab-case")]
pub enum SubState {
    Routing,
    Splitting,
    Indexing,
    CatalogPutting,
    TransferPutting,
    Cataloging,
    ArchivePutting,
    CatalogArchiveAggregating,
    ArchiveGetting,
    CatalogGetting,
    TransferGetting,
    Complete,
    Failed,
}

impl SubState {
    /// Applies the ratchet rule: `next` only takes effect if it is strictly
    /// later than `self` in the pipeline, or is `Failed` (which can
    /// terminate a sub-transaction from any state). Returns `true` if the
    /// state actually advanced.
    pub fn advance(&mut self, next: SubState) -> bool {
        if next == SubState::Failed || next > *self {
            *self = next;
            true
        } else {
            false
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubState::Complete | SubState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_forward_only() {
        let mut s = SubState::Indexing;
        assert!(s.advance(SubState::CatalogPutting));
        assert_eq!(s, SubState::CatalogPutting);

        // A stale report of an earlier state is ignored.
        assert!(!s.advance(SubState::Indexing));
        assert_eq!(s, SubState::CatalogPutting);
    }

    #[test]
    fn failed_always_wins() {
        let mut s = SubState::TransferPutting;
        assert!(s.advance(SubState::Failed));
        assert_eq!(s, SubState::Failed);
    }

    #[test]
    fn terminal_states() {
        assert!(SubState::Complete.is_terminal());
        assert!(SubState::Failed.is_terminal());
        assert!(!SubState::Indexing.is_terminal());
    }
}
