use nlds_model::SubState;

/// A TransactionRecord's displayed overall state (spec §4.9): the least
/// advanced of its SubRecords' states, except that once every sub is
/// terminal, any `failed` among them promotes the whole rollup to
/// `failed` rather than `complete`.
pub fn rollup(states: &[SubState]) -> Option<SubState> {
    if states.is_empty() {
        return None;
    }
    if states.iter().all(|s| s.is_terminal()) {
        return Some(if states.contains(&SubState::Failed) {
            SubState::Failed
        } else {
            SubState::Complete
        });
    }
    states.iter().copied().min()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_in_flight_rolls_up_to_least_advanced() {
        let states = [SubState::Indexing, SubState::CatalogPutting, SubState::TransferPutting];
        assert_eq!(rollup(&states), Some(SubState::Indexing));
    }

    #[test]
    fn all_complete_rolls_up_to_complete() {
        let states = [SubState::Complete, SubState::Complete];
        assert_eq!(rollup(&states), Some(SubState::Complete));
    }

    #[test]
    fn any_failed_once_all_terminal_rolls_up_to_failed() {
        let states = [SubState::Complete, SubState::Failed, SubState::Complete];
        assert_eq!(rollup(&states), Some(SubState::Failed));
    }

    #[test]
    fn failed_does_not_dominate_while_others_still_in_flight() {
        // One sub already failed, but another is still mid-pipeline:
        // the rollup should reflect the least-advanced in-flight state,
        // not jump to `failed` early.
        let states = [SubState::Failed, SubState::Indexing];
        assert_eq!(rollup(&states), Some(SubState::Indexing));
    }

    #[test]
    fn empty_has_no_rollup() {
        assert_eq!(rollup(&[]), None);
    }
}
