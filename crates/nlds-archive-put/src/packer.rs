use nlds_model::PathDetails;

/// Splits `candidates` into aggregates, each bounded by `max_aggregate_bytes`
/// of cumulative member size, per spec §4.7 step 1. Candidates are packed
/// in input order (a sequential accumulation rather than a true bin-packing
/// search) — consistent with the indexer's own batch accumulator, and good
/// enough since candidates arrive pre-sorted by catalog-archive-next with no
/// stated reordering freedom.
pub fn pack(candidates: Vec<PathDetails>, max_aggregate_bytes: u64) -> Vec<Vec<PathDetails>> {
    let mut aggregates = Vec::new();
    let mut current: Vec<PathDetails> = Vec::new();
    let mut current_bytes: u64 = 0;

    for candidate in candidates {
        if !current.is_empty() && current_bytes + candidate.size > max_aggregate_bytes {
            aggregates.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current_bytes += candidate.size;
        current.push(candidate);
    }

    if !current.is_empty() {
        aggregates.push(current);
    }

    aggregates
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nlds_model::PathType;

    fn sample(original_path: &str, size: u64) -> PathDetails {
        PathDetails::new(original_path, PathType::File, size, 1000, 1000, 0o644, Utc::now())
    }

    #[test]
    fn packs_candidates_under_the_size_cap_into_one_aggregate() {
        let candidates = vec![sample("/a", 10), sample("/b", 10), sample("/c", 10)];
        let aggregates = pack(candidates, 100);
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].len(), 3);
    }

    #[test]
    fn starts_a_new_aggregate_once_the_cap_would_be_exceeded() {
        let candidates = vec![sample("/a", 60), sample("/b", 60), sample("/c", 60)];
        let aggregates = pack(candidates, 100);
        assert_eq!(aggregates.len(), 3);
        assert_eq!(aggregates[0].len(), 1);
    }

    #[test]
    fn a_single_oversized_candidate_still_gets_its_own_aggregate() {
        let candidates = vec![sample("/huge", 500)];
        let aggregates = pack(candidates, 100);
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].len(), 1);
    }
}
