/// Matches a `fabric.bindings` pattern against a concrete routing key,
/// using the same segment wildcards as an AMQP topic exchange: `*` stands
/// in for exactly one segment, `#` for zero or more.
///
/// `nlds_model::RoutingKey` is always exactly three segments, but the
/// pattern side is free-form so that a single `#` can bind "everything".
pub fn matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_segments(&pattern, &key)
}

fn matches_segments(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.first() {
        None => key.is_empty(),
        Some(&"#") => {
            // `#` matches zero or more segments: try consuming none, then
            // one, then two, ... until the remainder of the pattern matches.
            (0..=key.len()).any(|n| matches_segments(&pattern[1..], &key[n..]))
        }
        Some(&"*") => {
            !key.is_empty() && matches_segments(&pattern[1..], &key[1..])
        }
        Some(&literal) => {
            matches!(key.first(), Some(&k) if k == literal) && matches_segments(&pattern[1..], &key[1..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_must_match_exactly() {
        assert!(matches("nlds-api.index.init", "nlds-api.index.init"));
        assert!(!matches("nlds-api.index.init", "nlds-api.index.complete"));
    }

    #[test]
    fn star_matches_exactly_one_segment() {
        assert!(matches("*.index.*", "nlds-api.index.init"));
        assert!(!matches("*.index.*", "nlds-api.index.split.init"));
    }

    #[test]
    fn hash_matches_zero_or_more_segments() {
        assert!(matches("nlds-api.#", "nlds-api.index.init"));
        assert!(matches("nlds-api.#", "nlds-api"));
        assert!(matches("#", "nlds-api.index.init"));
        assert!(matches("nlds-api.index.#", "nlds-api.index.init"));
    }

    #[test]
    fn hash_in_the_middle() {
        assert!(matches("nlds-api.#.complete", "nlds-api.index.split.complete"));
        assert!(!matches("nlds-api.#.complete", "nlds-api.index.split.init"));
    }
}
