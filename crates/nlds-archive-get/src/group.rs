use std::collections::BTreeMap;

use nlds_model::PathDetails;

/// One physical tape aggregate worth of members pulled out of an inbound
/// filelist, keyed by the catalog `aggregation_id` every member carries
/// (spec §4.8's "group by owning Aggregation" step).
#[derive(Debug, Clone)]
pub struct AggregateGroup {
    pub aggregation_id: i64,
    pub members: Vec<PathDetails>,
}

/// Groups `filelist` by `aggregation_id`, preserving first-seen order.
/// Members missing `aggregation_id` or `tape_location` can't be resolved
/// to a tape address at all; they're returned separately so the caller
/// can fail them immediately instead of silently dropping them.
pub fn group_by_aggregation(filelist: Vec<PathDetails>) -> (Vec<AggregateGroup>, Vec<PathDetails>) {
    let mut order: Vec<i64> = Vec::new();
    let mut groups: BTreeMap<i64, Vec<PathDetails>> = BTreeMap::new();
    let mut unresolved = Vec::new();

    for member in filelist {
        match member.aggregation_id {
            Some(aggregation_id) if member.tape_location.is_some() => {
                if !groups.contains_key(&aggregation_id) {
                    order.push(aggregation_id);
                }
                groups.entry(aggregation_id).or_default().push(member);
            }
            _ => unresolved.push(member),
        }
    }

    let grouped = order
        .into_iter()
        .map(|aggregation_id| AggregateGroup {
            aggregation_id,
            members: groups.remove(&aggregation_id).unwrap_or_default(),
        })
        .collect();

    (grouped, unresolved)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use nlds_model::PathType;

    use super::*;

    fn sample(original_path: &str, aggregation_id: Option<i64>, tape_location: Option<&str>) -> PathDetails {
        let mut path = PathDetails::new(original_path, PathType::File, 10, 1000, 1000, 0o644, Utc::now());
        path.aggregation_id = aggregation_id;
        path.tape_location = tape_location.map(|s| s.to_string());
        path
    }

    #[test]
    fn groups_members_sharing_one_aggregation() {
        let filelist = vec![
            sample("/a", Some(1), Some("root://host/pool/a.tar")),
            sample("/b", Some(2), Some("root://host/pool/b.tar")),
            sample("/c", Some(1), Some("root://host/pool/a.tar")),
        ];

        let (groups, unresolved) = group_by_aggregation(filelist);

        assert!(unresolved.is_empty());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].aggregation_id, 1);
        assert_eq!(groups[0].members.len(), 2);
        assert_eq!(groups[1].aggregation_id, 2);
        assert_eq!(groups[1].members.len(), 1);
    }

    #[test]
    fn members_missing_aggregation_data_are_set_aside() {
        let filelist = vec![
            sample("/a", Some(1), Some("root://host/pool/a.tar")),
            sample("/b", None, None),
            sample("/c", Some(1), None),
        ];

        let (groups, unresolved) = group_by_aggregation(filelist);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members.len(), 1);
        assert_eq!(unresolved.len(), 2);
    }
}
