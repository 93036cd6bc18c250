use nlds_catalog::StorageType;

#[test]
fn round_trips_through_display_and_from_str() {
    for variant in [StorageType::ObjectStore, StorageType::Tape] {
        let text = variant.to_string();
        let parsed: StorageType = text.parse().unwrap();
        assert_eq!(parsed, variant);
    }
}

#[test]
fn rejects_unknown_values() {
    assert!("NEARLINE".parse::<StorageType>().is_err());
}
