//! Integration tests against a live Postgres instance (spec §4.4). Gated
//! behind `#[ignore]` per `nlds-testing::TestDb`'s convention — run with
//! `NLDS_TEST_DATABASE_URL` set and `cargo test -- --ignored`.

use uuid::Uuid;

use nlds_catalog::permissions::Role;
use nlds_catalog::{CatalogStore, Location};
use nlds_testing::{sample_path, TestDb};

async fn store() -> (TestDb, CatalogStore) {
    let db = TestDb::connect().await;
    db.reset().await;
    let store = CatalogStore::new(db.pool.clone());
    (db, store)
}

async fn object_store_locations(db: &TestDb, original_path: &str) -> Vec<Location> {
    sqlx::query_as::<_, Location>(
        "SELECT l.* FROM catalog.locations l \
         JOIN catalog.files f ON f.id = l.file_id \
         WHERE f.original_path = $1 AND l.storage_type = 'OBJECT_STORE'",
    )
    .bind(original_path)
    .fetch_all(&db.pool)
    .await
    .unwrap()
}

#[tokio::test]
#[ignore]
async fn catalog_update_fills_the_recall_marker_instead_of_leaving_it() {
    let (db, store) = store().await;
    let txn = Uuid::new_v4();

    let mut path = sample_path("/data/cube.nc");
    path.assign_object_name(txn);
    let put = store
        .catalog_put(txn, "alice", "users", "holding-a", vec![path.clone()])
        .await
        .unwrap();
    assert!(put.failed.is_empty());

    // Simulate catalog-get's TAPE branch creating the empty recall marker.
    sqlx::query(
        "INSERT INTO catalog.locations (storage_type, url_scheme, url_netloc, root, path, file_id) \
         SELECT 'OBJECT_STORE', '', '', '', '', f.id FROM catalog.files f WHERE f.original_path = $1",
    )
    .bind(&path.original_path)
    .execute(&db.pool)
    .await
    .unwrap();

    store
        .catalog_update(txn, "default-tenancy", &[path.clone()])
        .await
        .unwrap();

    let locations = object_store_locations(&db, &path.original_path).await;
    assert_eq!(locations.len(), 1, "the empty marker must be filled, not duplicated");
    assert!(!locations[0].is_recall_pending());
    assert_eq!(locations[0].path, path.object_name.clone().unwrap());
}

#[tokio::test]
#[ignore]
async fn catalog_update_does_not_cross_attach_another_transactions_file() {
    let (db, store) = store().await;
    let original_path = "/data/shared-name.nc";

    let txn_a = Uuid::new_v4();
    let mut path_a = sample_path(original_path);
    path_a.assign_object_name(txn_a);
    store.catalog_put(txn_a, "alice", "users", "holding-a", vec![path_a.clone()]).await.unwrap();

    let txn_b = Uuid::new_v4();
    let mut path_b = sample_path(original_path);
    path_b.assign_object_name(txn_b);
    store.catalog_put(txn_b, "bob", "users", "holding-b", vec![path_b.clone()]).await.unwrap();

    store.catalog_update(txn_b, "default-tenancy", &[path_b.clone()]).await.unwrap();

    let locations = object_store_locations(&db, original_path).await;
    assert_eq!(locations.len(), 1, "only txn_b's file should have gained a location");
    assert_eq!(locations[0].path, path_b.object_name.unwrap());
}

#[tokio::test]
#[ignore]
async fn catalog_del_denies_a_non_owner_plain_user() {
    let (_db, store) = store().await;
    let txn = Uuid::new_v4();
    let path = sample_path("/data/private.nc");
    store.catalog_put(txn, "alice", "users", "holding-a", vec![path.clone()]).await.unwrap();

    let failed = store
        .catalog_del("bob", "users", Role::User, &[path.original_path.clone()])
        .await
        .unwrap();

    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].path.original_path, path.original_path);
}

#[tokio::test]
#[ignore]
async fn catalog_del_lets_the_owner_delete_their_own_file() {
    let (_db, store) = store().await;
    let txn = Uuid::new_v4();
    let path = sample_path("/data/mine.nc");
    store.catalog_put(txn, "alice", "users", "holding-a", vec![path.clone()]).await.unwrap();

    let failed = store
        .catalog_del("alice", "users", Role::User, &[path.original_path.clone()])
        .await
        .unwrap();

    assert!(failed.is_empty());
}
