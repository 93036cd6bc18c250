use nlds_fabric::PgFabric;

/// A Postgres-backed fixture for tests that need a live `PgFabric` (the
/// marshaller transition table, the monitor ratchet, a stage's worker loop
/// end to end). Connects to `NLDS_TEST_DATABASE_URL`, runs the fabric,
/// catalog and monitor migrations (each schema is `CREATE ... IF NOT
/// EXISTS`, so re-running them against a shared test database is safe),
/// and exposes `reset()` to clear state between tests.
///
/// Tests using this are `#[ignore]`d by convention — they need a real
/// Postgres instance and are run explicitly in CI, not as part of the
/// default `cargo test`.
pub struct TestDb {
    pub pool: sqlx::PgPool,
}

impl TestDb {
    pub async fn connect() -> Self {
        let url = std::env::var("NLDS_TEST_DATABASE_URL")
            .expect("NLDS_TEST_DATABASE_URL must be set to run fabric/catalog/monitor integration tests");
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .expect("connecting to the test database");

        sqlx::migrate!("../nlds-fabric/migrations")
            .run(&pool)
            .await
            .expect("running fabric migrations");
        sqlx::migrate!("../nlds-catalog/migrations")
            .run(&pool)
            .await
            .expect("running catalog migrations");
        sqlx::migrate!("../nlds-monitor/migrations")
            .run(&pool)
            .await
            .expect("running monitor migrations");

        Self { pool }
    }

    /// A `PgFabric` over this fixture's pool, ready to `consume`/`publish`.
    pub fn fabric(&self) -> PgFabric {
        PgFabric::new(self.pool.clone())
    }

    /// Truncates every table this fixture knows about, so successive tests
    /// in one process don't see each other's rows. Schema-qualified and run
    /// with `CASCADE` since catalog's tables carry foreign keys.
    pub async fn reset(&self) {
        for table in [
            "fabric.messages",
            "fabric.bindings",
            "monitor.warnings",
            "monitor.failed_files",
            "monitor.sub_records",
            "monitor.transaction_records",
            "catalog.locations",
            "catalog.checksums",
            "catalog.files",
            "catalog.aggregations",
            "catalog.tags",
            "catalog.transactions",
            "catalog.holdings",
            "catalog.quotas",
        ] {
            sqlx::query(&format!("TRUNCATE TABLE {table} CASCADE"))
                .execute(&self.pool)
                .await
                .unwrap_or_else(|err| panic!("truncating {table}: {err}"));
        }
    }
}
