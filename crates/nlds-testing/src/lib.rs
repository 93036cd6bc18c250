//! Shared test fixtures (spec §6 ambient test harness): `PathDetails`/
//! envelope builders every stage crate's unit tests would otherwise
//! hand-roll, plus a `TestDb` fixture for the handful of tests that need a
//! live `PgFabric`/Catalog/Monitor database.

mod fabric;
mod fixtures;

pub use fabric::TestDb;
pub use fixtures::{sample_details, sample_envelope, sample_path};
