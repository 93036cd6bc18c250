use uuid::Uuid;

use nlds_model::{ApiAction, SubState};

use crate::error::Error;
use crate::models::{SubRecord, TransactionRecord};
use crate::rollup::rollup;

pub struct MonitorStore {
    pool: sqlx::PgPool,
}

impl MonitorStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    /// Opens a TransactionRecord the first time a transaction is seen
    /// (on `route.*`), and returns the existing one on replay.
    pub async fn open_transaction(
        &self,
        transaction_id: Uuid,
        job_label: Option<&str>,
        user: &str,
        group: &str,
        api_action: ApiAction,
    ) -> Result<TransactionRecord, Error> {
        if let Some(existing) = sqlx::query_as::<_, TransactionRecord>(
            "SELECT * FROM monitor.transaction_records WHERE transaction_id = $1",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(existing);
        }

        sqlx::query_as::<_, TransactionRecord>(
            r#"INSERT INTO monitor.transaction_records
               (transaction_id, job_label, "user", "group", api_action)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING *"#,
        )
        .bind(transaction_id)
        .bind(job_label)
        .bind(user)
        .bind(group)
        .bind(api_action)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::from)
    }

    /// Opens a SubRecord at its initial state, idempotent on `sub_id`.
    pub async fn open_sub_record(
        &self,
        transaction_record_id: i64,
        sub_id: Uuid,
        initial_state: SubState,
    ) -> Result<SubRecord, Error> {
        if let Some(existing) =
            sqlx::query_as::<_, SubRecord>("SELECT * FROM monitor.sub_records WHERE sub_id = $1")
                .bind(sub_id)
                .fetch_optional(&self.pool)
                .await?
        {
            return Ok(existing);
        }

        sqlx::query_as::<_, SubRecord>(
            "INSERT INTO monitor.sub_records (sub_id, transaction_record_id, state) \
             VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(sub_id)
        .bind(transaction_record_id)
        .bind(initial_state)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::from)
    }

    /// Applies the ratchet rule (spec §4.9): `next` only takes effect if
    /// it's strictly later than the stored state, or is `Failed`. Returns
    /// whether the state actually advanced, so a caller that also needs
    /// to bump `retry_count` can tell a stale replay from a real step.
    pub async fn ratchet_update(&self, sub_id: Uuid, next: SubState) -> Result<bool, Error> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, SubRecord>(
            "SELECT * FROM monitor.sub_records WHERE sub_id = $1 FOR UPDATE",
        )
        .bind(sub_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(Error::UnknownSubId(sub_id))?;

        let mut state = current.state;
        let advanced = state.advance(next);

        if advanced {
            sqlx::query(
                "UPDATE monitor.sub_records SET state = $1, last_updated = NOW() WHERE sub_id = $2",
            )
            .bind(state)
            .bind(sub_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(advanced)
    }

    pub async fn record_retry(&self, sub_id: Uuid) -> Result<(), Error> {
        sqlx::query(
            "UPDATE monitor.sub_records SET retry_count = retry_count + 1, last_updated = NOW() \
             WHERE sub_id = $1",
        )
        .bind(sub_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_failed_file(
        &self,
        sub_id: Uuid,
        filepath: &str,
        reason: &str,
    ) -> Result<(), Error> {
        let sub_record_id: i64 =
            sqlx::query_scalar("SELECT id FROM monitor.sub_records WHERE sub_id = $1")
                .bind(sub_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(Error::UnknownSubId(sub_id))?;

        sqlx::query(
            "INSERT INTO monitor.failed_files (filepath, reason, sub_record_id) VALUES ($1, $2, $3)",
        )
        .bind(filepath)
        .bind(reason)
        .bind(sub_record_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_warning(&self, transaction_id: Uuid, warning: &str) -> Result<(), Error> {
        let transaction_record_id: i64 = sqlx::query_scalar(
            "SELECT id FROM monitor.transaction_records WHERE transaction_id = $1",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::UnknownTransactionId(transaction_id))?;

        sqlx::query(
            "INSERT INTO monitor.warnings (warning, transaction_record_id) VALUES ($1, $2)",
        )
        .bind(warning)
        .bind(transaction_record_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Computes the rollup state for `transaction_id`, per spec §4.9,
    /// for use by the RPC stat query (§4.10).
    pub async fn transaction_rollup(&self, transaction_id: Uuid) -> Result<Option<SubState>, Error> {
        let states: Vec<SubState> = sqlx::query_scalar(
            "SELECT sr.state FROM monitor.sub_records sr \
             JOIN monitor.transaction_records tr ON tr.id = sr.transaction_record_id \
             WHERE tr.transaction_id = $1",
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rollup(&states))
    }
}
