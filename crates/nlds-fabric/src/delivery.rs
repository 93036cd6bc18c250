use uuid::Uuid;

use crate::error::Error;
use nlds_model::Envelope;

/// One message claimed off a queue. Dropping a `Delivery` without calling
/// `ack` or `nack` leaves it leased until `leased_until` elapses, at which
/// point it becomes eligible for redelivery — the same "crash-safe by
/// default" behavior as the dequeue loop this is modeled on.
pub struct Delivery {
    pub(crate) id: i64,
    pub(crate) pool: sqlx::PgPool,

    pub routing_key: String,
    pub body: Envelope,
    pub delivery_attempt: i32,
    pub reply_to: Option<String>,
    pub correlation_id: Option<Uuid>,
}

impl Delivery {
    /// Removes the message from the fabric. Call this once the stage has
    /// durably recorded the effect of processing it (published its
    /// successor message, written to Catalog/Monitor, etc).
    pub async fn ack(&self) -> Result<(), Error> {
        sqlx::query("DELETE FROM fabric.messages WHERE id = $1")
            .bind(self.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Releases the lease and schedules the message to become visible
    /// again after `requeue_delay`, per the stage's own back-off policy
    /// (spec §5's retry discipline — the fabric itself has no opinion on
    /// delay length beyond what the caller passes).
    pub async fn nack(&self, requeue_delay: std::time::Duration) -> Result<(), Error> {
        sqlx::query(
            "UPDATE fabric.messages \
             SET leased_until = NULL, visible_at = NOW() + $2::INTERVAL \
             WHERE id = $1",
        )
        .bind(self.id)
        .bind(requeue_delay)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("id", &self.id)
            .field("routing_key", &self.routing_key)
            .field("delivery_attempt", &self.delivery_attempt)
            .finish()
    }
}
