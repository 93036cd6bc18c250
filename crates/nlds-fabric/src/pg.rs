use std::pin::Pin;
use std::time::Duration;

use futures_core::Stream;
use sqlx::Row;
use uuid::Uuid;

use nlds_model::{Envelope, RoutingKey};

use crate::binding::matches as pattern_matches;
use crate::delivery::Delivery;
use crate::error::Error;

/// Default time a claimed-but-unacked message stays leased before it's
/// eligible for redelivery to another worker, mirroring the heartbeat
/// timeout in the control-plane dequeue loop this is modeled on.
const DEFAULT_LEASE: Duration = Duration::from_secs(60);

/// A broker-agnostic facade over the message fabric: publish into the
/// topology declared by `declare_queue`, and consume a queue as a stream
/// of `Delivery`. `PgFabric` is the only implementation that ships; the
/// trait exists so stage code never depends on Postgres directly.
#[async_trait::async_trait]
pub trait Fabric: Send + Sync {
    async fn publish(&self, routing_key: &RoutingKey, body: &Envelope) -> Result<(), Error> {
        self.publish_with(routing_key, body, None, None).await
    }

    async fn publish_delayed(
        &self,
        routing_key: &RoutingKey,
        body: &Envelope,
        delay: Duration,
    ) -> Result<(), Error>;

    async fn publish_with(
        &self,
        routing_key: &RoutingKey,
        body: &Envelope,
        reply_to: Option<&str>,
        correlation_id: Option<Uuid>,
    ) -> Result<(), Error>;

    fn consume(
        &self,
        queue: &str,
        prefetch: u32,
    ) -> Pin<Box<dyn Stream<Item = Result<Delivery, Error>> + Send>>;
}

#[derive(Clone)]
pub struct PgFabric {
    pool: sqlx::PgPool,
}

impl PgFabric {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    /// Registers `queue` as bound to `pattern` (an AMQP-style topic
    /// pattern over three dot-separated segments). Idempotent: declaring
    /// the same (queue, pattern) pair twice is a no-op.
    pub async fn declare_binding(&self, queue: &str, pattern: &str) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO fabric.bindings (queue, pattern) VALUES ($1, $2) \
             ON CONFLICT (queue, pattern) DO NOTHING",
        )
        .bind(queue)
        .bind(pattern)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn matching_queues(&self, routing_key: &str) -> Result<Vec<String>, Error> {
        let bindings = sqlx::query("SELECT queue, pattern FROM fabric.bindings")
            .fetch_all(&self.pool)
            .await?;

        Ok(bindings
            .into_iter()
            .filter_map(|row| {
                let queue: String = row.try_get("queue").ok()?;
                let pattern: String = row.try_get("pattern").ok()?;
                pattern_matches(&pattern, routing_key).then_some(queue)
            })
            .collect())
    }

    /// Delivers `body` straight into `queue`, bypassing the bindings
    /// table. Used only by the RPC reply path (§4.10): the reply queue is
    /// a one-shot, per-call destination that a caller names explicitly
    /// rather than something other consumers bind to.
    pub async fn publish_to_queue(
        &self,
        queue: &str,
        body: &Envelope,
        correlation_id: Option<Uuid>,
    ) -> Result<(), Error> {
        self.insert(queue, "", body, Duration::ZERO, None, correlation_id)
            .await
    }

    async fn insert(
        &self,
        queue: &str,
        routing_key: &str,
        body: &Envelope,
        visible_at_delay: Duration,
        reply_to: Option<&str>,
        correlation_id: Option<Uuid>,
    ) -> Result<(), Error> {
        let payload = serde_json::to_value(body).map_err(Error::Serialize)?;
        sqlx::query(
            "INSERT INTO fabric.messages \
             (queue, routing_key, body, visible_at, reply_to, correlation_id) \
             VALUES ($1, $2, $3, NOW() + $4::INTERVAL, $5, $6)",
        )
        .bind(queue)
        .bind(routing_key)
        .bind(payload)
        .bind(visible_at_delay)
        .bind(reply_to)
        .bind(correlation_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Fabric for PgFabric {
    async fn publish_delayed(
        &self,
        routing_key: &RoutingKey,
        body: &Envelope,
        delay: Duration,
    ) -> Result<(), Error> {
        let key = routing_key.to_string();
        for queue in self.matching_queues(&key).await? {
            self.insert(&queue, &key, body, delay, None, None).await?;
        }
        Ok(())
    }

    async fn publish_with(
        &self,
        routing_key: &RoutingKey,
        body: &Envelope,
        reply_to: Option<&str>,
        correlation_id: Option<Uuid>,
    ) -> Result<(), Error> {
        let key = routing_key.to_string();
        for queue in self.matching_queues(&key).await? {
            self.insert(
                &queue,
                &key,
                body,
                Duration::ZERO,
                reply_to,
                correlation_id,
            )
            .await?;
        }
        Ok(())
    }

    fn consume(
        &self,
        queue: &str,
        prefetch: u32,
    ) -> Pin<Box<dyn Stream<Item = Result<Delivery, Error>> + Send>> {
        let pool = self.pool.clone();
        let queue = queue.to_string();

        Box::pin(coroutines::coroutine(move |mut co| async move {
            loop {
                let claimed = claim_batch(&pool, &queue, prefetch).await;
                match claimed {
                    Ok(deliveries) => {
                        let got_any = !deliveries.is_empty();
                        for delivery in deliveries {
                            () = co.yield_(Ok(delivery)).await;
                        }
                        if !got_any {
                            sleep_with_jitter(Duration::from_millis(500)).await;
                        }
                    }
                    Err(err) => {
                        () = co.yield_(Err(err)).await;
                        sleep_with_jitter(Duration::from_secs(1)).await;
                    }
                }
            }
        }))
    }
}

async fn claim_batch(
    pool: &sqlx::PgPool,
    queue: &str,
    prefetch: u32,
) -> Result<Vec<Delivery>, Error> {
    let rows = sqlx::query(
        "WITH picked AS ( \
            SELECT id FROM fabric.messages \
            WHERE queue = $1 \
              AND visible_at <= NOW() \
              AND (leased_until IS NULL OR leased_until <= NOW()) \
            ORDER BY visible_at \
            LIMIT $2 \
            FOR UPDATE SKIP LOCKED \
         ) \
         UPDATE fabric.messages \
         SET leased_until = NOW() + $3::INTERVAL, delivery_attempt = delivery_attempt + 1 \
         WHERE id IN (SELECT id FROM picked) \
         RETURNING id, routing_key, body, delivery_attempt, reply_to, correlation_id",
    )
    .bind(queue)
    .bind(prefetch as i64)
    .bind(DEFAULT_LEASE)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let body: serde_json::Value = row.try_get("body")?;
            let body = serde_json::from_value(body).map_err(Error::Deserialize)?;
            Ok(Delivery {
                id: row.try_get("id")?,
                pool: pool.clone(),
                routing_key: row.try_get("routing_key")?,
                body,
                delivery_attempt: row.try_get("delivery_attempt")?,
                reply_to: row.try_get("reply_to")?,
                correlation_id: row.try_get("correlation_id")?,
            })
        })
        .collect()
}

async fn sleep_with_jitter(base: Duration) {
    let jitter = 0.9 + rand::random::<f64>() * 0.2;
    tokio::time::sleep(base.mul_f64(jitter)).await;
}
