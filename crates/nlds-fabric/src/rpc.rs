use std::time::Duration;

use futures::StreamExt;
use uuid::Uuid;

use nlds_model::{Envelope, RoutingKey};

use crate::error::Error;
use crate::pg::{Fabric, PgFabric};

/// Implements spec §4.10's RPC channel: a synchronous call/response pair
/// layered over the fabric's ordinary publish/consume path, using a
/// queue created fresh for each call so the reply can't be picked up by
/// an unrelated consumer.
pub struct RpcClient {
    fabric: PgFabric,
}

impl RpcClient {
    pub fn new(fabric: PgFabric) -> Self {
        Self { fabric }
    }

    /// Publishes `request` to `routing_key` and waits up to `time_limit`
    /// for a reply. The reply queue is named after the call's correlation
    /// id and is never bound into the static topology — only the worker
    /// that receives `request` learns its name, via `Delivery::reply_to`.
    pub async fn call(
        &self,
        routing_key: &RoutingKey,
        request: &Envelope,
        time_limit: Duration,
    ) -> Result<Envelope, Error> {
        let correlation_id = Uuid::new_v4();
        let reply_queue = format!("rpc-reply.{}", correlation_id.as_simple());

        self.fabric
            .publish_with(routing_key, request, Some(&reply_queue), Some(correlation_id))
            .await?;

        let mut replies = self.fabric.consume(&reply_queue, 1);
        let result = tokio::time::timeout(time_limit, replies.next()).await;

        match result {
            Ok(Some(Ok(delivery))) => {
                delivery.ack().await?;
                Ok(delivery.body)
            }
            Ok(Some(Err(err))) => Err(err),
            Ok(None) | Err(_) => Err(Error::RpcTimeout {
                routing_key: routing_key.to_string(),
                time_limit,
            }),
        }
    }

    /// Sends `response` back to whoever made the RPC call that produced
    /// `delivery`. A no-op (returns `Ok`) if `delivery` wasn't an RPC
    /// request, i.e. carried no `reply_to`.
    pub async fn reply(&self, delivery: &crate::Delivery, response: &Envelope) -> Result<(), Error> {
        let Some(reply_queue) = &delivery.reply_to else {
            return Ok(());
        };
        self.fabric
            .publish_to_queue(reply_queue, response, delivery.correlation_id)
            .await
    }
}
