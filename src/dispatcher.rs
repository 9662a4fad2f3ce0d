// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Subscriptions
//!
//! This module wires a queue to a handler. [`subscribe`] declares and binds
//! the queue on a dedicated channel, opens a manual-acknowledgment consumer,
//! and spawns the dispatch loop on the tokio runtime. Each subscription runs
//! independently of every other one; they share only the connection.
//!
//! A subscription goes `Setup -> Running -> Closed`. Setup failures are
//! returned to the caller and no loop is started. The loop closes when the
//! broker ends the delivery stream (channel or connection closed) or when
//! [`Subscription::stop`] is called; in both cases the channel is released.

use crate::{
    channel::AmqpChannel,
    codec::{BitcodeCodec, Codec, JsonCodec},
    consumer::{dispatch, Acknowledge, ConsumeStats},
    errors::AmqpError,
    handler::ConsumerHandler,
    queue::{DurabilityClass, QueueDefinition},
    topology::declare_and_bind_queue,
};
use futures_util::{FutureExt, Stream};
use lapin::{options::BasicConsumeOptions, types::FieldTable, Connection};
use serde::de::DeserializeOwned;
use std::{
    fmt::Display,
    panic::{self, AssertUnwindSafe},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

/// Handle on a running subscription.
///
/// Dropping the handle detaches the loop: it keeps consuming until the
/// channel or connection is closed.
pub struct Subscription {
    queue: String,
    cancel: CancellationToken,
    task: JoinHandle<ConsumeStats>,
}

impl Subscription {
    /// Name of the consumed queue.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Token cancelling this subscription, for wiring into a wider shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the loop has ended.
    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops consuming once the delivery in progress (if any) is settled,
    /// releases the channel and returns the loop's counters.
    ///
    /// # Returns
    /// The loop's counters, or `AmqpError::ConsumerError` if the loop panicked
    pub async fn stop(self) -> Result<ConsumeStats, AmqpError> {
        debug!(queue = self.queue.as_str(), "stopping subscription");
        self.cancel.cancel();
        self.closed().await
    }

    /// Waits for the loop to end on its own.
    pub async fn closed(self) -> Result<ConsumeStats, AmqpError> {
        match self.task.await {
            Ok(stats) => Ok(stats),
            Err(err) => {
                error!(
                    error = err.to_string(),
                    queue = self.queue.as_str(),
                    "subscription task failure"
                );
                Err(AmqpError::ConsumerError(self.queue))
            }
        }
    }
}

/// Subscribes `handler` to `queue_name`, bound to `exchange` under
/// `routing_key`, decoding deliveries with `codec`.
///
/// The queue is declared and bound on a dedicated channel, a consumer is
/// opened with manual acknowledgment, and the dispatch loop is spawned.
/// Setup errors are returned before any loop starts.
///
/// # Parameters
/// * `conn` - An open connection, shared by every subscription
/// * `exchange` - Existing exchange to bind to
/// * `queue_name` - Queue to declare and consume
/// * `routing_key` - Routing key or topic pattern of the binding
/// * `class` - Durability class of the queue
/// * `handler` - Handler deciding how each decoded message is settled
/// * `codec` - Wire format of the deliveries
///
/// # Returns
/// A handle on the running subscription
///
/// # Example
/// ```ignore
/// let sub = subscribe(
///     &conn,
///     "peril_topic",
///     "war",
///     "war.*",
///     DurabilityClass::Durable,
///     handler_fn(|rw: RecognitionOfWar| async move { AckDecision::Ack }),
///     JsonCodec,
/// )
/// .await?;
/// ```
pub async fn subscribe<T, K, H>(
    conn: &Connection,
    exchange: &str,
    queue_name: &str,
    routing_key: &str,
    class: DurabilityClass,
    handler: H,
    codec: K,
) -> Result<Subscription, AmqpError>
where
    T: DeserializeOwned + Send + 'static,
    K: Codec,
    H: ConsumerHandler<T>,
{
    subscribe_queue(
        conn,
        exchange,
        QueueDefinition::new(queue_name, class),
        routing_key,
        handler,
        codec,
    )
    .await
}

/// Subscribes with JSON decoding. See [`subscribe`] for the parameters.
pub async fn subscribe_json<T, H>(
    conn: &Connection,
    exchange: &str,
    queue_name: &str,
    routing_key: &str,
    class: DurabilityClass,
    handler: H,
) -> Result<Subscription, AmqpError>
where
    T: DeserializeOwned + Send + 'static,
    H: ConsumerHandler<T>,
{
    subscribe(conn, exchange, queue_name, routing_key, class, handler, JsonCodec).await
}

/// Subscribes with bitcode decoding.
pub async fn subscribe_bitcode<T, H>(
    conn: &Connection,
    exchange: &str,
    queue_name: &str,
    routing_key: &str,
    class: DurabilityClass,
    handler: H,
) -> Result<Subscription, AmqpError>
where
    T: DeserializeOwned + Send + 'static,
    H: ConsumerHandler<T>,
{
    subscribe(conn, exchange, queue_name, routing_key, class, handler, BitcodeCodec).await
}

/// Like [`subscribe`] with a caller-built queue definition.
///
/// # Parameters
/// * `conn` - An open connection
/// * `exchange` - Existing exchange to bind to
/// * `def` - Queue definition, e.g. with a non-default dead-letter exchange
/// * `routing_key` - Routing key or topic pattern of the binding
/// * `handler` - Handler deciding how each decoded message is settled
/// * `codec` - Wire format of the deliveries
///
/// # Returns
/// A handle on the running subscription, or the first setup error
pub async fn subscribe_queue<T, K, H>(
    conn: &Connection,
    exchange: &str,
    def: QueueDefinition,
    routing_key: &str,
    handler: H,
    codec: K,
) -> Result<Subscription, AmqpError>
where
    T: DeserializeOwned + Send + 'static,
    K: Codec,
    H: ConsumerHandler<T>,
{
    let (channel, def) = declare_and_bind_queue(conn, exchange, def, routing_key).await?;
    let consumer_tag = format!("{}-{}", def.name, Uuid::new_v4());

    let consumer = match channel
        .basic_consume(
            &def.name,
            &consumer_tag,
            BasicConsumeOptions {
                no_local: false,
                no_ack: false,
                exclusive: false,
                nowait: false,
            },
            FieldTable::default(),
        )
        .await
    {
        Err(err) => {
            error!(error = err.to_string(), "error to create the consumer");
            release(&channel, &def.name).await;
            Err(AmqpError::ConsumerDeclarationError)
        }
        Ok(c) => Ok(c),
    }?;

    debug!(
        queue = def.name.as_str(),
        exchange,
        routing_key,
        consumer_tag = consumer_tag.as_str(),
        "subscription running"
    );

    Ok(spawn_subscription(def.name, consumer, codec, handler, channel))
}

/// Spawns the dispatch loop over `deliveries`; `channel` is released when
/// the loop ends, whichever way it ends.
pub(crate) fn spawn_subscription<S, D, E, T, K, H, C>(
    queue: String,
    deliveries: S,
    codec: K,
    handler: H,
    channel: C,
) -> Subscription
where
    S: Stream<Item = Result<D, E>> + Unpin + Send + 'static,
    D: Acknowledge + 'static,
    E: Display + Send + 'static,
    T: DeserializeOwned + Send + 'static,
    K: Codec,
    H: ConsumerHandler<T>,
    C: AmqpChannel + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let name = queue.clone();

    let task = tokio::spawn(async move {
        let outcome = AssertUnwindSafe(dispatch(&name, deliveries, &codec, &handler, &token))
            .catch_unwind()
            .await;
        release(&channel, &name).await;

        match outcome {
            Ok(stats) => {
                debug!(queue = name.as_str(), ?stats, "subscription closed");
                stats
            }
            Err(cause) => {
                error!(queue = name.as_str(), "dispatch loop panicked");
                panic::resume_unwind(cause)
            }
        }
    });

    Subscription {
        queue,
        cancel,
        task,
    }
}

async fn release<C: AmqpChannel + ?Sized>(channel: &C, queue: &str) {
    if let Err(err) = channel.close_channel().await {
        error!(error = err.to_string(), queue, "failure to release channel");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ack::AckDecision,
        channel::MockAmqpChannel,
        consumer::tests::{ArmyMove, Settled, TestDelivery, Units},
        handler::handler_fn,
    };
    use futures_util::{stream, StreamExt};
    use std::{
        io,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    fn closing_channel() -> MockAmqpChannel {
        let mut channel = MockAmqpChannel::new();
        channel.expect_close_channel().times(1).returning(|| Ok(()));
        channel
    }

    fn army_move(units: u32) -> ArmyMove {
        ArmyMove {
            player: "alice".to_owned(),
            units,
        }
    }

    #[tokio::test]
    async fn closes_when_the_stream_ends_and_releases_the_channel() {
        let settled = Settled::default();
        let deliveries = stream::iter(vec![
            Ok::<_, io::Error>(TestDelivery::json(1, &army_move(1), &settled)),
            Ok(TestDelivery::json(2, &army_move(2), &settled)),
        ]);

        let sub = spawn_subscription(
            "war".to_owned(),
            deliveries,
            JsonCodec,
            handler_fn(|_: ArmyMove| async { AckDecision::Ack }),
            closing_channel(),
        );
        assert_eq!(sub.queue(), "war");

        let stats = tokio::time::timeout(Duration::from_secs(1), sub.closed())
            .await
            .expect("subscription did not close")
            .unwrap();

        assert_eq!(stats.acked, 2);
    }

    #[tokio::test]
    async fn stop_ends_an_idle_subscription_and_releases_the_channel() {
        let settled = Settled::default();
        let deliveries = stream::iter(vec![Ok::<_, io::Error>(TestDelivery::json(
            1,
            &army_move(1),
            &settled,
        ))])
        .chain(stream::pending());

        let sub = spawn_subscription(
            "pause.alice".to_owned(),
            deliveries,
            JsonCodec,
            handler_fn(|_: ArmyMove| async { AckDecision::NackRequeue }),
            closing_channel(),
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!sub.is_closed());

        let stats = tokio::time::timeout(Duration::from_secs(1), sub.stop())
            .await
            .expect("subscription did not stop")
            .unwrap();

        assert_eq!(stats.requeued, 1);
        assert_eq!(*settled.lock().unwrap(), vec![(1, AckDecision::NackRequeue)]);
    }

    fn counting_channel(closes: &Arc<AtomicUsize>) -> MockAmqpChannel {
        let closes = closes.clone();
        let mut channel = MockAmqpChannel::new();
        channel.expect_close_channel().returning(move || {
            closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        channel
    }

    #[tokio::test]
    async fn decoder_panic_keeps_the_subscription_running() {
        let settled = Settled::default();
        let closes = Arc::new(AtomicUsize::new(0));
        let deliveries = stream::iter(vec![
            Ok::<_, io::Error>(TestDelivery::new(1, b"0".to_vec(), &settled)),
            Ok(TestDelivery::new(2, b"5".to_vec(), &settled)),
        ]);

        let sub = spawn_subscription(
            "war".to_owned(),
            deliveries,
            JsonCodec,
            handler_fn(|_: Units| async { AckDecision::Ack }),
            counting_channel(&closes),
        );

        let stats = tokio::time::timeout(Duration::from_secs(1), sub.closed())
            .await
            .expect("subscription did not close")
            .unwrap();

        assert_eq!(
            *settled.lock().unwrap(),
            vec![(1, AckDecision::NackDiscard), (2, AckDecision::Ack)]
        );
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn loop_panic_still_releases_the_channel() {
        let settled = Settled::default();
        let closes = Arc::new(AtomicUsize::new(0));
        let deliveries = stream::iter(vec![Ok::<_, io::Error>(
            TestDelivery::json(1, &army_move(1), &settled).panicking(),
        )]);

        let sub = spawn_subscription(
            "war".to_owned(),
            deliveries,
            JsonCodec,
            handler_fn(|_: ArmyMove| async { AckDecision::Ack }),
            counting_channel(&closes),
        );

        let err = tokio::time::timeout(Duration::from_secs(1), sub.closed())
            .await
            .expect("subscription did not close")
            .unwrap_err();

        assert_eq!(err, AmqpError::ConsumerError("war".to_owned()));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn release_failure_does_not_lose_the_stats() {
        let settled = Settled::default();
        let mut channel = MockAmqpChannel::new();
        channel
            .expect_close_channel()
            .times(1)
            .returning(|| Err(AmqpError::ChannelCloseError));

        let sub = spawn_subscription(
            "war".to_owned(),
            stream::iter(vec![Ok::<_, io::Error>(TestDelivery::new(
                1,
                b"garbage".to_vec(),
                &settled,
            ))]),
            JsonCodec,
            handler_fn(|_: ArmyMove| async { AckDecision::Ack }),
            channel,
        );

        let stats = sub.closed().await.unwrap();
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(stats.discarded, 1);
    }
}
