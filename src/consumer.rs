// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Consumer
//!
//! This module holds the dispatch loop run by every subscription. Deliveries
//! are pulled one at a time, in broker order; each is decoded, handed to the
//! handler, and settled with the handler's [`AckDecision`] before the next one
//! is pulled. Anomalies inside one iteration (decode failure, handler panic,
//! ack failure) only affect that delivery; the loop ends when the delivery
//! stream closes or the subscription is cancelled.

use crate::{ack::AckDecision, codec::Codec, errors::AmqpError, handler::ConsumerHandler, otel};
use async_trait::async_trait;
use futures_util::{FutureExt, Stream, StreamExt};
use lapin::{message::Delivery, protocol::basic::AMQPProperties};
use opentelemetry::{
    global::{self, BoxedTracer},
    trace::{Span, Status},
};
use serde::de::DeserializeOwned;
use std::{
    borrow::Cow,
    fmt::Display,
    panic::{self, AssertUnwindSafe},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// A delivery the dispatch loop can read and settle.
///
/// Settling consumes the delivery's only acknowledgment: the loop calls
/// [`Acknowledge::settle`] exactly once per delivery and drops it afterwards.
#[async_trait]
pub trait Acknowledge: Send + Sync {
    fn data(&self) -> &[u8];

    fn delivery_tag(&self) -> u64;

    fn redelivered(&self) -> bool;

    fn properties(&self) -> &AMQPProperties;

    /// Applies `decision` against this delivery's tag.
    ///
    /// # Parameters
    /// * `decision` - Ack, or nack with or without requeue
    ///
    /// # Returns
    /// Ok(()) on success, `AmqpError::AckMessageError` or `NackMessageError` on failure
    async fn settle(&self, decision: AckDecision) -> Result<(), AmqpError>;
}

#[async_trait]
impl Acknowledge for Delivery {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    fn redelivered(&self) -> bool {
        self.redelivered
    }

    fn properties(&self) -> &AMQPProperties {
        &self.properties
    }

    async fn settle(&self, decision: AckDecision) -> Result<(), AmqpError> {
        match decision {
            AckDecision::Ack => match self.acker.ack(AckDecision::ack_options()).await {
                Err(err) => {
                    error!(error = err.to_string(), "error whiling ack msg");
                    Err(AmqpError::AckMessageError)
                }
                _ => Ok(()),
            },
            AckDecision::NackRequeue | AckDecision::NackDiscard => {
                match self.acker.nack(decision.nack_options()).await {
                    Err(err) => {
                        error!(error = err.to_string(), "error whiling nack msg");
                        Err(AmqpError::NackMessageError)
                    }
                    _ => Ok(()),
                }
            }
        }
    }
}

/// Per-subscription counters, returned when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeStats {
    pub acked: u64,
    pub requeued: u64,
    pub discarded: u64,
    /// Deliveries discarded because their body could not be decoded.
    pub decode_failures: u64,
    /// Deliveries whose decision the broker refused.
    pub ack_failures: u64,
}

impl ConsumeStats {
    fn record(&mut self, decision: AckDecision) {
        match decision {
            AckDecision::Ack => self.acked += 1,
            AckDecision::NackRequeue => self.requeued += 1,
            AckDecision::NackDiscard => self.discarded += 1,
        }
    }

    /// Deliveries settled, whatever the decision.
    pub fn settled(&self) -> u64 {
        self.acked + self.requeued + self.discarded
    }
}

/// Runs the dispatch loop until `deliveries` ends or `cancel` fires.
///
/// Cancellation is only observed while waiting for the next delivery, so a
/// delivery being processed is always settled first.
pub(crate) async fn dispatch<S, D, E, T, K, H>(
    queue: &str,
    mut deliveries: S,
    codec: &K,
    handler: &H,
    cancel: &CancellationToken,
) -> ConsumeStats
where
    S: Stream<Item = Result<D, E>> + Unpin,
    D: Acknowledge,
    E: Display,
    T: DeserializeOwned + Send + 'static,
    K: Codec,
    H: ConsumerHandler<T> + ?Sized,
{
    let tracer = global::tracer("amqp consumer");
    let mut stats = ConsumeStats::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(queue, "subscription cancelled");
                break;
            }
            next = deliveries.next() => next,
        };

        let Some(result) = next else {
            debug!(queue, "delivery stream closed");
            break;
        };

        match result {
            Ok(delivery) => consume(queue, &tracer, &delivery, codec, handler, &mut stats).await,
            Err(err) => error!(error = err.to_string(), queue, "errors consume msg"),
        }
    }

    stats
}

/// Decodes, handles and settles a single delivery.
///
/// A body that fails to decode is settled with `NackDiscard` without
/// invoking the handler.
pub(crate) async fn consume<D, T, K, H>(
    queue: &str,
    tracer: &BoxedTracer,
    delivery: &D,
    codec: &K,
    handler: &H,
    stats: &mut ConsumeStats,
) where
    D: Acknowledge,
    T: DeserializeOwned + Send + 'static,
    K: Codec,
    H: ConsumerHandler<T> + ?Sized,
{
    let tag = delivery.delivery_tag();
    let (_ctx, mut span) = otel::new_span(delivery.properties(), tracer, queue);

    debug!(
        queue,
        delivery_tag = tag,
        redelivered = delivery.redelivered(),
        "received"
    );

    if let Some(content_type) = delivery.properties().content_type() {
        if content_type.as_str() != codec.content_type() {
            warn!(
                queue,
                delivery_tag = tag,
                content_type = content_type.as_str(),
                expected = codec.content_type(),
                "unexpected content type"
            );
        }
    }

    let decision = match decode::<T, K>(codec, delivery.data()) {
        Ok(msg) => exec(handler, msg).await,
        Err(err) => {
            warn!(
                error = err.to_string(),
                queue,
                delivery_tag = tag,
                "discarding message - reason: undecodable payload"
            );
            span.record_error(&err);
            span.set_status(Status::Error {
                description: Cow::from("undecodable payload"),
            });
            stats.decode_failures += 1;
            AckDecision::NackDiscard
        }
    };

    match delivery.settle(decision).await {
        Ok(()) => {
            debug!(queue, delivery_tag = tag, ?decision, "message settled");
            stats.record(decision);
            if decision == AckDecision::Ack {
                span.set_status(Status::Ok);
            }
        }
        Err(err) => {
            span.record_error(&err);
            span.set_status(Status::Error {
                description: Cow::from("error to settle msg"),
            });
            stats.ack_failures += 1;
        }
    }

    span.end();
}

/// A panicking decoder is reported like any other undecodable payload.
fn decode<T, K>(codec: &K, data: &[u8]) -> Result<T, AmqpError>
where
    T: DeserializeOwned,
    K: Codec,
{
    match panic::catch_unwind(AssertUnwindSafe(|| codec.decode::<T>(data))) {
        Ok(result) => result,
        Err(_) => {
            error!("decoder panicked");
            Err(AmqpError::DecodeError("decoder panicked".to_owned()))
        }
    }
}

async fn exec<T, H>(handler: &H, msg: T) -> AckDecision
where
    T: Send + 'static,
    H: ConsumerHandler<T> + ?Sized,
{
    match AssertUnwindSafe(handler.exec(msg)).catch_unwind().await {
        Ok(decision) => decision,
        Err(_) => {
            error!("handler panicked, discarding message");
            AckDecision::NackDiscard
        }
    }
}
