// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Publisher
//!
//! Encodes typed values with a [`Codec`] and sends them to an exchange under a
//! routing key. Routing is best effort (`mandatory=false`): a message no queue
//! is bound for is dropped by the broker without notice. Failures are returned
//! to the caller, which owns any retry policy; a handler publishing on behalf
//! of a delivery typically answers `NackRequeue` so the broker redelivers.

use crate::{
    channel::AmqpChannel,
    codec::{BitcodeCodec, Codec, JsonCodec},
    errors::AmqpError,
    otel,
};
use lapin::{types::ShortString, BasicProperties, Channel};
use opentelemetry::Context;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Publisher bound to one channel.
///
/// The channel is dedicated to publishing; subscriptions open their own.
pub struct RabbitMQPublisher<C: AmqpChannel = Channel> {
    channel: Arc<C>,
}

impl<C: AmqpChannel> RabbitMQPublisher<C> {
    /// Creates a new RabbitMQ publisher.
    ///
    /// # Parameters
    /// * `channel` - A channel dedicated to publishing
    ///
    /// # Returns
    /// An Arc-wrapped RabbitMQPublisher instance for thread-safe sharing
    pub fn new(channel: Arc<C>) -> Arc<RabbitMQPublisher<C>> {
        Arc::new(RabbitMQPublisher { channel })
    }

    /// Encodes `value` with `codec` and publishes it to `exchange` under `key`.
    ///
    /// Encoding happens first: if it fails, [`AmqpError::EncodeError`] is
    /// returned and nothing is sent. The message carries the codec's content
    /// type, a fresh message id and the current trace context.
    ///
    /// # Parameters
    /// * `exchange` - Exchange to publish to; it must already exist
    /// * `key` - Routing key
    /// * `value` - Value to encode
    /// * `codec` - Wire format used to encode `value`
    ///
    /// # Returns
    /// Ok(()) once the broker accepted the frame, or the encode/transmission error
    pub async fn publish<T, K>(
        &self,
        exchange: &str,
        key: &str,
        value: &T,
        codec: &K,
    ) -> Result<(), AmqpError>
    where
        T: Serialize + Sync,
        K: Codec,
    {
        let payload = codec.encode(value).map_err(|err| {
            error!(
                error = err.to_string(),
                exchange, key, "error encoding message"
            );
            err
        })?;

        let properties = BasicProperties::default()
            .with_content_type(ShortString::from(codec.content_type()))
            .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
            .with_headers(otel::inject_context(&Context::current()));

        self.channel
            .publish(exchange, key, &payload, properties)
            .await?;

        debug!(exchange, key, bytes = payload.len(), "message published");
        Ok(())
    }

    /// Publishes `value` as JSON (`application/json`).
    ///
    /// # Parameters
    /// * `exchange` - Exchange to publish to
    /// * `key` - Routing key
    /// * `value` - Value to encode
    pub async fn publish_json<T>(
        &self,
        exchange: &str,
        key: &str,
        value: &T,
    ) -> Result<(), AmqpError>
    where
        T: Serialize + Sync,
    {
        self.publish(exchange, key, value, &JsonCodec).await
    }

    /// Publishes `value` as bitcode.
    pub async fn publish_bitcode<T>(
        &self,
        exchange: &str,
        key: &str,
        value: &T,
    ) -> Result<(), AmqpError>
    where
        T: Serialize + Sync,
    {
        self.publish(exchange, key, value, &BitcodeCodec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockAmqpChannel;
    use crate::codec::{BITCODE_CONTENT_TYPE, JSON_CONTENT_TYPE};
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct GameLog {
        username: String,
        message: String,
    }

    fn game_log() -> GameLog {
        GameLog {
            username: "alice".to_owned(),
            message: "alice won a war against bob".to_owned(),
        }
    }

    #[tokio::test]
    async fn publishes_json_with_content_type() {
        let mut channel = MockAmqpChannel::new();
        channel
            .expect_publish()
            .withf(|exchange, key, _, _| exchange == "peril_topic" && key == "game_logs.alice")
            .times(1)
            .returning(|_, _, payload, props| {
                let decoded: GameLog = JsonCodec.decode(payload).unwrap();
                assert_eq!(decoded, game_log());
                assert_eq!(
                    props.content_type().as_ref().map(|ct| ct.as_str()),
                    Some(JSON_CONTENT_TYPE)
                );
                assert!(props.message_id().is_some());
                Ok(())
            });

        let publisher = RabbitMQPublisher::new(Arc::new(channel));
        publisher
            .publish_json("peril_topic", "game_logs.alice", &game_log())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn publishes_bitcode_with_content_type() {
        let mut channel = MockAmqpChannel::new();
        channel
            .expect_publish()
            .times(1)
            .returning(|_, _, payload, props| {
                let decoded: GameLog = BitcodeCodec.decode(payload).unwrap();
                assert_eq!(decoded, game_log());
                assert_eq!(
                    props.content_type().as_ref().map(|ct| ct.as_str()),
                    Some(BITCODE_CONTENT_TYPE)
                );
                Ok(())
            });

        let publisher = RabbitMQPublisher::new(Arc::new(channel));
        publisher
            .publish_bitcode("peril_topic", "game_logs.alice", &game_log())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn encode_failure_never_reaches_the_broker() {
        let mut channel = MockAmqpChannel::new();
        channel.expect_publish().times(0);

        let mut value = HashMap::new();
        value.insert((1_u8, 2_u8), "unroutable");

        let publisher = RabbitMQPublisher::new(Arc::new(channel));
        let err = publisher
            .publish_json("peril_topic", "army_moves.alice", &value)
            .await
            .unwrap_err();

        assert!(matches!(err, AmqpError::EncodeError(_)));
    }

    #[tokio::test]
    async fn transmission_failure_is_surfaced() {
        let mut channel = MockAmqpChannel::new();
        channel
            .expect_publish()
            .times(1)
            .returning(|_, _, _, _| Err(AmqpError::PublishingError));

        let publisher = RabbitMQPublisher::new(Arc::new(channel));
        let err = publisher
            .publish_json("peril_topic", "war.alice", &game_log())
            .await
            .unwrap_err();

        assert_eq!(err, AmqpError::PublishingError);
    }
}
