// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Management
//!
//! This module handles the creation of AMQP connections and defines the
//! [`AmqpChannel`] seam: the handful of channel operations the topology manager
//! and the publisher need. It is implemented for `lapin::Channel`.
//!
//! A channel must not be shared between concurrent publish/subscribe paths;
//! every subscription opens its own.

use crate::{
    configs::AmqpConfigs, errors::AmqpError, exchange::ExchangeDefinition, queue::QueueBinding,
    queue::QueueDefinition,
};
use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, QueueBindOptions},
    types::{FieldTable, LongString},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Reply code sent when a channel is closed normally
pub const AMQP_REPLY_SUCCESS: u16 = 200;

/// Opens a connection to RabbitMQ.
///
/// The connection is returned wrapped in an `Arc` so it can be handed to
/// every subscription explicitly. No reconnect is attempted.
///
/// # Parameters
/// * `cfg` - Broker address, credentials and connection name
///
/// # Returns
/// The shared connection, or `AmqpError::ConnectionError` if the broker is unreachable
///
/// # Example
/// ```ignore
/// let conn = new_amqp_connection(&AmqpConfigs::load()?).await?;
/// ```
pub async fn new_amqp_connection(cfg: &AmqpConfigs) -> Result<Arc<Connection>, AmqpError> {
    debug!("creating amqp connection...");
    let options = ConnectionProperties::default()
        .with_connection_name(LongString::from(cfg.connection_name.clone()));

    match Connection::connect(&cfg.uri(), options).await {
        Ok(conn) => {
            debug!("amqp connected");
            Ok(Arc::new(conn))
        }
        Err(err) => {
            error!(error = err.to_string(), "failure to connect");
            Err(AmqpError::ConnectionError)
        }
    }
}

/// Opens a fresh channel on `conn`.
///
/// # Parameters
/// * `conn` - An open connection
///
/// # Returns
/// The new channel, or `AmqpError::ChannelError` on failure
pub async fn new_amqp_channel(conn: &Connection) -> Result<Channel, AmqpError> {
    debug!("creating amqp channel...");
    match conn.create_channel().await {
        Ok(c) => {
            debug!(channel = c.id(), "channel created");
            Ok(c)
        }
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(AmqpError::ChannelError)
        }
    }
}

/// Channel operations used by the topology manager and the publisher.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AmqpChannel: Send + Sync {
    /// Declares an exchange.
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError>;

    /// Declares a queue with the flags and arguments carried by `def`.
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError>;

    /// Binds a queue to an exchange under a routing key.
    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError>;

    /// Transmits `payload` with `mandatory=false, immediate=false`.
    ///
    /// # Parameters
    /// * `exchange` - Target exchange
    /// * `routing_key` - Routing key the exchange routes on
    /// * `payload` - Already encoded message body
    /// * `properties` - Content type, message id and headers
    ///
    /// # Returns
    /// Ok(()) on success or `AmqpError::PublishingError` on failure
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), AmqpError>;

    /// Closes the channel. A channel that is no longer connected is left as is.
    async fn close_channel(&self) -> Result<(), AmqpError>;
}

#[async_trait]
impl AmqpChannel for Channel {
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        match self
            .exchange_declare(
                &def.name,
                def.kind.into(),
                def.declare_options(),
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = def.name.as_str(),
                    "error to declare the exchange"
                );
                Err(AmqpError::DeclareExchangeError(def.name.clone()))
            }
            _ => Ok(()),
        }
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError> {
        match self
            .queue_declare(&def.name, def.declare_options(), def.arguments())
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = def.name.as_str(),
                    "error to declare the queue"
                );
                Err(AmqpError::DeclareQueueError(def.name.clone()))
            }
            _ => Ok(()),
        }
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        match self
            .queue_bind(
                &binding.queue_name,
                &binding.exchange_name,
                &binding.routing_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to bind queue to exchange");
                Err(AmqpError::BindingExchangeToQueueError(
                    binding.exchange_name.clone(),
                    binding.queue_name.clone(),
                ))
            }
            _ => Ok(()),
        }
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), AmqpError> {
        match self
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                payload,
                properties,
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError)
            }
            _ => Ok(()),
        }
    }

    async fn close_channel(&self) -> Result<(), AmqpError> {
        if !self.status().connected() {
            return Ok(());
        }

        match self.close(AMQP_REPLY_SUCCESS, "OK").await {
            Err(err) => {
                error!(error = err.to_string(), "error to close the channel");
                Err(AmqpError::ChannelCloseError)
            }
            _ => Ok(()),
        }
    }
}
