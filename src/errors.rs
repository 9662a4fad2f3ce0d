// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Pub/Sub Core
//!
//! This module provides the error taxonomy shared by every messaging operation.
//! Setup errors (connection, channel, declare, bind) are returned to the caller
//! of `declare_and_bind`/`subscribe`; encode and publish errors are returned to
//! the caller of `publish`. Decode errors never leave the dispatch loop, they are
//! resolved into a `NackDiscard` for the offending delivery.

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
///
/// Each variant identifies the operation that failed. Broker-side details are
/// logged at the failure site and, where useful to the caller, carried as text.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error closing a channel
    #[error("failure to close a channel")]
    ChannelCloseError,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding an exchange to a queue
    #[error("failure to binding exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error serializing a value before publishing
    #[error("failure to encode payload: {0}")]
    EncodeError(String),

    /// Error deserializing a delivery body
    #[error("failure to decode payload: {0}")]
    DecodeError(String),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// Error declaring a consumer
    #[error("consumer declaration error")]
    ConsumerDeclarationError,

    /// Error consuming a message
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error negative-acknowledging a message
    #[error("failure to nack message")]
    NackMessageError,

    /// Error loading the connection configuration
    #[error("invalid configuration: {0}")]
    ConfigError(String),
}
