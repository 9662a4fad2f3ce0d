// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Management for RabbitMQ
//!
//! This module provides types for defining RabbitMQ queues and their bindings.
//! Queue flags are never set one by one: they are derived from a
//! [`DurabilityClass`], and every queue carries a dead-letter exchange argument
//! so discarded deliveries can be routed somewhere observable.

use lapin::{
    options::QueueDeclareOptions,
    types::{AMQPValue, FieldTable, LongString, ShortString},
};
use std::collections::BTreeMap;

/// Header field used to specify a dead letter exchange
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";

/// Fallback exchange receiving deliveries discarded with `NackDiscard`.
///
/// The exchange is expected to pre-exist; see [`crate::topology::AmqpTopology`]
/// to install it.
pub const DEFAULT_DEAD_LETTER_EXCHANGE: &str = "peril_dlx";

/// Lifetime class of a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DurabilityClass {
    /// Survives broker restarts and consumer disconnects.
    #[default]
    Durable,
    /// Owned by a single connection and removed once its last consumer leaves.
    Transient,
}

/// Definition of a RabbitMQ queue with its configuration parameters.
///
/// Invariant: a durable queue is never auto-delete nor exclusive, and a
/// transient queue is always both.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
    pub(crate) exclusive: bool,
    pub(crate) dead_letter_exchange: String,
}

impl QueueDefinition {
    /// Creates a queue definition whose flags follow `class`.
    ///
    /// The dead-letter exchange defaults to [`DEFAULT_DEAD_LETTER_EXCHANGE`].
    ///
    /// # Parameters
    /// * `name` - The name of the queue
    /// * `class` - Durable or transient
    ///
    /// # Returns
    /// A new queue definition
    pub fn new(name: &str, class: DurabilityClass) -> QueueDefinition {
        let durable = class == DurabilityClass::Durable;

        QueueDefinition {
            name: name.to_owned(),
            durable,
            delete: !durable,
            exclusive: !durable,
            dead_letter_exchange: DEFAULT_DEAD_LETTER_EXCHANGE.to_owned(),
        }
    }

    /// Routes discarded deliveries to `exchange` instead of the default one.
    ///
    /// An empty name still sends the argument and disables dead-lettering,
    /// which a dead-letter queue itself needs.
    ///
    /// # Parameters
    /// * `exchange` - The dead-letter exchange name
    ///
    /// # Returns
    /// Self for method chaining
    pub fn dead_letter_exchange(mut self, exchange: &str) -> Self {
        self.dead_letter_exchange = exchange.to_owned();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the queue survives broker restarts.
    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn is_auto_delete(&self) -> bool {
        self.delete
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn dead_letter_exchange_name(&self) -> &str {
        &self.dead_letter_exchange
    }

    pub(crate) fn declare_options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            passive: false,
            durable: self.durable,
            exclusive: self.exclusive,
            auto_delete: self.delete,
            nowait: false,
        }
    }

    pub(crate) fn arguments(&self) -> FieldTable {
        let mut args = BTreeMap::new();
        args.insert(
            ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
            AMQPValue::LongString(LongString::from(self.dead_letter_exchange.clone())),
        );
        FieldTable::from(args)
    }
}

/// Configuration for binding a queue to an exchange.
///
/// Binding the same queue again with another routing key adds a second
/// binding; it never replaces the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub(crate) queue_name: String,
    pub(crate) exchange_name: String,
    pub(crate) routing_key: String,
}

impl QueueBinding {
    /// Creates a new queue binding for the given queue.
    ///
    /// By default, the exchange name and routing key are empty strings.
    ///
    /// # Parameters
    /// * `queue` - The name of the queue to bind
    ///
    /// # Returns
    /// A new queue binding
    pub fn new(queue: &str) -> QueueBinding {
        QueueBinding {
            queue_name: queue.to_owned(),
            exchange_name: String::new(),
            routing_key: String::new(),
        }
    }

    /// Sets the exchange to bind the queue to.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn exchange(mut self, exchange: &str) -> Self {
        self.exchange_name = exchange.to_owned();
        self
    }

    /// Sets the routing key (or topic pattern) for the binding.
    ///
    /// # Parameters
    /// * `key` - A routing key, or a topic pattern such as `war.*`
    ///
    /// # Returns
    /// Self for method chaining
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    pub fn key(&self) -> &str {
        &self.routing_key
    }
}
