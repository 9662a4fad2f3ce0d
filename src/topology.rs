// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! This module declares queues and binds them to exchanges. It offers two entry
//! points:
//! - [`declare_and_bind`]: opens a dedicated channel, declares one queue with
//!   durability-derived flags and a dead-letter argument, and binds it under one
//!   routing key. This is the setup step of every subscription.
//! - [`AmqpTopology`]: a builder collecting exchanges, queues and bindings and
//!   installing them in order. Infrastructure code uses it to create the
//!   exchanges (including the dead-letter exchange) that publishers and
//!   subscribers assume exist.
//!
//! Every broker error fails fast; nothing is retried here.

use crate::{
    channel::{new_amqp_channel, AmqpChannel},
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{DurabilityClass, QueueBinding, QueueDefinition},
};
use lapin::{Channel, Connection};
use tracing::{debug, error};

/// Collects topology components and installs them through one channel.
pub struct AmqpTopology<'tp, C: AmqpChannel + ?Sized> {
    channel: &'tp C,
    pub(crate) queues: Vec<QueueDefinition>,
    pub(crate) queues_binding: Vec<QueueBinding>,
    pub(crate) exchanges: Vec<ExchangeDefinition>,
}

impl<'tp, C: AmqpChannel + ?Sized> AmqpTopology<'tp, C> {
    /// Creates a new AmqpTopology instance.
    ///
    /// # Parameters
    /// * `channel` - A channel to the RabbitMQ server
    ///
    /// # Returns
    /// A new AmqpTopology instance with nothing to install
    pub fn new(channel: &'tp C) -> AmqpTopology<'tp, C> {
        AmqpTopology {
            channel,
            queues: vec![],
            queues_binding: vec![],
            exchanges: vec![],
        }
    }

    /// Adds an exchange definition to the topology.
    ///
    /// # Parameters
    /// * `def` - An exchange definition
    ///
    /// # Returns
    /// Self for method chaining
    pub fn exchange(mut self, def: ExchangeDefinition) -> Self {
        self.exchanges.push(def);
        self
    }

    /// Adds a queue definition to the topology.
    ///
    /// # Parameters
    /// * `def` - A queue definition
    ///
    /// # Returns
    /// Self for method chaining
    pub fn queue(mut self, def: QueueDefinition) -> Self {
        self.queues.push(def);
        self
    }

    /// Adds a queue-to-exchange binding to the topology.
    ///
    /// # Parameters
    /// * `binding` - A queue binding
    ///
    /// # Returns
    /// Self for method chaining
    pub fn queue_binding(mut self, binding: QueueBinding) -> Self {
        self.queues_binding.push(binding);
        self
    }

    /// Installs the topology to the RabbitMQ server.
    ///
    /// This method performs the following operations in order:
    /// 1. Declares all exchanges
    /// 2. Declares all queues, each with its dead-letter argument
    /// 3. Binds queues to exchanges
    ///
    /// # Returns
    /// Ok(()) on success, or the first AmqpError; later steps are skipped
    pub async fn install(&self) -> Result<(), AmqpError> {
        self.install_exchange().await?;
        self.install_queue().await?;
        self.binding_queues().await
    }

    async fn install_exchange(&self) -> Result<(), AmqpError> {
        for exch in &self.exchanges {
            debug!("creating exchange: {}", exch.name);
            self.channel.declare_exchange(exch).await?;
            debug!("exchange: {} was created", exch.name);
        }

        Ok(())
    }

    async fn install_queue(&self) -> Result<(), AmqpError> {
        for def in &self.queues {
            debug!(
                durable = def.durable,
                exclusive = def.exclusive,
                auto_delete = def.delete,
                dlx = def.dead_letter_exchange.as_str(),
                "creating queue: {}",
                def.name
            );
            self.channel.declare_queue(def).await?;
            debug!("queue: {} was created", def.name);
        }

        Ok(())
    }

    async fn binding_queues(&self) -> Result<(), AmqpError> {
        for binding in &self.queues_binding {
            debug!(
                "binding queue: {} to the exchange: {} with the key: {}",
                binding.queue_name, binding.exchange_name, binding.routing_key
            );
            self.channel.bind_queue(binding).await?;
        }

        Ok(())
    }
}

/// Opens a dedicated channel on `conn`, declares `queue_name` with flags
/// derived from `class`, and binds it to `exchange` under `routing_key`.
///
/// The returned channel is scoped to the queue and must not be shared with
/// other publish/subscribe paths. Nothing is retried.
///
/// # Parameters
/// * `conn` - An open connection
/// * `exchange` - Existing exchange to bind to
/// * `queue_name` - Queue to declare
/// * `routing_key` - Routing key or topic pattern of the binding
/// * `class` - Durability class the queue flags are derived from
///
/// # Returns
/// The channel and the declared queue definition, or the first setup error
///
/// # Example
/// ```ignore
/// let (channel, queue) =
///     declare_and_bind(&conn, "peril_topic", "war", "war.*", DurabilityClass::Durable).await?;
/// ```
pub async fn declare_and_bind(
    conn: &Connection,
    exchange: &str,
    queue_name: &str,
    routing_key: &str,
    class: DurabilityClass,
) -> Result<(Channel, QueueDefinition), AmqpError> {
    declare_and_bind_queue(conn, exchange, QueueDefinition::new(queue_name, class), routing_key)
        .await
}

/// Like [`declare_and_bind`] with a caller-built definition, e.g. one routing
/// dead letters to a non-default exchange.
///
/// # Parameters
/// * `conn` - An open connection
/// * `exchange` - Existing exchange to bind to
/// * `def` - Queue definition to declare
/// * `routing_key` - Routing key or topic pattern of the binding
///
/// # Returns
/// The channel and `def`, or the first setup error. The channel is closed on error.
pub async fn declare_and_bind_queue(
    conn: &Connection,
    exchange: &str,
    def: QueueDefinition,
    routing_key: &str,
) -> Result<(Channel, QueueDefinition), AmqpError> {
    let channel = new_amqp_channel(conn).await?;
    bind_on_channel(channel, exchange, def, routing_key).await
}

/// Runs the queue setup on a channel the caller hands over. On failure the
/// channel is closed before the error is returned.
pub(crate) async fn bind_on_channel<C: AmqpChannel>(
    channel: C,
    exchange: &str,
    def: QueueDefinition,
    routing_key: &str,
) -> Result<(C, QueueDefinition), AmqpError> {
    if let Err(err) = install_queue_binding(&channel, exchange, &def, routing_key).await {
        if let Err(close_err) = channel.close_channel().await {
            error!(error = close_err.to_string(), "failure to release setup channel");
        }
        return Err(err);
    }

    Ok((channel, def))
}

/// Declares `def` and binds it to `exchange` under `routing_key` on an
/// already opened channel.
///
/// # Parameters
/// * `channel` - The channel to run the declarations on
/// * `exchange` - Existing exchange to bind to
/// * `def` - Queue definition to declare
/// * `routing_key` - Routing key or topic pattern of the binding
///
/// # Returns
/// Ok(()) on success, or the declare/bind error uninterpreted
pub async fn install_queue_binding<C: AmqpChannel + ?Sized>(
    channel: &C,
    exchange: &str,
    def: &QueueDefinition,
    routing_key: &str,
) -> Result<(), AmqpError> {
    AmqpTopology::new(channel)
        .queue(def.clone())
        .queue_binding(
            QueueBinding::new(&def.name)
                .exchange(exchange)
                .routing_key(routing_key),
        )
        .install()
        .await
}
