// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Management for RabbitMQ
//!
//! Publishers and subscribers assume their exchanges already exist. This module
//! describes those exchanges so infrastructure code (and integration tests) can
//! declare them through [`crate::topology::AmqpTopology`]: a topic exchange for
//! fan-out by routing key, a direct exchange for point-to-point traffic, and a
//! fanout exchange collecting dead letters.

/// Represents the types of exchanges available in RabbitMQ.
///
/// - Direct: Routes messages to queues based on an exact match of routing keys
/// - Fanout: Broadcasts messages to all bound queues regardless of routing keys
/// - Topic: Routes messages based on wildcard pattern matching of routing keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        }
    }
}

/// Definition of a RabbitMQ exchange with its configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeDefinition {
    pub(crate) name: String,
    pub(crate) kind: ExchangeKind,
    pub(crate) delete: bool,
    pub(crate) durable: bool,
}

impl ExchangeDefinition {
    /// Creates a new exchange definition with the given name.
    ///
    /// By default, the exchange is created as a Direct exchange with default parameters.
    ///
    /// # Parameters
    /// * `name` - The name of the exchange
    ///
    /// # Returns
    /// A new exchange definition
    pub fn new(name: &str) -> ExchangeDefinition {
        ExchangeDefinition {
            name: name.to_owned(),
            kind: ExchangeKind::Direct,
            delete: false,
            durable: false,
        }
    }

    /// Sets the exchange type.
    ///
    /// # Parameters
    /// * `kind` - The exchange type
    ///
    /// # Returns
    /// Self for method chaining
    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn direct(self) -> Self {
        self.kind(ExchangeKind::Direct)
    }

    /// Routes on routing-key patterns.
    pub fn topic(self) -> Self {
        self.kind(ExchangeKind::Topic)
    }

    /// Broadcasts to every bound queue; the usual shape of a dead-letter exchange.
    pub fn fanout(self) -> Self {
        self.kind(ExchangeKind::Fanout)
    }

    /// Sets the exchange to auto-delete when no longer used.
    pub fn delete(mut self) -> Self {
        self.delete = true;
        self
    }

    /// Makes the exchange durable, persisting across broker restarts.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn declare_options(&self) -> lapin::options::ExchangeDeclareOptions {
        lapin::options::ExchangeDeclareOptions {
            passive: false,
            durable: self.durable,
            auto_delete: self.delete,
            internal: false,
            nowait: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_to_transient_direct() {
        let def = ExchangeDefinition::new("peril_direct");

        assert_eq!(def.name(), "peril_direct");
        assert_eq!(def.kind, ExchangeKind::Direct);
        assert!(!def.durable);
        assert!(!def.delete);
    }

    #[test]
    fn declare_options_follow_builder() {
        let def = ExchangeDefinition::new("peril_dlx").fanout().durable();
        let opts = def.declare_options();

        assert_eq!(def.kind, ExchangeKind::Fanout);
        assert!(opts.durable);
        assert!(!opts.auto_delete);
        assert!(!opts.internal);
        assert!(!opts.passive);
    }

    #[test]
    fn converts_to_lapin_kind() {
        let kind: lapin::ExchangeKind = ExchangeKind::Topic.into();
        assert!(matches!(kind, lapin::ExchangeKind::Topic));
    }
}
