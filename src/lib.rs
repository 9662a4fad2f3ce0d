// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Typed publish/subscribe over RabbitMQ.
//!
//! Values are encoded with a [`codec::Codec`] chosen at each call site,
//! published to named exchanges under routing keys, and consumed from queues
//! declared by [`topology::declare_and_bind`]. Each subscription runs its own
//! dispatch loop and maps the handler's [`ack::AckDecision`] onto broker
//! acknowledgments.

mod otel;

pub mod ack;
pub mod channel;
pub mod codec;
pub mod configs;
pub mod consumer;
pub mod dispatcher;
pub mod errors;
pub mod exchange;
pub mod handler;
pub mod publisher;
pub mod queue;
pub mod topology;
