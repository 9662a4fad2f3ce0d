// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Integration for RabbitMQ
//!
//! Trace context travels in the AMQP headers of each message. The publisher
//! injects the current context, the dispatch loop extracts it and opens a
//! consumer span per delivery. Without a global propagator both are no-ops.

use lapin::{
    protocol::basic::AMQPProperties,
    types::{AMQPValue, FieldTable, ShortString},
};
use opentelemetry::{
    global::{self, BoxedSpan, BoxedTracer},
    propagation::{Extractor, Injector},
    trace::{SpanKind, Tracer},
    Context,
};
use std::{borrow::Cow, collections::BTreeMap};
use tracing::error;

/// Adapter exposing AMQP headers to the OpenTelemetry propagator.
pub(crate) struct RabbitMQTracePropagator<'a> {
    headers: &'a mut BTreeMap<ShortString, AMQPValue>,
}

impl<'a> RabbitMQTracePropagator<'a> {
    pub(crate) fn new(headers: &'a mut BTreeMap<ShortString, AMQPValue>) -> Self {
        Self { headers }
    }
}

impl Injector for RabbitMQTracePropagator<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.headers.insert(
            key.to_lowercase().into(),
            AMQPValue::LongString(value.into()),
        );
    }
}

impl Extractor for RabbitMQTracePropagator<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|header_value| {
            if let AMQPValue::LongString(header_value) = header_value {
                std::str::from_utf8(header_value.as_bytes())
                    .map_err(|e| error!("Error decoding header value {:?}", e))
                    .ok()
            } else {
                None
            }
        })
    }

    fn keys(&self) -> Vec<&str> {
        self.headers.keys().map(|header| header.as_str()).collect()
    }
}

/// Builds the header table of an outgoing message carrying `ctx`.
pub(crate) fn inject_context(ctx: &Context) -> FieldTable {
    let mut headers = BTreeMap::<ShortString, AMQPValue>::default();

    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(ctx, &mut RabbitMQTracePropagator::new(&mut headers))
    });

    FieldTable::from(headers)
}

/// Extracts the publisher's context from `props` and starts a consumer span
/// named `name` under it.
pub(crate) fn new_span(
    props: &AMQPProperties,
    tracer: &BoxedTracer,
    name: &str,
) -> (Context, BoxedSpan) {
    let mut headers = props
        .headers()
        .as_ref()
        .map(|table| table.inner().clone())
        .unwrap_or_default();

    let ctx = global::get_text_map_propagator(|propagator| {
        propagator.extract(&RabbitMQTracePropagator::new(&mut headers))
    });

    let span = tracer
        .span_builder(Cow::from(name.to_owned()))
        .with_kind(SpanKind::Consumer)
        .start_with_context(tracer, &ctx);

    (ctx, span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::LongString;

    #[test]
    fn extractor_reads_long_string_headers_only() {
        let mut headers = BTreeMap::new();
        headers.insert(
            ShortString::from("traceparent"),
            AMQPValue::LongString(LongString::from("00-abc-def-01")),
        );
        headers.insert(ShortString::from("x-retries"), AMQPValue::LongInt(3));

        let propagator = RabbitMQTracePropagator::new(&mut headers);

        assert_eq!(propagator.get("traceparent"), Some("00-abc-def-01"));
        assert_eq!(propagator.get("x-retries"), None);
        assert_eq!(propagator.get("missing"), None);
        assert_eq!(propagator.keys().len(), 2);
    }

    #[test]
    fn injector_lowercases_keys() {
        let mut headers = BTreeMap::new();
        RabbitMQTracePropagator::new(&mut headers).set("TraceParent", "v".to_owned());

        assert!(headers.contains_key(&ShortString::from("traceparent")));
    }
}
