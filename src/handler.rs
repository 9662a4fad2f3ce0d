// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Handlers
//!
//! A handler receives one decoded value and answers with an [`AckDecision`].
//! Handlers never return errors: a failure must be expressed as
//! `NackRequeue` (try again later) or `NackDiscard` (give up).
//!
//! Application state a handler needs is passed in explicitly, typically as an
//! `Arc` captured by the handler value. Handlers of different subscriptions run
//! concurrently, so shared state must synchronize internally; a single
//! subscription never runs its own handler concurrently with itself.

use crate::ack::AckDecision;
use async_trait::async_trait;
use std::{future::Future, marker::PhantomData};

/// Processes values of type `T` consumed from a queue.
#[async_trait]
pub trait ConsumerHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    /// Handles one decoded message.
    ///
    /// # Parameters
    /// * `msg` - The decoded message
    ///
    /// # Returns
    /// How the delivery carrying `msg` must be settled
    async fn exec(&self, msg: T) -> AckDecision;
}

/// Adapts an async closure into a [`ConsumerHandler`].
///
/// # Parameters
/// * `f` - Closure returning a future resolving to the delivery's decision
///
/// # Example
/// ```ignore
/// let handler = handler_fn(move |mv: ArmyMove| {
///     let state = state.clone();
///     async move { state.handle_move(mv).await }
/// });
/// ```
pub fn handler_fn<T, F, Fut>(f: F) -> FnHandler<T, F>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AckDecision> + Send + 'static,
    T: Send + 'static,
{
    FnHandler {
        f,
        _msg: PhantomData,
    }
}

/// Handler built by [`handler_fn`].
pub struct FnHandler<T, F> {
    f: F,
    _msg: PhantomData<fn(T)>,
}

#[async_trait]
impl<T, F, Fut> ConsumerHandler<T> for FnHandler<T, F>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AckDecision> + Send + 'static,
    T: Send + 'static,
{
    async fn exec(&self, msg: T) -> AckDecision {
        (self.f)(msg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[tokio::test]
    async fn closure_handler_sees_captured_state() {
        let seen = Arc::new(AtomicUsize::new(0));
        let state = seen.clone();

        let handler = handler_fn(move |units: u32| {
            let state = state.clone();
            async move {
                state.fetch_add(units as usize, Ordering::SeqCst);
                if units > 10 {
                    AckDecision::NackDiscard
                } else {
                    AckDecision::Ack
                }
            }
        });

        assert_eq!(handler.exec(3).await, AckDecision::Ack);
        assert_eq!(handler.exec(11).await, AckDecision::NackDiscard);
        assert_eq!(seen.load(Ordering::SeqCst), 14);
    }
}
