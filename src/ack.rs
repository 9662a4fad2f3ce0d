// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Acknowledgment Decisions
//!
//! A handler reports the outcome of each delivery with an [`AckDecision`]. It is
//! the only way application code controls a delivery's lifecycle: the dispatch
//! loop applies exactly one decision per delivery.

use lapin::options::{BasicAckOptions, BasicNackOptions};

/// Outcome of handling one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckDecision {
    /// Positive acknowledgment; the message leaves the queue for good.
    Ack,
    /// Negative acknowledgment with requeue; the broker redelivers it.
    NackRequeue,
    /// Negative acknowledgment without requeue; the message is dropped, or
    /// routed to the queue's dead-letter exchange.
    NackDiscard,
}

impl AckDecision {
    /// Whether the broker keeps the message for redelivery.
    pub fn requeues(&self) -> bool {
        matches!(self, AckDecision::NackRequeue)
    }

    pub(crate) fn ack_options() -> BasicAckOptions {
        BasicAckOptions { multiple: false }
    }

    pub(crate) fn nack_options(&self) -> BasicNackOptions {
        BasicNackOptions {
            multiple: false,
            requeue: self.requeues(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_requeue_keeps_the_message() {
        assert!(AckDecision::NackRequeue.nack_options().requeue);
        assert!(!AckDecision::NackDiscard.nack_options().requeue);
        assert!(!AckDecision::Ack.requeues());
    }

    #[test]
    fn acknowledgments_target_a_single_delivery() {
        assert!(!AckDecision::ack_options().multiple);
        assert!(!AckDecision::NackDiscard.nack_options().multiple);
        assert!(!AckDecision::NackRequeue.nack_options().multiple);
    }
}
