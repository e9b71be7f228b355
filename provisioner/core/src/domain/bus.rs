// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Message Bus Port
//!
//! Publish/subscribe contract for lifecycle job dispatch. Payloads are
//! JSON-encoded `Infrastructure` snapshots. Implementations live in
//! `crate::infrastructure::message_bus`: a NATS client adapter for
//! production and an in-process queue-group bus for development and tests.

use crate::domain::infrastructure::Infrastructure;
use crate::domain::job::Subject;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Decoded jobs delivered to one member of a queue group. Messages that
/// fail to decode are logged and dropped by the adapter before they reach
/// this stream.
pub type JobStream = Pin<Box<dyn Stream<Item = Infrastructure> + Send>>;

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish one job. The adapter establishes a fresh connection with
    /// bounded reconnect retry; exhausting retries surfaces
    /// `BusError::Unavailable` instead of blocking indefinitely.
    async fn publish(&self, subject: Subject, infra: &Infrastructure) -> Result<(), BusError>;

    /// Join `group` on `subject`. Within a group each message is handled
    /// by at most one member; delivery across the bus is at-least-once.
    async fn subscribe_queue_group(
        &self,
        subject: Subject,
        group: &str,
    ) -> Result<JobStream, BusError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("message bus unavailable after {attempts} connection attempts: {reason}")]
    Unavailable { attempts: u32, reason: String },

    #[error("failed to encode job payload: {0}")]
    Encode(String),

    #[error("message bus error: {0}")]
    Other(String),
}
