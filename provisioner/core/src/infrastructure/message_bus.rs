// Message Bus Adapters - Queue-Group Job Dispatch
//
// Two implementations of the MessageBus port:
// - NatsMessageBus: production adapter over a NATS server. Publishing and
//   subscribing always go through a freshly established connection with
//   bounded reconnect retry.
// - InProcessBus: single-process queue-group bus over mpsc channels for
//   development and tests. Payloads are JSON bytes either way, so the
//   decode-and-drop path behaves identically.

use crate::domain::bus::{BusError, JobStream, MessageBus};
use crate::domain::infrastructure::Infrastructure;
use crate::domain::job::Subject;
use crate::infrastructure::config::BusConfig;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

/// Wait before reconnect attempt `attempt`: one second per attempt made so
/// far, so the schedule backs off linearly up to the configured cap.
pub fn reconnect_wait(attempt: u32) -> Duration {
    Duration::from_secs(u64::from(attempt))
}

fn decode_job(subject: &str, payload: &[u8]) -> Option<Infrastructure> {
    match serde_json::from_slice(payload) {
        Ok(infra) => Some(infra),
        Err(err) => {
            // No dead-letter queue; an undecodable job is logged and gone.
            warn!("dropping undecodable job on [{}]: {}", subject, err);
            None
        }
    }
}

// ============================================================================
// NATS adapter
// ============================================================================

pub struct NatsMessageBus {
    config: BusConfig,
}

impl NatsMessageBus {
    pub fn new(config: BusConfig) -> Self {
        Self { config }
    }

    async fn connect(&self) -> Result<async_nats::Client, BusError> {
        let mut attempt: u32 = 0;
        loop {
            match async_nats::connect(&self.config.url).await {
                Ok(client) => return Ok(client),
                Err(err) => {
                    attempt += 1;
                    if attempt > self.config.max_reconnect {
                        return Err(BusError::Unavailable {
                            attempts: attempt,
                            reason: err.to_string(),
                        });
                    }
                    let wait = reconnect_wait(attempt);
                    warn!(
                        "queue server connection failed ({}), retry {}/{} in {:?}",
                        err, attempt, self.config.max_reconnect, wait
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[async_trait]
impl MessageBus for NatsMessageBus {
    async fn publish(&self, subject: Subject, infra: &Infrastructure) -> Result<(), BusError> {
        let payload = serde_json::to_vec(infra).map_err(|err| BusError::Encode(err.to_string()))?;
        let client = self.connect().await?;
        client
            .publish(subject.as_str().to_string(), payload.into())
            .await
            .map_err(|err| BusError::Other(err.to_string()))?;
        client
            .flush()
            .await
            .map_err(|err| BusError::Other(err.to_string()))?;
        debug!("published job for [{}]", subject);
        Ok(())
    }

    async fn subscribe_queue_group(
        &self,
        subject: Subject,
        group: &str,
    ) -> Result<JobStream, BusError> {
        let client = self.connect().await?;
        let subscriber = client
            .queue_subscribe(subject.as_str().to_string(), group.to_string())
            .await
            .map_err(|err| BusError::Other(err.to_string()))?;

        // The client is moved into the stream state so the connection
        // stays open for the life of the subscription.
        let stream = futures::stream::unfold(
            (client, subscriber),
            move |(client, mut subscriber)| async move {
                loop {
                    match subscriber.next().await {
                        Some(message) => {
                            if let Some(infra) =
                                decode_job(subject.as_str(), &message.payload)
                            {
                                return Some((infra, (client, subscriber)));
                            }
                        }
                        None => return None,
                    }
                }
            },
        );
        Ok(Box::pin(stream))
    }
}

// ============================================================================
// In-process bus
// ============================================================================

struct GroupState {
    members: Vec<mpsc::UnboundedSender<Vec<u8>>>,
    next: usize,
}

/// Queue-group bus for a single process. Each (subject, group) pair keeps
/// its members in a ring; a published message goes to exactly one member
/// per group. Messages published with no subscribers are dropped, like a
/// core NATS subject with no interest.
#[derive(Default)]
pub struct InProcessBus {
    groups: Mutex<HashMap<(String, String), GroupState>>,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver raw bytes to one member of every group subscribed on
    /// `subject`. Exposed so tests can exercise the decode-drop path.
    pub fn publish_raw(&self, subject: &str, payload: &[u8]) {
        let mut groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        for ((subj, _group), state) in groups.iter_mut() {
            if subj != subject || state.members.is_empty() {
                continue;
            }
            // Round-robin within the group, skipping members that hung up.
            let len = state.members.len();
            for offset in 0..len {
                let index = (state.next + offset) % len;
                if state.members[index].send(payload.to_vec()).is_ok() {
                    state.next = (index + 1) % len;
                    break;
                }
            }
            state.members.retain(|member| !member.is_closed());
        }
    }
}

#[async_trait]
impl MessageBus for InProcessBus {
    async fn publish(&self, subject: Subject, infra: &Infrastructure) -> Result<(), BusError> {
        let payload = serde_json::to_vec(infra).map_err(|err| BusError::Encode(err.to_string()))?;
        self.publish_raw(subject.as_str(), &payload);
        Ok(())
    }

    async fn subscribe_queue_group(
        &self,
        subject: Subject,
        group: &str,
    ) -> Result<JobStream, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
            groups
                .entry((subject.as_str().to_string(), group.to_string()))
                .or_insert_with(|| GroupState {
                    members: Vec::new(),
                    next: 0,
                })
                .members
                .push(tx);
        }

        let stream = UnboundedReceiverStream::new(rx)
            .filter_map(move |payload| async move { decode_job(subject.as_str(), &payload) });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::authorization::Authorization;
    use crate::domain::quoin::Quoin;
    use std::sync::Arc;

    fn job(name: &str) -> Infrastructure {
        let quoin = Quoin::new("vpc-basic", vec![], Authorization::default());
        Infrastructure::new(name, &quoin, vec![], "aws:account", Authorization::default())
    }

    #[test]
    fn reconnect_wait_grows_linearly() {
        assert_eq!(reconnect_wait(1), Duration::from_secs(1));
        assert_eq!(reconnect_wait(2), Duration::from_secs(2));
        assert_eq!(reconnect_wait(15), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn queue_group_load_balances_within_group() {
        let bus = Arc::new(InProcessBus::new());
        let mut first = bus
            .subscribe_queue_group(Subject::CreateInfra, "create-infra")
            .await
            .unwrap();
        let mut second = bus
            .subscribe_queue_group(Subject::CreateInfra, "create-infra")
            .await
            .unwrap();

        for i in 0..4 {
            bus.publish(Subject::CreateInfra, &job(&format!("env{i}")))
                .await
                .unwrap();
        }

        // Round-robin: each member sees exactly half the jobs.
        let mut seen = Vec::new();
        for _ in 0..2 {
            seen.push(first.next().await.unwrap().name);
            seen.push(second.next().await.unwrap().name);
        }
        seen.sort();
        assert_eq!(seen, vec!["env0", "env1", "env2", "env3"]);
    }

    #[tokio::test]
    async fn distinct_groups_each_receive_every_message() {
        let bus = Arc::new(InProcessBus::new());
        let mut workers = bus
            .subscribe_queue_group(Subject::DeleteInfra, "delete-infra")
            .await
            .unwrap();
        let mut auditors = bus
            .subscribe_queue_group(Subject::DeleteInfra, "auditors")
            .await
            .unwrap();

        bus.publish(Subject::DeleteInfra, &job("env1")).await.unwrap();

        assert_eq!(workers.next().await.unwrap().name, "env1");
        assert_eq!(auditors.next().await.unwrap().name, "env1");
    }

    #[tokio::test]
    async fn undecodable_payloads_are_dropped() {
        let bus = Arc::new(InProcessBus::new());
        let mut jobs = bus
            .subscribe_queue_group(Subject::CreateInfra, "create-infra")
            .await
            .unwrap();

        bus.publish_raw(Subject::CreateInfra.as_str(), b"not json");
        bus.publish(Subject::CreateInfra, &job("env1")).await.unwrap();

        // The garbage message never surfaces; the valid one does.
        assert_eq!(jobs.next().await.unwrap().name, "env1");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        let bus = InProcessBus::new();
        bus.publish(Subject::CreateInfra, &job("env1")).await.unwrap();
    }
}
