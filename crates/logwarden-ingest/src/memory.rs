//! In-process stream broker.
//!
//! Keeps every published payload per topic partition, tracks committed
//! positions per consumer group and lets callers assign or revoke
//! partitions by hand. Used when no Kafka cluster is configured and as the
//! broker in tests.

use crate::broker::{BrokerMessage, OffsetCommitter, PartitionClaim, StreamBroker};
use crate::error::BrokerError;
use async_trait::async_trait;
use logwarden_common::types::LogRecord;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

type OffsetKey = (String, String, i32);

/// Committed positions keyed by `(group, topic, partition)`.
#[derive(Default)]
struct CommittedOffsets {
    inner: Mutex<HashMap<OffsetKey, i64>>,
}

impl CommittedOffsets {
    fn lock(&self) -> MutexGuard<'_, HashMap<OffsetKey, i64>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get(&self, group: &str, topic: &str, partition: i32) -> Option<i64> {
        self.lock()
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
    }

    fn set(&self, group: &str, topic: &str, partition: i32, next_offset: i64) {
        self.lock()
            .insert((group.to_string(), topic.to_string(), partition), next_offset);
    }
}

struct MemoryCommitter {
    group: String,
    offsets: Arc<CommittedOffsets>,
}

#[async_trait]
impl OffsetCommitter for MemoryCommitter {
    async fn commit(
        &self,
        topic: &str,
        partition: i32,
        next_offset: i64,
    ) -> Result<(), BrokerError> {
        self.offsets.set(&self.group, topic, partition, next_offset);
        tracing::trace!(group = %self.group, topic, partition, next_offset, "Committed offset");
        Ok(())
    }
}

struct LiveClaim {
    tx: mpsc::Sender<BrokerMessage>,
    revoked: CancellationToken,
}

struct Subscription {
    group: String,
    claims: mpsc::Sender<PartitionClaim>,
    live: HashMap<i32, LiveClaim>,
}

#[derive(Default)]
struct State {
    logs: HashMap<String, Vec<Vec<Vec<u8>>>>,
    subscriptions: HashMap<String, Subscription>,
}

/// In-memory [`StreamBroker`] with a fixed number of partitions per topic.
///
/// A subscription is a single-member group: every partition of the topic is
/// claimed on subscribe. New claims replay from the group's committed
/// position (or the start of the partition).
pub struct MemoryBroker {
    partitions: i32,
    capacity: usize,
    state: tokio::sync::Mutex<State>,
    offsets: Arc<CommittedOffsets>,
}

impl MemoryBroker {
    pub fn new(partitions: i32) -> Self {
        Self::with_capacity(partitions, DEFAULT_CHANNEL_CAPACITY)
    }

    /// `capacity` bounds how many undelivered messages a claim may hold
    /// beyond its replayed backlog.
    pub fn with_capacity(partitions: i32, capacity: usize) -> Self {
        Self {
            partitions: partitions.max(1),
            capacity: capacity.max(1),
            state: tokio::sync::Mutex::new(State::default()),
            offsets: Arc::new(CommittedOffsets::default()),
        }
    }

    pub fn partitions(&self) -> i32 {
        self.partitions
    }

    fn check_partition(&self, topic: &str, partition: i32) -> Result<(), BrokerError> {
        if (0..self.partitions).contains(&partition) {
            Ok(())
        } else {
            Err(BrokerError::UnknownPartition {
                topic: topic.to_string(),
                partition,
            })
        }
    }

    /// Append a payload to `topic/partition` and deliver it to the live
    /// claim, if any. Returns the message offset.
    pub async fn publish(
        &self,
        topic: &str,
        partition: i32,
        payload: impl Into<Vec<u8>>,
    ) -> Result<i64, BrokerError> {
        self.check_partition(topic, partition)?;
        let payload = payload.into();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let n = self.partitions as usize;
        let log = state
            .logs
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); n]);
        let offset = log[partition as usize].len() as i64;
        log[partition as usize].push(payload.clone());

        if let Some(sub) = state.subscriptions.get_mut(topic) {
            let delivered = match sub.live.get(&partition) {
                Some(live) => live
                    .tx
                    .send(BrokerMessage {
                        topic: topic.to_string(),
                        partition,
                        offset,
                        payload,
                    })
                    .await
                    .is_ok(),
                None => true,
            };
            if !delivered {
                sub.live.remove(&partition);
            }
        }
        Ok(offset)
    }

    /// JSON-encode `record` and publish it.
    pub async fn publish_record(
        &self,
        topic: &str,
        partition: i32,
        record: &LogRecord,
    ) -> Result<i64, BrokerError> {
        let payload = crate::codec::encode(record)
            .map_err(|e| BrokerError::Connection(format!("encode record: {e}")))?;
        self.publish(topic, partition, payload).await
    }

    /// Take `partition` away from the current subscriber.
    pub async fn revoke(&self, topic: &str, partition: i32) {
        let mut state = self.state.lock().await;
        if let Some(live) = state
            .subscriptions
            .get_mut(topic)
            .and_then(|sub| sub.live.remove(&partition))
        {
            live.revoked.cancel();
            tracing::info!(topic, partition, "Partition revoked");
        }
    }

    /// Hand `partition` to the current subscriber as a fresh claim. A live
    /// claim on the same partition is revoked first.
    pub async fn assign(&self, topic: &str, partition: i32) -> Result<(), BrokerError> {
        self.check_partition(topic, partition)?;
        let mut state = self.state.lock().await;
        self.assign_locked(&mut state, topic, partition).await
    }

    /// End the subscription on `topic`: the claim channel and every
    /// partition stream close.
    pub async fn close(&self, topic: &str) {
        let mut state = self.state.lock().await;
        state.subscriptions.remove(topic);
    }

    /// The group's committed position on `topic/partition`.
    pub fn committed(&self, group: &str, topic: &str, partition: i32) -> Option<i64> {
        self.offsets.get(group, topic, partition)
    }

    async fn assign_locked(
        &self,
        state: &mut State,
        topic: &str,
        partition: i32,
    ) -> Result<(), BrokerError> {
        let sub = state
            .subscriptions
            .get_mut(topic)
            .ok_or(BrokerError::Closed)?;
        if let Some(old) = sub.live.remove(&partition) {
            old.revoked.cancel();
        }

        let start = self
            .offsets
            .get(&sub.group, topic, partition)
            .unwrap_or(0)
            .max(0) as usize;
        let backlog: &[Vec<u8>] = state
            .logs
            .get(topic)
            .and_then(|log| log.get(partition as usize))
            .map(|p| p.get(start..).unwrap_or_default())
            .unwrap_or_default();

        let (tx, rx) = mpsc::channel(backlog.len() + self.capacity);
        for (i, payload) in backlog.iter().enumerate() {
            let msg = BrokerMessage {
                topic: topic.to_string(),
                partition,
                offset: (start + i) as i64,
                payload: payload.clone(),
            };
            tx.try_send(msg).map_err(|_| BrokerError::Closed)?;
        }

        let revoked = CancellationToken::new();
        let claim = PartitionClaim {
            topic: topic.to_string(),
            partition,
            messages: rx,
            committer: Arc::new(MemoryCommitter {
                group: sub.group.clone(),
                offsets: self.offsets.clone(),
            }),
            revoked: revoked.clone(),
        };
        sub.claims.send(claim).await.map_err(|_| BrokerError::Closed)?;
        sub.live.insert(partition, LiveClaim { tx, revoked });
        tracing::info!(topic, partition, from_offset = start, "Partition assigned");
        Ok(())
    }
}

#[async_trait]
impl StreamBroker for MemoryBroker {
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<mpsc::Receiver<PartitionClaim>, BrokerError> {
        let (claims_tx, claims_rx) = mpsc::channel(self.partitions as usize * 4);
        let mut state = self.state.lock().await;
        state.subscriptions.insert(
            topic.to_string(),
            Subscription {
                group: group.to_string(),
                claims: claims_tx,
                live: HashMap::new(),
            },
        );
        for partition in 0..self.partitions {
            self.assign_locked(&mut state, topic, partition).await?;
        }
        Ok(claims_rx)
    }
}
