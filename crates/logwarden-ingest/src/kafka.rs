//! Kafka-backed [`StreamBroker`].
//!
//! One `StreamConsumer` per subscription with auto-commit disabled. A
//! dispatcher task routes messages into per-partition claims, opened on a
//! partition's first message. Revocation is handled inside the consumer's
//! rebalance callback: affected claims are cancelled and the callback waits
//! for their final flush and commit before librdkafka gives the partitions up.

use crate::broker::{BrokerMessage, OffsetCommitter, PartitionClaim, StreamBroker};
use crate::error::BrokerError;
use crate::routes::{block_until_released, PartitionRoutes};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{
    BaseConsumer, CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer,
};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::{ClientContext, Offset, TopicPartitionList};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

type LogConsumer = StreamConsumer<RebalanceContext>;

#[derive(Debug, Clone)]
pub struct KafkaSettings {
    pub brokers: Vec<String>,
    /// `earliest` or `latest`; applies when the group has no committed position.
    pub auto_offset_reset: String,
    pub session_timeout_ms: u32,
    /// Per-partition buffer between the dispatcher and its worker.
    pub channel_capacity: usize,
    /// How long a rebalance waits for revoked partitions to drain.
    pub drain_timeout: Duration,
}

impl Default for KafkaSettings {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            auto_offset_reset: "latest".to_string(),
            session_timeout_ms: 10_000,
            channel_capacity: 1024,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

pub struct KafkaBroker {
    settings: KafkaSettings,
}

impl KafkaBroker {
    pub fn new(settings: KafkaSettings) -> Self {
        Self { settings }
    }

    fn client_config(&self, group: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.settings.brokers.join(","))
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .set("auto.offset.reset", &self.settings.auto_offset_reset)
            .set(
                "session.timeout.ms",
                self.settings.session_timeout_ms.to_string(),
            );
        config
    }
}

#[async_trait]
impl StreamBroker for KafkaBroker {
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<mpsc::Receiver<PartitionClaim>, BrokerError> {
        let routes = Arc::new(Mutex::new(PartitionRoutes::new(
            topic,
            self.settings.channel_capacity,
        )));
        let context = RebalanceContext {
            topic: topic.to_string(),
            routes: routes.clone(),
            drain_timeout: self.settings.drain_timeout,
        };
        let consumer: LogConsumer = self.client_config(group).create_with_context(context)?;
        consumer.subscribe(&[topic])?;
        let consumer = Arc::new(consumer);

        // Surface an unreachable cluster at startup instead of on first poll.
        let client = consumer.clone();
        let metadata_topic = topic.to_string();
        tokio::task::spawn_blocking(move || {
            client
                .fetch_metadata(Some(&metadata_topic), METADATA_TIMEOUT)
                .map(|_| ())
        })
        .await
        .map_err(|e| BrokerError::Connection(e.to_string()))??;

        tracing::info!(
            brokers = %self.settings.brokers.join(","),
            topic,
            group,
            "Subscribed to Kafka"
        );

        let (claims_tx, claims_rx) = mpsc::channel(64);
        tokio::spawn(dispatch(consumer, routes, topic.to_string(), claims_tx));
        Ok(claims_rx)
    }
}

fn lock_routes(routes: &Mutex<PartitionRoutes>) -> MutexGuard<'_, PartitionRoutes> {
    routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Consumer callbacks. librdkafka runs them from inside `recv`, so a
/// revocation is seen before any message of the following assignment.
struct RebalanceContext {
    topic: String,
    routes: Arc<Mutex<PartitionRoutes>>,
    drain_timeout: Duration,
}

impl ClientContext for RebalanceContext {}

impl ConsumerContext for RebalanceContext {
    fn pre_rebalance(&self, _consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Revoke(tpl) => {
                let partitions: Vec<i32> = tpl
                    .elements_for_topic(&self.topic)
                    .iter()
                    .map(|e| e.partition())
                    .collect();
                let releases = lock_routes(&self.routes).revoke(partitions);
                if releases.is_empty() {
                    return;
                }
                // Returning hands the partitions back to the group.
                let held = block_until_released(releases, self.drain_timeout);
                if !held.is_empty() {
                    tracing::warn!(
                        topic = %self.topic,
                        partitions = ?held,
                        "Revoked partitions did not drain in time; their records will be redelivered"
                    );
                }
            }
            Rebalance::Assign(tpl) => {
                tracing::info!(topic = %self.topic, partitions = tpl.count(), "Partitions assigned");
            }
            Rebalance::Error(e) => tracing::warn!(error = %e, "Kafka rebalance error"),
        }
    }
}

struct KafkaCommitter {
    consumer: Arc<LogConsumer>,
}

#[async_trait]
impl OffsetCommitter for KafkaCommitter {
    /// Synchronous commit on a blocking thread, so a drain running inside a
    /// rebalance is durable before the partition is released.
    async fn commit(
        &self,
        topic: &str,
        partition: i32,
        next_offset: i64,
    ) -> Result<(), BrokerError> {
        let commit_error = |reason: String| BrokerError::Commit {
            topic: topic.to_string(),
            partition,
            reason,
        };
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(topic, partition, Offset::Offset(next_offset))?;
        let consumer = self.consumer.clone();
        tokio::task::spawn_blocking(move || consumer.commit(&tpl, CommitMode::Sync))
            .await
            .map_err(|e| commit_error(e.to_string()))?
            .map_err(|e| commit_error(e.to_string()))
    }
}

async fn next_message(consumer: &LogConsumer) -> Result<BrokerMessage, KafkaError> {
    let msg = consumer.recv().await?;
    Ok(BrokerMessage {
        topic: msg.topic().to_string(),
        partition: msg.partition(),
        offset: msg.offset(),
        payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
    })
}

async fn dispatch(
    consumer: Arc<LogConsumer>,
    routes: Arc<Mutex<PartitionRoutes>>,
    topic: String,
    claims: mpsc::Sender<PartitionClaim>,
) {
    let committer: Arc<dyn OffsetCommitter> = Arc::new(KafkaCommitter {
        consumer: consumer.clone(),
    });

    loop {
        let msg = tokio::select! {
            _ = claims.closed() => break,
            msg = next_message(&consumer) => msg,
        };
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(error = %e, "Kafka consume error");
                continue;
            }
        };

        let partition = msg.partition;
        let (tx, claim) = lock_routes(&routes).route(partition, &committer);
        if let Some(claim) = claim {
            if claims.send(claim).await.is_err() {
                break;
            }
            tracing::info!(topic = %topic, partition, "Partition claimed");
        }
        // A full worker stalls this send and, with it, rebalance callbacks.
        // The partition stays ours until the callback returns.
        if tx.send(msg).await.is_err() {
            tracing::debug!(topic = %topic, partition, "Partition worker gone; dropping route");
        }
    }

    // Workers drain on the assembler's shutdown token; nothing to wait for here.
    let released = lock_routes(&routes).revoke_all();
    tracing::info!(topic = %topic, released = released.len(), "Kafka dispatcher stopped");
}
