/// Errors raised by a [`StreamBroker`](crate::broker::StreamBroker) or its
/// offset committer.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker: connection failed: {0}")]
    Connection(String),

    #[error("Broker: commit of {topic}/{partition} failed: {reason}")]
    Commit {
        topic: String,
        partition: i32,
        reason: String,
    },

    #[error("Broker: unknown partition {topic}/{partition}")]
    UnknownPartition { topic: String, partition: i32 },

    #[error("Broker: closed")]
    Closed,

    #[cfg(feature = "kafka")]
    #[error("Broker: Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

/// Errors raised by the ingestion pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Subscribing to the stream failed at startup. Fatal.
    #[error("Ingest: subscribe failed: {0}")]
    Subscribe(#[source] BrokerError),

    /// A single message could not be decoded into a log record. The record
    /// is dropped and ingestion continues.
    #[error("Ingest: undecodable message at {topic}/{partition}@{offset}: {reason}")]
    Decode {
        topic: String,
        partition: i32,
        offset: i64,
        reason: String,
    },
}
