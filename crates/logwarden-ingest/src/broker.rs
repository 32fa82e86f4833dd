use crate::error::BrokerError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One message read from a stream partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

/// Commits the consumed position of a partition for the consumer group.
#[async_trait]
pub trait OffsetCommitter: Send + Sync {
    /// Record `next_offset` (the offset of the next message to read) as the
    /// group's position on `topic/partition`.
    async fn commit(&self, topic: &str, partition: i32, next_offset: i64)
        -> Result<(), BrokerError>;
}

/// A partition currently owned by this process.
///
/// Messages arrive in partition order. `revoked` is cancelled when the
/// broker takes the partition away; the owner must flush and let go.
pub struct PartitionClaim {
    pub topic: String,
    pub partition: i32,
    pub messages: mpsc::Receiver<BrokerMessage>,
    pub committer: Arc<dyn OffsetCommitter>,
    pub revoked: CancellationToken,
}

impl std::fmt::Debug for PartitionClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionClaim")
            .field("topic", &self.topic)
            .field("partition", &self.partition)
            .field("revoked", &self.revoked.is_cancelled())
            .finish()
    }
}

/// Durable, partitioned, ordered event stream with consumer-group positions.
#[async_trait]
pub trait StreamBroker: Send + Sync {
    /// Join `group` on `topic`. Each partition assigned to this process is
    /// delivered as a [`PartitionClaim`] on the returned channel, which
    /// closes when the subscription ends.
    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<mpsc::Receiver<PartitionClaim>, BrokerError>;
}
