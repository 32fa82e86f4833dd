//! Partition routing for a broker that reads many partitions through one
//! consumer. Each owned partition gets one [`PartitionClaim`]; revoking a
//! partition cancels its claim and hands back a [`Release`] to wait on.

use crate::broker::{BrokerMessage, OffsetCommitter, PartitionClaim};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const RELEASE_POLL: Duration = Duration::from_millis(5);

struct Route {
    tx: mpsc::Sender<BrokerMessage>,
    revoked: CancellationToken,
}

/// A revoked claim whose owner may still be draining it.
pub(crate) struct Release {
    partition: i32,
    tx: mpsc::Sender<BrokerMessage>,
}

impl Release {
    pub(crate) fn partition(&self) -> i32 {
        self.partition
    }

    /// The owner has dropped the claim, so its final flush and commit are done.
    pub(crate) fn is_done(&self) -> bool {
        self.tx.is_closed()
    }
}

pub(crate) struct PartitionRoutes {
    topic: String,
    capacity: usize,
    routes: HashMap<i32, Route>,
}

impl PartitionRoutes {
    pub(crate) fn new(topic: impl Into<String>, capacity: usize) -> Self {
        Self {
            topic: topic.into(),
            capacity: capacity.max(1),
            routes: HashMap::new(),
        }
    }

    /// Sender for `partition`. A partition with no live route gets a fresh
    /// claim, returned alongside for delivery to the assembler.
    pub(crate) fn route(
        &mut self,
        partition: i32,
        committer: &Arc<dyn OffsetCommitter>,
    ) -> (mpsc::Sender<BrokerMessage>, Option<PartitionClaim>) {
        if let Some(route) = self.routes.get(&partition) {
            if !route.tx.is_closed() {
                return (route.tx.clone(), None);
            }
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        let revoked = CancellationToken::new();
        let claim = PartitionClaim {
            topic: self.topic.clone(),
            partition,
            messages: rx,
            committer: committer.clone(),
            revoked: revoked.clone(),
        };
        self.routes.insert(
            partition,
            Route {
                tx: tx.clone(),
                revoked,
            },
        );
        (tx, Some(claim))
    }

    /// Cancel and unroute `partitions`. Partitions without a route are ignored.
    pub(crate) fn revoke(&mut self, partitions: impl IntoIterator<Item = i32>) -> Vec<Release> {
        partitions
            .into_iter()
            .filter_map(|partition| {
                let route = self.routes.remove(&partition)?;
                route.revoked.cancel();
                tracing::info!(topic = %self.topic, partition, "Partition revoked");
                Some(Release {
                    partition,
                    tx: route.tx,
                })
            })
            .collect()
    }

    pub(crate) fn revoke_all(&mut self) -> Vec<Release> {
        let partitions: Vec<i32> = self.routes.keys().copied().collect();
        self.revoke(partitions)
    }

    pub(crate) fn is_routed(&self, partition: i32) -> bool {
        self.routes.contains_key(&partition)
    }
}

/// Block until every release is done or `timeout` passes. Returns the
/// partitions whose owners were still holding on.
pub(crate) fn wait_released(mut releases: Vec<Release>, timeout: Duration) -> Vec<i32> {
    let started = Instant::now();
    loop {
        releases.retain(|r| !r.is_done());
        if releases.is_empty() || started.elapsed() >= timeout {
            return releases.iter().map(Release::partition).collect();
        }
        std::thread::sleep(RELEASE_POLL);
    }
}

/// [`wait_released`] from a synchronous callback that may be running on a
/// runtime worker. On the multi-thread runtime the worker is handed off
/// first so the draining tasks keep being polled.
pub(crate) fn block_until_released(releases: Vec<Release>, timeout: Duration) -> Vec<i32> {
    use tokio::runtime::{Handle, RuntimeFlavor};

    let on_worker = matches!(
        Handle::try_current().map(|h| h.runtime_flavor()),
        Ok(RuntimeFlavor::MultiThread)
    );
    if on_worker {
        tokio::task::block_in_place(|| wait_released(releases, timeout))
    } else {
        wait_released(releases, timeout)
    }
}
