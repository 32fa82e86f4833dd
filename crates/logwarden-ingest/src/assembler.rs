//! Batch assembler: turns partition claims into size/time-bounded write
//! batches and advances the consumer position only after a batch is stored.

use crate::broker::{BrokerMessage, PartitionClaim, StreamBroker};
use crate::codec;
use crate::error::IngestError;
use logwarden_common::types::LogRecord;
use logwarden_storage::LogSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Floor for the retry delay, whatever the configured backoff.
const MIN_RETRY_BACKOFF: Duration = Duration::from_millis(1);

/// Flush and retry policy shared by all partition workers.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Flush as soon as the buffer holds this many records.
    pub max_records: usize,
    /// Flush a non-empty buffer this long after its first record arrived.
    pub max_wait: Duration,
    /// First delay after a failed flush; doubles per consecutive failure.
    pub retry_backoff: Duration,
    pub max_retry_backoff: Duration,
    /// Flush attempts made when a worker stops with buffered records.
    pub shutdown_flush_attempts: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_records: 20,
            max_wait: Duration::from_secs(2),
            retry_backoff: Duration::from_millis(500),
            max_retry_backoff: Duration::from_secs(30),
            shutdown_flush_attempts: 3,
        }
    }
}

/// What a partition worker did over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub topic: String,
    pub partition: i32,
    /// Records decoded and buffered.
    pub accepted: u64,
    /// Messages dropped because they could not be decoded.
    pub malformed: u64,
    pub batches_flushed: u64,
    pub records_flushed: u64,
    pub failed_flushes: u64,
    /// Records still buffered (and uncommitted) when the worker stopped.
    pub unflushed: usize,
    /// Last position committed for the partition.
    pub committed: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Idle,
    Accumulating { deadline: Instant },
    Backoff { retry_at: Instant, delay: Duration },
}

impl WorkerState {
    fn wake_at(&self) -> Option<Instant> {
        match *self {
            WorkerState::Idle => None,
            WorkerState::Accumulating { deadline } => Some(deadline),
            WorkerState::Backoff { retry_at, .. } => Some(retry_at),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum StopReason {
    Shutdown,
    Revoked,
    StreamClosed,
}

/// Owns one partition claim: buffers its records and flushes them in
/// arrival order.
pub struct PartitionWorker {
    claim: PartitionClaim,
    sink: Arc<dyn LogSink>,
    config: BatchConfig,
    state: WorkerState,
    buffer: Vec<LogRecord>,
    /// Offset of the last consumed message not yet covered by a commit.
    pending_offset: Option<i64>,
    report: WorkerReport,
}

impl PartitionWorker {
    pub fn new(claim: PartitionClaim, sink: Arc<dyn LogSink>, config: BatchConfig) -> Self {
        let report = WorkerReport {
            topic: claim.topic.clone(),
            partition: claim.partition,
            ..Default::default()
        };
        Self {
            buffer: Vec::with_capacity(config.max_records),
            claim,
            sink,
            config,
            state: WorkerState::Idle,
            pending_offset: None,
            report,
        }
    }

    /// Consume the claim until shutdown, revocation or end of stream, then
    /// drain whatever is still buffered.
    pub async fn run(mut self, shutdown: CancellationToken) -> WorkerReport {
        let revoked = self.claim.revoked.clone();
        let reason = loop {
            let can_read = self.buffer.len() < self.config.max_records;
            let wake_at = self.state.wake_at();

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break StopReason::Shutdown,
                _ = revoked.cancelled() => break StopReason::Revoked,
                _ = sleep_until(wake_at) => {
                    self.flush().await;
                }
                msg = self.claim.messages.recv(), if can_read => match msg {
                    Some(msg) => self.accept(msg).await,
                    None => break StopReason::StreamClosed,
                },
            }
        };

        debug!(
            topic = %self.claim.topic,
            partition = self.claim.partition,
            ?reason,
            buffered = self.buffer.len(),
            "Partition worker stopping"
        );
        self.drain().await;
        self.report
    }

    async fn accept(&mut self, msg: BrokerMessage) {
        match codec::decode(&msg) {
            Ok(record) => {
                self.report.accepted += 1;
                self.buffer.push(record);
                self.pending_offset = Some(msg.offset);
                if self.state == WorkerState::Idle {
                    self.state = WorkerState::Accumulating {
                        deadline: Instant::now() + self.config.max_wait,
                    };
                }
                let backing_off = matches!(self.state, WorkerState::Backoff { .. });
                if self.buffer.len() >= self.config.max_records && !backing_off {
                    self.flush().await;
                }
            }
            Err(e) => {
                self.report.malformed += 1;
                warn!(error = %e, "Dropping malformed log record");
                self.pending_offset = Some(msg.offset);
                // With records buffered the skip rides along with the next flush.
                if self.buffer.is_empty() {
                    self.commit().await;
                }
            }
        }
    }

    /// One attempt to store the whole buffer. Returns true on success.
    async fn flush(&mut self) -> bool {
        if self.buffer.is_empty() {
            self.state = WorkerState::Idle;
            return true;
        }

        match self.sink.insert_batch(&self.buffer).await {
            Ok(()) => {
                let count = self.buffer.len();
                self.buffer.clear();
                self.state = WorkerState::Idle;
                self.report.batches_flushed += 1;
                self.report.records_flushed += count as u64;
                debug!(
                    topic = %self.claim.topic,
                    partition = self.claim.partition,
                    count,
                    "Flushed log batch"
                );
                self.commit().await;
                true
            }
            Err(e) => {
                self.report.failed_flushes += 1;
                let delay = match self.state {
                    WorkerState::Backoff { delay, .. } => {
                        (delay * 2).min(self.config.max_retry_backoff)
                    }
                    _ => self.config.retry_backoff,
                }
                .max(MIN_RETRY_BACKOFF);
                self.state = WorkerState::Backoff {
                    retry_at: Instant::now() + delay,
                    delay,
                };
                error!(
                    topic = %self.claim.topic,
                    partition = self.claim.partition,
                    buffered = self.buffer.len(),
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Batch insert failed"
                );
                false
            }
        }
    }

    async fn commit(&mut self) {
        let Some(offset) = self.pending_offset else {
            return;
        };
        let next_offset = offset + 1;
        match self
            .claim
            .committer
            .commit(&self.claim.topic, self.claim.partition, next_offset)
            .await
        {
            Ok(()) => {
                self.pending_offset = None;
                self.report.committed = Some(next_offset);
            }
            // Left pending: the next successful commit covers it.
            Err(e) => warn!(
                topic = %self.claim.topic,
                partition = self.claim.partition,
                next_offset,
                error = %e,
                "Offset commit failed"
            ),
        }
    }

    async fn drain(&mut self) {
        if self.buffer.is_empty() {
            self.commit().await;
            return;
        }

        let attempts = self.config.shutdown_flush_attempts.max(1);
        for attempt in 1..=attempts {
            if self.flush().await {
                info!(
                    topic = %self.claim.topic,
                    partition = self.claim.partition,
                    "Flushed remaining records"
                );
                return;
            }
            if attempt < attempts {
                if let WorkerState::Backoff { delay, .. } = self.state {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        self.report.unflushed = self.buffer.len();
        error!(
            topic = %self.claim.topic,
            partition = self.claim.partition,
            records = self.buffer.len(),
            attempts,
            "Giving up on buffered records; they stay uncommitted and will be redelivered"
        );
    }
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Subscribes to the stream and runs one [`PartitionWorker`] per claim.
pub struct BatchAssembler {
    broker: Arc<dyn StreamBroker>,
    sink: Arc<dyn LogSink>,
    topic: String,
    group: String,
    config: BatchConfig,
}

impl BatchAssembler {
    pub fn new(
        broker: Arc<dyn StreamBroker>,
        sink: Arc<dyn LogSink>,
        topic: impl Into<String>,
        group: impl Into<String>,
        config: BatchConfig,
    ) -> Self {
        Self {
            broker,
            sink,
            topic: topic.into(),
            group: group.into(),
            config,
        }
    }

    /// Run until `shutdown` fires or the claim stream ends, then wait for
    /// every worker to drain. Fails only if the initial subscribe fails.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<Vec<WorkerReport>, IngestError> {
        let mut claims = self
            .broker
            .subscribe(&self.topic, &self.group)
            .await
            .map_err(IngestError::Subscribe)?;
        info!(topic = %self.topic, group = %self.group, "Batch assembler started");

        let mut workers = JoinSet::new();
        let mut reports = Vec::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                claim = claims.recv() => match claim {
                    Some(claim) => {
                        debug!(topic = %claim.topic, partition = claim.partition, "Starting partition worker");
                        let worker = PartitionWorker::new(claim, self.sink.clone(), self.config.clone());
                        workers.spawn(worker.run(shutdown.clone()));
                    }
                    None => {
                        info!(topic = %self.topic, "Claim stream closed");
                        break;
                    }
                },
                Some(done) = workers.join_next(), if !workers.is_empty() => {
                    collect(done, &mut reports);
                }
            }
        }

        while let Some(done) = workers.join_next().await {
            collect(done, &mut reports);
        }
        info!(
            topic = %self.topic,
            workers = reports.len(),
            unflushed = reports.iter().map(|r| r.unflushed).sum::<usize>(),
            "Batch assembler stopped"
        );
        Ok(reports)
    }
}

fn collect(done: Result<WorkerReport, tokio::task::JoinError>, reports: &mut Vec<WorkerReport>) {
    match done {
        Ok(report) => {
            info!(
                topic = %report.topic,
                partition = report.partition,
                accepted = report.accepted,
                malformed = report.malformed,
                batches = report.batches_flushed,
                failed_flushes = report.failed_flushes,
                unflushed = report.unflushed,
                "Partition worker finished"
            );
            reports.push(report);
        }
        Err(e) => error!(error = %e, "Partition worker panicked"),
    }
}
