use crate::config::{BrokerConfig, BrokerKind, ServerConfig};
use anyhow::Context;
use logwarden_alert::{AlertEvaluator, EvaluationScheduler};
use logwarden_ingest::{
    BatchAssembler, IngestError, MemoryBroker, StreamBroker, WorkerReport,
};
use logwarden_storage::SqliteStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The stream source selected by `[broker] kind`. The memory broker is also
/// handed to the HTTP layer so `POST /v1/logs` can publish into it.
pub struct BrokerHandle {
    pub broker: Arc<dyn StreamBroker>,
    pub memory: Option<Arc<MemoryBroker>>,
}

pub fn build_broker(config: &BrokerConfig) -> anyhow::Result<BrokerHandle> {
    match config.kind {
        BrokerKind::Memory => {
            let memory = Arc::new(MemoryBroker::new(config.memory_partitions));
            tracing::info!(partitions = config.memory_partitions, "Using in-process broker");
            Ok(BrokerHandle {
                broker: memory.clone(),
                memory: Some(memory),
            })
        }
        BrokerKind::Kafka => kafka_broker(config),
    }
}

#[cfg(feature = "kafka")]
fn kafka_broker(config: &BrokerConfig) -> anyhow::Result<BrokerHandle> {
    use logwarden_ingest::kafka::{KafkaBroker, KafkaSettings};

    let settings = KafkaSettings {
        brokers: config.brokers.clone(),
        auto_offset_reset: config.auto_offset_reset.clone(),
        ..Default::default()
    };
    tracing::info!(brokers = %config.brokers.join(","), "Using Kafka broker");
    Ok(BrokerHandle {
        broker: Arc::new(KafkaBroker::new(settings)),
        memory: None,
    })
}

#[cfg(not(feature = "kafka"))]
fn kafka_broker(_config: &BrokerConfig) -> anyhow::Result<BrokerHandle> {
    anyhow::bail!("broker.kind = \"kafka\" requires building with the `kafka` feature")
}

/// Background tasks sharing one shutdown token: the batch assembler and,
/// when enabled, the alert scheduler.
pub struct Background {
    shutdown: CancellationToken,
    ingest: JoinHandle<Result<Vec<WorkerReport>, IngestError>>,
    alerts: Option<JoinHandle<u64>>,
}

impl Background {
    pub fn spawn(
        store: Arc<SqliteStore>,
        broker: Arc<dyn StreamBroker>,
        config: &ServerConfig,
    ) -> Self {
        let shutdown = CancellationToken::new();

        let assembler = BatchAssembler::new(
            broker,
            store.clone(),
            config.broker.topic.clone(),
            config.broker.group_id.clone(),
            config.ingest.batch_config(),
        );
        let token = shutdown.clone();
        let ingest = tokio::spawn(async move {
            let result = assembler.run(token.clone()).await;
            if let Err(e) = &result {
                // Without ingestion the process has no purpose; take the rest down.
                tracing::error!(error = %e, "Batch assembler failed");
                token.cancel();
            }
            result
        });

        let alerts = config.alert.enabled.then(|| {
            let scheduler =
                EvaluationScheduler::new(AlertEvaluator::new(store), config.alert.interval());
            let token = shutdown.clone();
            tokio::spawn(async move { scheduler.run(token).await })
        });
        if alerts.is_none() {
            tracing::info!("Alert evaluation disabled");
        }

        Self {
            shutdown,
            ingest,
            alerts,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Signal shutdown and wait for both tasks. Errors if ingestion failed.
    pub async fn stop(self) -> anyhow::Result<()> {
        self.shutdown.cancel();

        if let Some(alerts) = self.alerts {
            match alerts.await {
                Ok(cycles) => tracing::info!(cycles, "Alert scheduler stopped"),
                Err(e) => tracing::error!(error = %e, "Alert scheduler task panicked"),
            }
        }

        let reports = self
            .ingest
            .await
            .context("Batch assembler task panicked")??;
        let flushed: u64 = reports.iter().map(|r| r.records_flushed).sum();
        let unflushed: usize = reports.iter().map(|r| r.unflushed).sum();
        if unflushed > 0 {
            tracing::warn!(
                flushed,
                unflushed,
                "Stopped with unflushed records; they will be redelivered"
            );
        } else {
            tracing::info!(flushed, workers = reports.len(), "Batch assembler stopped");
        }
        Ok(())
    }
}
