//! Stream ingestion: the broker abstraction, its in-memory and Kafka
//! implementations, and the batch assembler that writes consumed log records
//! to storage in bounded batches.

pub mod assembler;
pub mod broker;
pub mod codec;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
#[cfg_attr(not(feature = "kafka"), allow(dead_code))]
mod routes;


pub use assembler::{BatchAssembler, BatchConfig, PartitionWorker, WorkerReport};
pub use broker::{BrokerMessage, OffsetCommitter, PartitionClaim, StreamBroker};
pub use error::{BrokerError, IngestError};
pub use memory::MemoryBroker;
