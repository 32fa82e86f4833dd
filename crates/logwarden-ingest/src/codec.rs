use crate::broker::BrokerMessage;
use crate::error::IngestError;
use logwarden_common::types::LogRecord;

/// Decode one JSON-encoded [`LogRecord`] from a stream message.
pub fn decode(msg: &BrokerMessage) -> Result<LogRecord, IngestError> {
    let fail = |reason: String| IngestError::Decode {
        topic: msg.topic.clone(),
        partition: msg.partition,
        offset: msg.offset,
        reason,
    };

    let record: LogRecord = serde_json::from_slice(&msg.payload).map_err(|e| fail(e.to_string()))?;
    if record.service.trim().is_empty() {
        return Err(fail("missing service".to_string()));
    }
    if record.message.is_empty() {
        return Err(fail("missing message".to_string()));
    }
    Ok(record)
}

/// Encode a record the way producers put it on the stream.
pub fn encode(record: &LogRecord) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(record)
}
