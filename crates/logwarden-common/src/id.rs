//! Snowflake ids for stored logs, rules and alerts.

use snowflake::SnowflakeIdBucket;
use std::sync::{Mutex, OnceLock};

/// Largest machine or node id a snowflake can carry (5 bits each).
pub const MAX_WORKER_ID: i32 = 31;

static BUCKET: OnceLock<Mutex<SnowflakeIdBucket>> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("snowflake {field} id {value} is outside 0..={MAX_WORKER_ID}")]
    OutOfRange { field: &'static str, value: i32 },

    #[error("snowflake generator is already in use")]
    AlreadyInitialized,
}

fn worker_id(field: &'static str, value: i32) -> Result<i32, IdError> {
    if (0..=MAX_WORKER_ID).contains(&value) {
        Ok(value)
    } else {
        Err(IdError::OutOfRange { field, value })
    }
}

/// Pin the machine and node ids for this process. Has to run before the
/// first [`next_id`]; the generator is never replaced once ids are issued.
pub fn init(machine_id: i32, node_id: i32) -> Result<(), IdError> {
    let machine_id = worker_id("machine", machine_id)?;
    let node_id = worker_id("node", node_id)?;
    let bucket = SnowflakeIdBucket::new(machine_id, node_id);
    BUCKET
        .set(Mutex::new(bucket))
        .map_err(|_| IdError::AlreadyInitialized)
}

/// Next id in decimal form. Uses machine 1, node 1 when [`init`] never ran.
pub fn next_id() -> String {
    let bucket = BUCKET.get_or_init(|| Mutex::new(SnowflakeIdBucket::new(1, 1)));
    let mut bucket = bucket.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    bucket.get_id().to_string()
}
