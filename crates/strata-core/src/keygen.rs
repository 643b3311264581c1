//! Key generators for INSERTs that omit the generate-key column

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use strata_types::Value;
use tracing::warn;

use crate::algorithm::{AlgorithmProps, PropReader};
use crate::error::ConfigError;

/// 2016-11-01T00:00:00Z in milliseconds
const SNOWFLAKE_EPOCH_MS: u64 = 1_477_929_600_000;
const SEQUENCE_BITS: u32 = 12;
const WORKER_ID_BITS: u32 = 10;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const MAX_WORKER_ID: u64 = (1 << WORKER_ID_BITS) - 1;

#[derive(Debug)]
pub enum KeyGenerator {
    Snowflake(SnowflakeKeyGenerator),
    /// Random v4 UUID without hyphens
    Uuid,
}

impl KeyGenerator {
    pub fn type_name(&self) -> &'static str {
        match self {
            KeyGenerator::Snowflake(_) => "SNOWFLAKE",
            KeyGenerator::Uuid => "UUID",
        }
    }

    pub fn generate(&self) -> Value {
        match self {
            KeyGenerator::Snowflake(generator) => Value::Int(generator.next_id()),
            KeyGenerator::Uuid => Value::Text(uuid::Uuid::new_v4().simple().to_string()),
        }
    }

    pub fn generate_many(&self, count: usize) -> Vec<Value> {
        (0..count).map(|_| self.generate()).collect()
    }
}

/// 64-bit ids: 41 bits of milliseconds since the epoch, 10 bits of worker
/// id, 12 bits of per-millisecond sequence
#[derive(Debug)]
pub struct SnowflakeKeyGenerator {
    worker_id: u64,
    /// (last timestamp, sequence)
    state: Mutex<(u64, u64)>,
}

impl SnowflakeKeyGenerator {
    pub fn new(worker_id: u64) -> Self {
        Self { worker_id: worker_id & MAX_WORKER_ID, state: Mutex::new((0, 0)) }
    }

    pub fn from_props(props: &AlgorithmProps) -> Result<Self, ConfigError> {
        let reader = PropReader::new("SNOWFLAKE", props);
        let worker_id = match reader.optional_string("worker-id") {
            None => 0,
            Some(_) => {
                let id = reader.i64("worker-id")?;
                u64::try_from(id)
                    .ok()
                    .filter(|id| *id <= MAX_WORKER_ID)
                    .ok_or_else(|| reader.invalid("worker-id", format!("must be within [0, {MAX_WORKER_ID}]")))?
            }
        };
        Ok(Self::new(worker_id))
    }

    pub fn next_id(&self) -> i64 {
        let mut state = self.state.lock();
        let (last, sequence) = *state;

        let mut now = current_millis();
        if now < last {
            warn!(last_ms = last, now_ms = now, "Clock moved backwards, reusing last timestamp");
            now = last;
        }

        let sequence = if now == last { (sequence + 1) & SEQUENCE_MASK } else { 0 };
        if now == last && sequence == 0 {
            // sequence exhausted for this millisecond
            while now <= last {
                std::hint::spin_loop();
                now = current_millis();
            }
        }
        *state = (now, sequence);

        let id = (now.saturating_sub(SNOWFLAKE_EPOCH_MS) << (WORKER_ID_BITS + SEQUENCE_BITS))
            | (self.worker_id << SEQUENCE_BITS)
            | sequence;
        (id & i64::MAX as u64) as i64
    }
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(SNOWFLAKE_EPOCH_MS)
}
