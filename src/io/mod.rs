// src/io/mod.rs
//
// Modbus runtime layer: shared types plus the per-device driver stack.
//
// - mapping: address parsing and tag canonicalisation
// - scaling: linear / square-root engineering-value scaling
// - codec: register <-> value encoding across byte/word/dword/bit orders
// - scheduler: grouping of due tags into contiguous read batches
// - client: thin async wrapper over tokio-modbus (TCP, RTU, RTU-over-TCP)
// - write_queue: keyed latest-value write queue
// - worker: per-device polling loop
// - monitor: project walk, worker construction, update fan-out, write routing

pub mod client;
pub mod codec;
pub mod mapping;
pub mod monitor;
pub mod scaling;
pub mod scheduler;
pub mod worker;
pub mod write_queue;

pub use client::{ModbusClient, ReadPayload, TransportConfig};
pub use mapping::{AddressType, BaseType, DataType, Encoding, MappedTag};
pub use monitor::{RuntimeMonitor, WriteRouter};
pub use scheduler::{BlockSizes, ReadBatch};
pub use worker::{DeviceRunner, ModbusWorker};
pub use write_queue::{WriteQueue, WriteRequest, WriteTagInfo};

use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// Shared Types (used across the runtime layer)
// ============================================================================

/// A decoded tag value as it travels between the worker, the data buffer and
/// the OPC UA bridge. `Null` marks a value that could not be decoded; array
/// elements may individually be `Null`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TagValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Array(Vec<TagValue>),
}

impl TagValue {
    pub fn is_null(&self) -> bool {
        matches!(self, TagValue::Null)
    }

    /// Numeric view of the value, used by the scaling engine.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            TagValue::Int(v) => Some(*v as f64),
            TagValue::UInt(v) => Some(*v as f64),
            TagValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TagValue::Bool(b) => Some(*b),
            TagValue::Int(v) => Some(*v != 0),
            TagValue::UInt(v) => Some(*v != 0),
            TagValue::Float(v) => Some(*v != 0.0),
            _ => None,
        }
    }
}

/// Data quality attached to every buffer entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Quality {
    Good,
    Bad,
    Unknown,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Good => "Good",
            Quality::Bad => "Bad",
            Quality::Unknown => "Unknown",
        }
    }
}

/// One poll result emitted by a worker towards the monitor fan-out.
///
/// `value` is `None` when the batch read itself failed: the buffer keeps the
/// last good value and only the quality drops to Bad. A present `Null` value
/// means the read succeeded but the payload could not be decoded.
#[derive(Clone, Debug)]
pub struct TagUpdate {
    pub config_id: String,
    pub tag: Arc<MappedTag>,
    pub value: Option<TagValue>,
}

/// Lifecycle state of a device worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Get current time in microseconds since UNIX epoch
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Get current time in whole seconds since UNIX epoch
pub fn now_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
