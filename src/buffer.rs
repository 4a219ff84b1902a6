// src/buffer.rs
//
// Central tag value buffer: thread-safe map from tree path to the latest
// decoded value plus timestamp, quality, update count and static metadata.
// Workers write into it through the monitor fan-out; the OPC UA bridge and
// any monitor view read from it. Entries live until the runtime stops, when
// the whole buffer is cleared. No I/O ever happens under the lock.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::io::{now_s, Quality, TagValue};

/// Dynamic part of a buffer entry, written on every poll.
#[derive(Clone, Debug, Serialize)]
struct DynamicEntry {
    value: TagValue,
    timestamp: u64,
    quality: Quality,
    update_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_write: Option<u64>,
}

/// Static metadata, set once when the runtime starts.
#[derive(Clone, Debug, Default, Serialize)]
struct StaticInfo {
    data_type: String,
    access: String,
}

/// Merged view handed out to consumers.
#[derive(Clone, Debug, Serialize)]
pub struct BufferEntry {
    pub value: TagValue,
    /// Unix seconds of the last update.
    pub timestamp: u64,
    pub quality: Quality,
    pub update_count: u64,
    pub data_type: String,
    pub access: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_write: Option<u64>,
}

#[derive(Default)]
struct BufferInner {
    data: HashMap<String, DynamicEntry>,
    info: HashMap<String, StaticInfo>,
}

/// Cheaply cloneable handle to the shared buffer.
#[derive(Clone, Default)]
pub struct DataBuffer {
    inner: Arc<RwLock<BufferInner>>,
}

impl DataBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update a tag's dynamic values (called from the monitor fan-out).
    pub fn update(
        &self,
        path: &str,
        value: TagValue,
        timestamp: u64,
        quality: Quality,
        update_count: u64,
    ) {
        let mut inner = self.inner.write().unwrap();
        let entry = inner.data.entry(path.to_string()).or_insert(DynamicEntry {
            value: TagValue::Null,
            timestamp: 0,
            quality: Quality::Unknown,
            update_count: 0,
            last_write: None,
        });
        entry.value = value;
        entry.timestamp = timestamp;
        entry.quality = quality;
        entry.update_count = update_count;
    }

    /// Set a tag's static metadata (called during runtime start).
    pub fn set_static(&self, path: &str, data_type: &str, access: &str) {
        let mut inner = self.inner.write().unwrap();
        let info = inner.info.entry(path.to_string()).or_default();
        info.data_type = data_type.to_string();
        info.access = access.to_string();
    }

    pub fn get_value(&self, path: &str) -> Option<TagValue> {
        let inner = self.inner.read().unwrap();
        inner.data.get(path).map(|e| e.value.clone())
    }

    pub fn get_entry(&self, path: &str) -> Option<BufferEntry> {
        let inner = self.inner.read().unwrap();
        let dynamic = inner.data.get(path)?;
        let info = inner.info.get(path).cloned().unwrap_or_default();
        Some(merge(dynamic, &info))
    }

    /// Record a value written by an OPC UA client, for immediate read-back
    /// before the device confirms it.
    pub fn write(&self, path: &str, value: TagValue) -> bool {
        let mut inner = self.inner.write().unwrap();
        let entry = inner.data.entry(path.to_string()).or_insert(DynamicEntry {
            value: TagValue::Null,
            timestamp: 0,
            quality: Quality::Unknown,
            update_count: 0,
            last_write: None,
        });
        entry.value = value;
        entry.last_write = Some(now_s());
        true
    }

    /// Snapshot of every entry, merged with static metadata.
    pub fn snapshot(&self) -> HashMap<String, BufferEntry> {
        let inner = self.inner.read().unwrap();
        inner
            .data
            .iter()
            .map(|(path, dynamic)| {
                let info = inner.info.get(path).cloned().unwrap_or_default();
                (path.clone(), merge(dynamic, &info))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().data.is_empty()
    }

    /// Wholesale clear on runtime stop.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.data.clear();
        inner.info.clear();
    }
}

fn merge(dynamic: &DynamicEntry, info: &StaticInfo) -> BufferEntry {
    BufferEntry {
        value: dynamic.value.clone(),
        timestamp: dynamic.timestamp,
        quality: dynamic.quality,
        update_count: dynamic.update_count,
        data_type: info.data_type.clone(),
        access: info.access.clone(),
        last_write: dynamic.last_write,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_and_get() {
        let buffer = DataBuffer::new();
        buffer.set_static("Channel1.Device1.Probe", "Int", "Read Only");
        buffer.update("Channel1.Device1.Probe", TagValue::Float(50.0), 1000, Quality::Good, 1);

        let entry = buffer.get_entry("Channel1.Device1.Probe").unwrap();
        assert_eq!(entry.value, TagValue::Float(50.0));
        assert_eq!(entry.quality, Quality::Good);
        assert_eq!(entry.update_count, 1);
        assert_eq!(entry.data_type, "Int");
        assert_eq!(entry.access, "Read Only");

        assert_eq!(
            buffer.get_value("Channel1.Device1.Probe"),
            Some(TagValue::Float(50.0))
        );
        assert_eq!(buffer.get_value("missing"), None);
    }

    #[test]
    fn test_update_counts_are_caller_owned() {
        let buffer = DataBuffer::new();
        for count in 1..=5 {
            buffer.update("t", TagValue::UInt(count), 0, Quality::Good, count);
            assert_eq!(buffer.get_entry("t").unwrap().update_count, count);
        }
    }

    #[test]
    fn test_client_write_records_timestamp() {
        let buffer = DataBuffer::new();
        assert!(buffer.write("t", TagValue::Float(12.5)));
        let entry = buffer.get_entry("t").unwrap();
        assert_eq!(entry.value, TagValue::Float(12.5));
        assert!(entry.last_write.is_some());
    }

    #[test]
    fn test_snapshot_and_clear() {
        let buffer = DataBuffer::new();
        buffer.update("a", TagValue::UInt(1), 0, Quality::Good, 1);
        buffer.update("b", TagValue::UInt(2), 0, Quality::Bad, 1);
        let snap = buffer.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap["b"].quality, Quality::Bad);

        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.get_entry("a").is_none());
    }

    #[test]
    fn test_entry_without_static_info() {
        let buffer = DataBuffer::new();
        buffer.update("t", TagValue::Bool(true), 0, Quality::Good, 1);
        let entry = buffer.get_entry("t").unwrap();
        assert!(entry.data_type.is_empty());
    }
}
