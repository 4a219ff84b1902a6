// src/io/write_queue.rs
//
// Per-device write queue with "write only latest value" semantics: at most
// one entry per (address, function code); a repeat enqueue overwrites the
// stored value and counts as an override. Entries drain in FIFO order of
// their slot and stay queued until the write succeeds, so failed writes
// retry on the next drain.

use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Instant;

use crate::io::mapping::{DataType, Encoding};
use crate::io::TagValue;

/// Snapshot of the tag metadata a write needs for encoding.
#[derive(Clone, Debug)]
pub struct WriteTagInfo {
    pub name: String,
    pub data_type: DataType,
    pub encoding: Encoding,
}

#[derive(Clone, Debug)]
pub struct WriteRequest {
    /// Zero-based protocol address.
    pub address: u16,
    pub function_code: u8,
    pub value: TagValue,
    pub tag_info: WriteTagInfo,
    pub enqueued_at: Instant,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct WriteQueueStats {
    pub enqueued: u64,
    pub executed: u64,
    pub overwritten: u64,
    pub failed: u64,
    pub pending: usize,
}

#[derive(Default)]
struct QueueInner {
    queue: IndexMap<(u16, u8), WriteRequest>,
    enqueued: u64,
    executed: u64,
    overwritten: u64,
    failed: u64,
}

/// Thread-safe keyed write queue, shared between the worker draining it and
/// the write router filling it.
pub struct WriteQueue {
    config_id: String,
    max_pending: usize,
    inner: Mutex<QueueInner>,
}

impl WriteQueue {
    pub fn new(config_id: &str, max_pending: usize) -> Self {
        Self {
            config_id: config_id.to_string(),
            max_pending: max_pending.max(1),
            inner: Mutex::new(QueueInner::default()),
        }
    }

    /// Queue a write. Returns false when the queue is full and the key is
    /// not already present; existing entries are untouched in that case.
    pub fn enqueue(
        &self,
        address: u16,
        function_code: u8,
        value: TagValue,
        tag_info: WriteTagInfo,
    ) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let key = (address, function_code);

        if inner.queue.len() >= self.max_pending && !inner.queue.contains_key(&key) {
            tlog!(
                "[WriteQueue:{}] Full (max {}), rejecting addr={} fc={}",
                self.config_id,
                self.max_pending,
                address,
                function_code
            );
            return false;
        }

        let request = WriteRequest {
            address,
            function_code,
            value,
            tag_info,
            enqueued_at: Instant::now(),
        };

        if let Some(existing) = inner.queue.get_mut(&key) {
            // Write only latest value: the slot keeps its FIFO position, the
            // value is replaced.
            *existing = request;
            inner.overwritten += 1;
        } else {
            inner.queue.insert(key, request);
            inner.enqueued += 1;
        }
        true
    }

    /// Snapshot of up to `max_count` pending writes in FIFO order, without
    /// removing them.
    pub fn get_pending(&self, max_count: usize) -> Vec<WriteRequest> {
        let inner = self.inner.lock().unwrap();
        inner.queue.values().take(max_count).cloned().collect()
    }

    /// Remove a completed write.
    pub fn mark_completed(&self, address: u16, function_code: u8) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.queue.shift_remove(&(address, function_code)).is_some() {
            inner.executed += 1;
            true
        } else {
            false
        }
    }

    /// Record a failed write; the entry stays queued for retry.
    pub fn mark_failed(&self, address: u16, function_code: u8, reason: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.failed += 1;
        tlog!(
            "[WriteQueue:{}] Write failed addr={} fc={}: {}",
            self.config_id,
            address,
            function_code,
            reason
        );
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().queue.is_empty()
    }

    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().queue.clear();
    }

    pub fn stats(&self) -> WriteQueueStats {
        let inner = self.inner.lock().unwrap();
        WriteQueueStats {
            enqueued: inner.enqueued,
            executed: inner.executed,
            overwritten: inner.overwritten,
            failed: inner.failed,
            pending: inner.queue.len(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::mapping::{BaseType, DataType};

    fn info(name: &str) -> WriteTagInfo {
        WriteTagInfo {
            name: name.to_string(),
            data_type: DataType::scalar(BaseType::UInt16),
            encoding: Encoding::default(),
        }
    }

    #[test]
    fn test_latest_value_wins() {
        let queue = WriteQueue::new("Channel1_Device1", 100);
        assert!(queue.enqueue(10, 16, TagValue::UInt(1), info("T")));
        assert!(queue.enqueue(10, 16, TagValue::UInt(2), info("T")));
        assert!(queue.enqueue(10, 16, TagValue::UInt(3), info("T")));

        // One slot, latest value, two overrides
        assert_eq!(queue.count(), 1);
        let stats = queue.stats();
        assert_eq!(stats.enqueued, 1);
        assert!(stats.overwritten >= 2);

        let pending = queue.get_pending(10);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].value, TagValue::UInt(3));
    }

    #[test]
    fn test_at_most_one_entry_per_key() {
        let queue = WriteQueue::new("cfg", 100);
        queue.enqueue(1, 6, TagValue::UInt(5), info("A"));
        queue.enqueue(1, 16, TagValue::UInt(6), info("A"));
        queue.enqueue(1, 6, TagValue::UInt(7), info("A"));
        // (1,6) and (1,16) are distinct keys
        assert_eq!(queue.count(), 2);
    }

    #[test]
    fn test_full_queue_rejects_new_keys_only() {
        let queue = WriteQueue::new("cfg", 2);
        assert!(queue.enqueue(1, 6, TagValue::UInt(1), info("A")));
        assert!(queue.enqueue(2, 6, TagValue::UInt(2), info("B")));
        // New key rejected
        assert!(!queue.enqueue(3, 6, TagValue::UInt(3), info("C")));
        // Existing key still accepts an override
        assert!(queue.enqueue(1, 6, TagValue::UInt(9), info("A")));
        assert_eq!(queue.count(), 2);
        let pending = queue.get_pending(10);
        assert_eq!(pending[0].value, TagValue::UInt(9));
    }

    #[test]
    fn test_get_pending_does_not_remove() {
        let queue = WriteQueue::new("cfg", 10);
        queue.enqueue(1, 6, TagValue::UInt(1), info("A"));
        assert_eq!(queue.get_pending(5).len(), 1);
        assert_eq!(queue.count(), 1);
    }

    #[test]
    fn test_mark_completed_removes() {
        let queue = WriteQueue::new("cfg", 10);
        queue.enqueue(1, 6, TagValue::UInt(1), info("A"));
        assert!(queue.mark_completed(1, 6));
        assert!(queue.is_empty());
        assert_eq!(queue.stats().executed, 1);
        assert!(!queue.mark_completed(1, 6));
    }

    #[test]
    fn test_mark_failed_keeps_entry() {
        let queue = WriteQueue::new("cfg", 10);
        queue.enqueue(1, 6, TagValue::UInt(1), info("A"));
        queue.mark_failed(1, 6, "io error");
        assert_eq!(queue.count(), 1);
        assert_eq!(queue.stats().failed, 1);
    }

    #[test]
    fn test_fifo_order_preserved_across_overrides() {
        let queue = WriteQueue::new("cfg", 10);
        queue.enqueue(5, 6, TagValue::UInt(1), info("A"));
        queue.enqueue(9, 6, TagValue::UInt(2), info("B"));
        // Overriding the first key must not move it behind the second
        queue.enqueue(5, 6, TagValue::UInt(3), info("A"));
        let pending = queue.get_pending(10);
        assert_eq!(pending[0].address, 5);
        assert_eq!(pending[1].address, 9);
    }

    #[test]
    fn test_clear() {
        let queue = WriteQueue::new("cfg", 10);
        queue.enqueue(1, 6, TagValue::UInt(1), info("A"));
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.stats().pending, 0);
    }
}
