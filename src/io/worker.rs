// src/io/worker.rs
//
// Per-device polling worker. One cooperative task per device: selects due
// tags, groups them into batches, reads them sequentially with the
// configured inter-request delay, decodes and scales each tag, and emits the
// results to the monitor fan-out. Writes drain from the keyed write queue on
// a duty cycle between read passes, plus a standalone drain path so
// write-only projects still get their writes out.
//
// Failures never escape the loop: a failed batch backs off and continues, a
// failed write stays queued, a failed connect retries next cycle.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;

use crate::io::client::{ModbusClient, ReadPayload};
use crate::io::codec;
use crate::io::mapping::MappedTag;
use crate::io::scaling::apply_scaling;
use crate::io::scheduler::{group_reads, BlockSizes, ReadBatch};
use crate::io::write_queue::WriteQueue;
use crate::io::{TagUpdate, TagValue, WorkerState};

/// Loop tick between cycles.
const TICK: Duration = Duration::from_millis(200);
/// Back-off after a failed batch read, giving the device time to recover.
const BATCH_FAILURE_BACKOFF: Duration = Duration::from_secs(1);
/// Back-off after a failed connect before the next cycle retries.
const CONNECT_FAILURE_BACKOFF: Duration = Duration::from_millis(500);

/// Lifecycle interface shared by device runners.
#[async_trait]
pub trait DeviceRunner: Send {
    async fn start(&mut self) -> Result<(), String>;
    async fn stop(&mut self) -> Result<(), String>;
    fn state(&self) -> WorkerState;
    fn config_id(&self) -> &str;
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub config_id: String,
    pub block_sizes: BlockSizes,
    pub inter_request_delay: Duration,
    /// Read passes per write drain; 1 interleaves writes after every pass.
    pub duty_cycle_ratio: u32,
    pub max_writes_per_batch: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            config_id: String::new(),
            block_sizes: BlockSizes::default(),
            inter_request_delay: Duration::ZERO,
            duty_cycle_ratio: 1,
            max_writes_per_batch: 5,
        }
    }
}

pub struct ModbusWorker {
    config: WorkerConfig,
    tags: Vec<Arc<MappedTag>>,
    write_queue: Arc<WriteQueue>,
    updates: UnboundedSender<TagUpdate>,
    client: Option<ModbusClient>,
    state: WorkerState,
    cancel_flag: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl ModbusWorker {
    pub fn new(
        config: WorkerConfig,
        client: ModbusClient,
        tags: Vec<Arc<MappedTag>>,
        write_queue: Arc<WriteQueue>,
        updates: UnboundedSender<TagUpdate>,
    ) -> Self {
        Self {
            config,
            tags,
            write_queue,
            updates,
            client: Some(client),
            state: WorkerState::Idle,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn write_queue(&self) -> Arc<WriteQueue> {
        Arc::clone(&self.write_queue)
    }
}

#[async_trait]
impl DeviceRunner for ModbusWorker {
    async fn start(&mut self) -> Result<(), String> {
        if self.state == WorkerState::Running {
            return Err(format!("Worker {} is already running", self.config.config_id));
        }
        let client = self
            .client
            .take()
            .ok_or_else(|| format!("Worker {} has no client (already started?)", self.config.config_id))?;

        self.cancel_flag.store(false, Ordering::Relaxed);
        let cancel = Arc::clone(&self.cancel_flag);
        let tags = self.tags.clone();
        let queue = Arc::clone(&self.write_queue);
        let updates = self.updates.clone();
        let config = self.config.clone();

        tlog!(
            "[Worker:{}] Starting with {} tag(s), duty cycle {}:1",
            config.config_id,
            tags.len(),
            config.duty_cycle_ratio
        );

        self.handle = Some(tokio::spawn(async move {
            run_loop(client, config, tags, queue, updates, cancel).await;
        }));
        self.state = WorkerState::Running;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), String> {
        if self.state != WorkerState::Running {
            return Ok(());
        }
        self.state = WorkerState::Stopping;
        self.cancel_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        // Stopping the runtime leaves no queued writes behind.
        self.write_queue.clear();
        self.state = WorkerState::Stopped;
        tlog!("[Worker:{}] Stopped", self.config.config_id);
        Ok(())
    }

    fn state(&self) -> WorkerState {
        self.state
    }

    fn config_id(&self) -> &str {
        &self.config.config_id
    }
}

// ============================================================================
// Main loop
// ============================================================================

async fn run_loop(
    mut client: ModbusClient,
    config: WorkerConfig,
    tags: Vec<Arc<MappedTag>>,
    queue: Arc<WriteQueue>,
    updates: UnboundedSender<TagUpdate>,
    cancel: Arc<AtomicBool>,
) {
    let mut next_due: Vec<Instant> = vec![Instant::now(); tags.len()];
    let index_by_path: HashMap<&str, usize> = tags
        .iter()
        .enumerate()
        .map(|(i, t)| (t.tree_path.as_str(), i))
        .collect();
    let mut read_count: u32 = 0;

    loop {
        if cancel.load(Ordering::Relaxed) {
            break;
        }

        let now = Instant::now();
        let due: Vec<Arc<MappedTag>> = tags
            .iter()
            .enumerate()
            .filter(|(i, _)| next_due[*i] <= now)
            .map(|(_, t)| Arc::clone(t))
            .collect();

        if !due.is_empty() {
            if !client.is_connected() {
                if let Err(e) = client.connect().await {
                    tlog!("[Worker:{}] {}", config.config_id, e);
                    sleep(CONNECT_FAILURE_BACKOFF).await;
                    continue;
                }
            }

            let batches = group_reads(&due, &config.block_sizes);
            let batch_count = batches.len();

            for (batch_index, batch) in batches.into_iter().enumerate() {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }

                match client.read(batch.address_type, batch.start, batch.count).await {
                    Ok(payload) => {
                        for tag in &batch.tags {
                            let value = decode_tag_from_batch(&payload, &batch, tag);
                            let _ = updates.send(TagUpdate {
                                config_id: config.config_id.clone(),
                                tag: Arc::clone(tag),
                                value: Some(value),
                            });
                            if let Some(&idx) = index_by_path.get(tag.tree_path.as_str()) {
                                next_due[idx] =
                                    Instant::now() + Duration::from_millis(tag.scan_ms);
                            }
                        }
                        read_count += 1;

                        // Duty cycle: interleave queued writes between reads.
                        if read_count >= config.duty_cycle_ratio.max(1) && !queue.is_empty() {
                            drain_writes(&mut client, &config, &queue).await;
                            read_count = 0;
                        }

                        // Give the device time between ADU exchanges.
                        if batch_index + 1 < batch_count && !config.inter_request_delay.is_zero() {
                            sleep(config.inter_request_delay).await;
                        }
                    }
                    Err(e) => {
                        tlog!(
                            "[Worker:{}] Batch {} failed (start={} count={}): {}",
                            config.config_id,
                            batch_index,
                            batch.start,
                            batch.count,
                            e
                        );
                        // Last good values stay in the buffer; only the
                        // quality of the affected tags drops.
                        for tag in &batch.tags {
                            let _ = updates.send(TagUpdate {
                                config_id: config.config_id.clone(),
                                tag: Arc::clone(tag),
                                value: None,
                            });
                        }
                        sleep(BATCH_FAILURE_BACKOFF).await;
                    }
                }
            }
        }

        // Standalone drain covers write-only projects where no reads are due.
        if !queue.is_empty() {
            if !client.is_connected() {
                if let Err(e) = client.connect().await {
                    tlog!("[Worker:{}] Write drain connect failed: {}", config.config_id, e);
                }
            }
            if client.is_connected() {
                drain_writes(&mut client, &config, &queue).await;
                read_count = 0;
            }
        }

        sleep(TICK).await;
    }

    client.close().await;
}

/// Drain up to `max_writes_per_batch` queued writes. Completed writes leave
/// the queue; failed writes stay for the next drain.
async fn drain_writes(client: &mut ModbusClient, config: &WorkerConfig, queue: &WriteQueue) {
    let pending = queue.get_pending(config.max_writes_per_batch);
    if pending.is_empty() {
        return;
    }
    tlog!(
        "[Worker:{}] Draining {} pending write(s)",
        config.config_id,
        pending.len()
    );

    for request in pending {
        match client.write(&request).await {
            Ok(()) => {
                queue.mark_completed(request.address, request.function_code);
                tlog!(
                    "[Worker:{}] Write ok: '{}' addr={} fc={}",
                    config.config_id,
                    request.tag_info.name,
                    request.address,
                    request.function_code
                );
            }
            Err(e) => {
                queue.mark_failed(request.address, request.function_code, &e);
            }
        }
    }
}

/// Slice a tag's portion out of a batch payload and decode it. Out-of-range
/// or short slices decode to `Null` (quality turns Bad); they never panic.
fn decode_tag_from_batch(payload: &ReadPayload, batch: &ReadBatch, tag: &MappedTag) -> TagValue {
    let value = match payload {
        ReadPayload::Bits(bits) => {
            let offset = tag.address.saturating_sub(batch.start) as usize;
            if tag.data_type.is_array {
                let n = tag.array_len.unwrap_or(1);
                TagValue::Array(
                    (0..n)
                        .map(|i| match bits.get(offset + i) {
                            Some(&b) => TagValue::Bool(b),
                            None => TagValue::Null,
                        })
                        .collect(),
                )
            } else {
                match bits.get(offset) {
                    Some(&b) => TagValue::Bool(b),
                    None => TagValue::Null,
                }
            }
        }
        ReadPayload::Registers(bytes) => {
            let offset_bytes = tag.address.saturating_sub(batch.start) as usize * 2;
            let needed = tag.register_count as usize * 2;
            let slice = if offset_bytes <= bytes.len() {
                &bytes[offset_bytes..bytes.len().min(offset_bytes + needed)]
            } else {
                &[][..]
            };
            codec::decode_registers(slice, tag.data_type, tag.array_len, &tag.encoding)
        }
    };

    match &tag.scaling {
        Some(scaling) => apply_scaling(&value, scaling),
        None => value,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::mapping::{normalize_data_type, Access, AddressType, Encoding};
    use crate::io::scaling::{Scaling, ScalingKind};

    fn make_tag(address: u16, data_type: &str, array_len: Option<usize>) -> Arc<MappedTag> {
        let (ty, regs) = normalize_data_type(data_type);
        Arc::new(MappedTag {
            tree_path: "Channel1.Device1.Probe".into(),
            name: "Probe".into(),
            description: String::new(),
            unit_id: 1,
            address_type: AddressType::HoldingRegister,
            address,
            register_count: regs * array_len.unwrap_or(1) as u16,
            data_type: ty,
            array_len,
            encoding: Encoding::default(),
            access: Access::ReadOnly,
            scan_ms: 1000,
            scaling: None,
            write_function_code: Some(16),
            raw_address: String::new(),
        })
    }

    fn batch_for(tag: &Arc<MappedTag>, start: u16, count: u16) -> ReadBatch {
        ReadBatch {
            address_type: tag.address_type,
            unit_id: tag.unit_id,
            start,
            count,
            tags: vec![Arc::clone(tag)],
            function_code: 3,
        }
    }

    #[test]
    fn test_decode_tag_from_batch_slices_offset() {
        let tag = make_tag(2, "Word", None);
        let batch = batch_for(&tag, 0, 4);
        // Registers 0..4 = [0, 0, 500, 0]
        let payload = ReadPayload::Registers(vec![0, 0, 0, 0, 0x01, 0xF4, 0, 0]);
        assert_eq!(
            decode_tag_from_batch(&payload, &batch, &tag),
            TagValue::UInt(500)
        );
    }

    #[test]
    fn test_decode_tag_from_batch_scaling_applied() {
        let mut tag = (*make_tag(0, "Int", None)).clone();
        tag.scaling = Some(Scaling {
            kind: ScalingKind::Linear,
            raw_low: 0.0,
            raw_high: 1000.0,
            scaled_low: 0.0,
            scaled_high: 100.0,
            clamp_low: false,
            clamp_high: false,
            negate: false,
            scaled_type: Some("Float".into()),
            units: String::new(),
        });
        let tag = Arc::new(tag);
        let batch = batch_for(&tag, 0, 1);
        let payload = ReadPayload::Registers(vec![0x01, 0xF4]);
        assert_eq!(
            decode_tag_from_batch(&payload, &batch, &tag),
            TagValue::Float(50.0)
        );
    }

    #[test]
    fn test_decode_tag_from_batch_short_payload_is_null() {
        let tag = make_tag(2, "Float", None);
        let batch = batch_for(&tag, 0, 4);
        let payload = ReadPayload::Registers(vec![0, 0]);
        assert_eq!(
            decode_tag_from_batch(&payload, &batch, &tag),
            TagValue::Null
        );
    }

    #[test]
    fn test_decode_tag_from_batch_bits() {
        let tag = Arc::new(MappedTag {
            address_type: AddressType::Coil,
            ..(*make_tag(3, "Boolean", None)).clone()
        });
        let batch = ReadBatch {
            address_type: AddressType::Coil,
            unit_id: 1,
            start: 0,
            count: 8,
            tags: vec![Arc::clone(&tag)],
            function_code: 1,
        };
        let payload = ReadPayload::Bits(vec![false, false, false, true, false]);
        assert_eq!(
            decode_tag_from_batch(&payload, &batch, &tag),
            TagValue::Bool(true)
        );
    }

    #[test]
    fn test_decode_tag_from_batch_bit_array_pads_null() {
        let tag = Arc::new(MappedTag {
            address_type: AddressType::Coil,
            ..(*make_tag(0, "Boolean (Array)", Some(4))).clone()
        });
        let batch = ReadBatch {
            address_type: AddressType::Coil,
            unit_id: 1,
            start: 0,
            count: 2,
            tags: vec![Arc::clone(&tag)],
            function_code: 1,
        };
        let payload = ReadPayload::Bits(vec![true, false]);
        assert_eq!(
            decode_tag_from_batch(&payload, &batch, &tag),
            TagValue::Array(vec![
                TagValue::Bool(true),
                TagValue::Bool(false),
                TagValue::Null,
                TagValue::Null,
            ])
        );
    }
}
