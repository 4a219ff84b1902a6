// src/io/monitor.rs
//
// Runtime monitor: walks the project tree, groups tags by
// (channel, device), builds one client + worker per device, fans worker
// results into the data buffer (exploding array tags into per-element
// entries) and routes OPC UA client writes back into the right worker's
// write queue.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

use crate::buffer::DataBuffer;
use crate::io::client::ModbusClient;
use crate::io::mapping::{
    map_tag, Access, ChannelSettings, DataType, DeviceSettings, MappedTag,
};
use crate::io::scaling::reverse_scaling;
use crate::io::worker::{DeviceRunner, ModbusWorker, WorkerConfig};
use crate::io::write_queue::{WriteQueue, WriteTagInfo};
use crate::io::{now_s, Quality, TagUpdate, TagValue};
use crate::project::{Project, ProjectNode};

const MAX_PENDING_WRITES: usize = 100;
const MAX_WRITES_PER_BATCH: usize = 5;
const DUTY_CYCLE_RATIO: u32 = 1;

// ============================================================================
// Project walk
// ============================================================================

/// Everything needed to run one device: its transport, settings and tags.
pub struct DevicePlan {
    pub config_id: String,
    pub channel: ChannelSettings,
    pub device: DeviceSettings,
    pub tags: Vec<Arc<MappedTag>>,
}

/// Walk the project tree and build one plan per (channel, device) pair.
/// Groups contribute a path segment but not a grouping key.
pub fn build_device_plans(project: &Project) -> Result<Vec<DevicePlan>, String> {
    let mut plans = Vec::new();

    for channel_node in &project.channels {
        let channel = ChannelSettings::from_node(channel_node)?;

        for child in &channel_node.children {
            let ProjectNode::Device(device_node) = child else {
                continue;
            };
            let device = DeviceSettings::from_node(device_node)?;
            let config_id = format!("{}_{}", channel.name, device.name);
            let prefix = format!("{}.{}", channel.name, device.name);

            let mut tags = Vec::new();
            collect_tags(&device_node.children, &prefix, &device, &mut tags)?;

            if tags.is_empty() {
                tlog!("[Monitor] Device {} has no tags, skipping", config_id);
                continue;
            }

            plans.push(DevicePlan {
                config_id,
                channel: channel.clone(),
                device,
                tags,
            });
        }
    }

    Ok(plans)
}

fn collect_tags(
    children: &[ProjectNode],
    prefix: &str,
    device: &DeviceSettings,
    out: &mut Vec<Arc<MappedTag>>,
) -> Result<(), String> {
    for child in children {
        match child {
            ProjectNode::Tag(tag_node) => {
                let tree_path = format!("{}.{}", prefix, tag_node.general.name);
                let mapped = map_tag(tag_node, device, &tree_path)?;
                out.push(Arc::new(mapped));
            }
            ProjectNode::Group(group) => {
                let group_prefix = format!("{}.{}", prefix, group.general.name);
                collect_tags(&group.children, &group_prefix, device, out)?;
            }
            // Devices do not nest; channels never appear below a device.
            _ => {}
        }
    }
    Ok(())
}

// ============================================================================
// Write router
// ============================================================================

struct WriteTarget {
    config_id: String,
    tag: Arc<MappedTag>,
    queue: Arc<WriteQueue>,
}

/// Routes a (tag path, value) pair from the OPC UA bridge into the owning
/// worker's write queue: checks writability, reverses scaling, picks the
/// function code and element-adjusted address, and enqueues.
pub struct WriteRouter {
    buffer: DataBuffer,
    targets: RwLock<HashMap<String, WriteTarget>>,
}

impl WriteRouter {
    fn new(buffer: DataBuffer) -> Self {
        Self {
            buffer,
            targets: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, tag: Arc<MappedTag>, queue: Arc<WriteQueue>, config_id: &str) {
        let mut targets = self.targets.write().unwrap();
        targets.insert(
            tag.tree_path.clone(),
            WriteTarget {
                config_id: config_id.to_string(),
                tag,
                queue,
            },
        );
    }

    fn clear(&self) {
        self.targets.write().unwrap().clear();
    }

    /// Look up the canonical tag for a path.
    pub fn tag(&self, tag_path: &str) -> Option<Arc<MappedTag>> {
        self.targets
            .read()
            .unwrap()
            .get(tag_path)
            .map(|t| Arc::clone(&t.tag))
    }

    /// Route one client write. `array_index` addresses a single element of an
    /// array tag; `None` writes the scalar (or the whole array).
    pub fn route(&self, tag_path: &str, array_index: Option<usize>, value: TagValue) -> bool {
        let targets = self.targets.read().unwrap();
        let Some(target) = targets.get(tag_path) else {
            tlog!("[WriteRouter] Unknown tag path '{}'", tag_path);
            return false;
        };
        let tag = &target.tag;

        if tag.access != Access::ReadWrite {
            tlog!(
                "[WriteRouter] WritePermissionDenied: '{}' is read-only",
                tag_path
            );
            return false;
        }
        let Some(mut fc) = tag.write_function_code else {
            tlog!(
                "[WriteRouter] '{}' lives in a read-only address space",
                tag_path
            );
            return false;
        };

        // Whole-array writes always need the multi-element function codes.
        if tag.data_type.is_array && array_index.is_none() {
            fc = match fc {
                5 => 15,
                6 => 16,
                other => other,
            };
        }

        // The device expects the raw value; undo any engineering scaling.
        let raw = match &tag.scaling {
            Some(scaling) => reverse_scaling(&value, scaling, tag.data_type.base),
            None => value.clone(),
        };

        let element_offset =
            array_index.unwrap_or(0) as u16 * tag.data_type.base.registers_per_element();
        let address = tag.address + element_offset;

        // A single element writes as a scalar of the base type.
        let data_type = if tag.data_type.is_array && array_index.is_some() {
            DataType::scalar(tag.data_type.base)
        } else {
            tag.data_type
        };

        let info = WriteTagInfo {
            name: tag.tree_path.clone(),
            data_type,
            encoding: tag.encoding,
        };

        let ok = target.queue.enqueue(address, fc, raw, info);
        if ok {
            // Immediate read-back in the buffer; the device copy follows when
            // the worker drains the queue.
            let buffer_path = match array_index {
                Some(i) => format!("{} [{}]", tag_path, i),
                None => tag_path.to_string(),
            };
            self.buffer.write(&buffer_path, value);
            tlog!(
                "[WriteRouter] Enqueued write for '{}' via {}: addr={} fc={}",
                tag_path,
                target.config_id,
                address,
                fc
            );
        } else {
            tlog!("[WriteRouter] QueueFull: write to '{}' rejected", tag_path);
        }
        ok
    }
}

// ============================================================================
// Runtime monitor
// ============================================================================

pub struct RuntimeMonitor {
    buffer: DataBuffer,
    workers: HashMap<String, ModbusWorker>,
    fanout_handle: Option<tokio::task::JoinHandle<()>>,
    router: Arc<WriteRouter>,
    tags: Vec<Arc<MappedTag>>,
    running: bool,
}

impl RuntimeMonitor {
    pub fn new(buffer: DataBuffer) -> Self {
        let router = Arc::new(WriteRouter::new(buffer.clone()));
        Self {
            buffer,
            workers: HashMap::new(),
            fanout_handle: None,
            router,
            tags: Vec::new(),
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn write_router(&self) -> Arc<WriteRouter> {
        Arc::clone(&self.router)
    }

    /// Canonical tags of the running project, for the OPC UA node tree.
    pub fn mapped_tags(&self) -> Vec<Arc<MappedTag>> {
        self.tags.clone()
    }

    /// Build and start one worker per device. Fails when the project yields
    /// no runnable tags at all; individual device failures only log.
    pub async fn start(&mut self, project: &Project) -> Result<(), String> {
        if self.running {
            return Err("Runtime monitor is already running".to_string());
        }

        let plans = build_device_plans(project)?;
        let total_tags: usize = plans.iter().map(|p| p.tags.len()).sum();
        if total_tags == 0 {
            return Err("No runnable tags found in project".to_string());
        }
        tlog!(
            "[Monitor] Starting {} device worker(s), {} tag(s)",
            plans.len(),
            total_tags
        );

        let (update_tx, update_rx) = mpsc::unbounded_channel::<TagUpdate>();
        self.fanout_handle = Some(tokio::spawn(fan_out(update_rx, self.buffer.clone())));

        for plan in plans {
            // Static metadata for every buffer path the tag will produce.
            for tag in &plan.tags {
                let type_name = format!("{:?}", tag.data_type.base);
                if let Some(n) = tag.array_len {
                    for i in 0..n {
                        self.buffer.set_static(
                            &format!("{} [{}]", tag.tree_path, i),
                            &type_name,
                            tag.access.as_str(),
                        );
                    }
                }
                self.buffer
                    .set_static(&tag.tree_path, &type_name, tag.access.as_str());
            }

            let queue = Arc::new(WriteQueue::new(&plan.config_id, MAX_PENDING_WRITES));
            let client = ModbusClient::new(
                &plan.config_id,
                plan.channel.transport.clone(),
                plan.device.unit_id,
                plan.device.timing.clone(),
            );
            let worker_config = WorkerConfig {
                config_id: plan.config_id.clone(),
                block_sizes: plan.device.block_sizes,
                inter_request_delay: plan.device.timing.inter_request_delay,
                duty_cycle_ratio: DUTY_CYCLE_RATIO,
                max_writes_per_batch: MAX_WRITES_PER_BATCH,
            };

            for tag in &plan.tags {
                self.router
                    .register(Arc::clone(tag), Arc::clone(&queue), &plan.config_id);
            }

            let mut worker = ModbusWorker::new(
                worker_config,
                client,
                plan.tags.clone(),
                queue,
                update_tx.clone(),
            );
            // A device that fails to start only loses its own worker; the
            // rest of the runtime comes up regardless.
            if let Err(e) = worker.start().await {
                tlog!("[Monitor] Failed to start worker {}: {}", plan.config_id, e);
                continue;
            }
            self.tags.extend(plan.tags);
            self.workers.insert(plan.config_id, worker);
        }

        self.running = true;
        Ok(())
    }

    /// Stop all workers, drain the fan-out and clear all shared state.
    pub async fn stop(&mut self) {
        for worker in self.workers.values_mut() {
            let _ = worker.stop().await;
        }
        // Dropping the workers drops the last update senders, which lets the
        // fan-out task drain and finish.
        self.workers.clear();
        if let Some(handle) = self.fanout_handle.take() {
            let _ = handle.await;
        }
        self.router.clear();
        self.tags.clear();
        self.buffer.clear();
        self.running = false;
        tlog!("[Monitor] Stopped");
    }
}

// ============================================================================
// Fan-out
// ============================================================================

/// Consume worker updates and write them into the buffer. Array values
/// explode into one `"<path> [i]"` entry per element. A `None` value marks a
/// failed batch read: the last good value stays, only the quality drops.
async fn fan_out(mut rx: mpsc::UnboundedReceiver<TagUpdate>, buffer: DataBuffer) {
    let mut counts: HashMap<String, u64> = HashMap::new();

    fn bump(counts: &mut HashMap<String, u64>, path: &str) -> u64 {
        let count = counts.entry(path.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    while let Some(update) = rx.recv().await {
        let timestamp = now_s();
        let tag = &update.tag;

        match update.value {
            Some(TagValue::Array(elements)) if tag.data_type.is_array => {
                for (i, element) in elements.into_iter().enumerate() {
                    let path = format!("{} [{}]", tag.tree_path, i);
                    let quality = if element.is_null() {
                        Quality::Bad
                    } else {
                        Quality::Good
                    };
                    let count = bump(&mut counts, &path);
                    buffer.update(&path, element, timestamp, quality, count);
                }
            }
            Some(value) => {
                let quality = if value.is_null() {
                    Quality::Bad
                } else {
                    Quality::Good
                };
                let count = bump(&mut counts, &tag.tree_path);
                buffer.update(&tag.tree_path, value, timestamp, quality, count);
            }
            None => {
                let paths: Vec<String> = match tag.array_len {
                    Some(n) => (0..n)
                        .map(|i| format!("{} [{}]", tag.tree_path, i))
                        .collect(),
                    None => vec![tag.tree_path.clone()],
                };
                for path in paths {
                    let last_good = buffer.get_value(&path).unwrap_or(TagValue::Null);
                    let count = bump(&mut counts, &path);
                    buffer.update(&path, last_good, timestamp, Quality::Bad, count);
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::mapping::{AddressType, BaseType};
    use crate::project::Project;

    fn sample_project() -> Project {
        Project::from_json(
            r#"{
            "channels": [{
                "general": {"name": "Channel1"},
                "driver": {"type": "Modbus TCP/IP Ethernet", "params": {"ip": "127.0.0.1", "port": 1}},
                "children": [{
                    "type": "Device",
                    "general": {"name": "Device1", "device_id": 1},
                    "data_access": {"zero_based": "Enable", "zero_based_bit": "Enable", "func_06": 1},
                    "children": [
                        {"type": "Tag", "general": {"name": "Probe", "address": "400001", "data_type": "Int", "access": "Read Only", "scan_rate": 100}},
                        {"type": "Tag", "general": {"name": "Setpoint", "address": "400010", "data_type": "Float", "access": "Read/Write"},
                         "scaling": {"type": "Linear", "raw_low": 0, "raw_high": 1000, "scaled_low": 0, "scaled_high": 100}},
                        {"type": "Group", "general": {"name": "Data"}, "children": [
                            {"type": "Tag", "general": {"name": "Freq", "address": "400020", "data_type": "Word"}}
                        ]}
                    ]
                }]
            }]
        }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_build_device_plans_groups_by_channel_device() {
        let plans = build_device_plans(&sample_project()).unwrap();
        assert_eq!(plans.len(), 1);
        let plan = &plans[0];
        assert_eq!(plan.config_id, "Channel1_Device1");
        assert_eq!(plan.tags.len(), 3);

        // Group members carry the group segment in their path.
        let paths: Vec<&str> = plan.tags.iter().map(|t| t.tree_path.as_str()).collect();
        assert!(paths.contains(&"Channel1.Device1.Probe"));
        assert!(paths.contains(&"Channel1.Device1.Setpoint"));
        assert!(paths.contains(&"Channel1.Device1.Data.Freq"));
    }

    #[test]
    fn test_build_device_plans_empty_project() {
        let plans = build_device_plans(&Project::default()).unwrap();
        assert!(plans.is_empty());
    }

    fn router_with_setpoint() -> (Arc<WriteRouter>, Arc<WriteQueue>, DataBuffer) {
        let plans = build_device_plans(&sample_project()).unwrap();
        let buffer = DataBuffer::new();
        let router = Arc::new(WriteRouter::new(buffer.clone()));
        let queue = Arc::new(WriteQueue::new("Channel1_Device1", 100));
        for tag in &plans[0].tags {
            router.register(Arc::clone(tag), Arc::clone(&queue), "Channel1_Device1");
        }
        (router, queue, buffer)
    }

    #[test]
    fn test_route_reverses_scaling_and_selects_fc16() {
        let (router, queue, buffer) = router_with_setpoint();

        assert!(router.route("Channel1.Device1.Setpoint", None, TagValue::Float(12.5)));
        let pending = queue.get_pending(10);
        assert_eq!(pending.len(), 1);
        // Float spans two registers, so FC16 regardless of func-06.
        assert_eq!(pending[0].function_code, 16);
        assert_eq!(pending[0].address, 9);
        // 12.5 scaled back through [0,1000] -> [0,100] is 125 raw.
        assert_eq!(pending[0].value, TagValue::Float(125.0));
        // The buffer reflects the written engineering value immediately.
        assert_eq!(
            buffer.get_value("Channel1.Device1.Setpoint"),
            Some(TagValue::Float(12.5))
        );
    }

    #[test]
    fn test_route_rejects_read_only_tags() {
        let (router, queue, _buffer) = router_with_setpoint();
        assert!(!router.route("Channel1.Device1.Probe", None, TagValue::UInt(1)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_route_unknown_path() {
        let (router, queue, _buffer) = router_with_setpoint();
        assert!(!router.route("Channel1.Device1.Nope", None, TagValue::UInt(1)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_route_array_element_adjusts_address() {
        let buffer = DataBuffer::new();
        let router = WriteRouter::new(buffer.clone());
        let queue = Arc::new(WriteQueue::new("cfg", 100));

        let (data_type, _) = crate::io::mapping::normalize_data_type("Float (Array)");
        let tag = Arc::new(MappedTag {
            tree_path: "Channel1.Device1.Block".into(),
            name: "Block".into(),
            description: String::new(),
            unit_id: 1,
            address_type: AddressType::HoldingRegister,
            address: 100,
            register_count: 10,
            data_type,
            array_len: Some(5),
            encoding: Default::default(),
            access: Access::ReadWrite,
            scan_ms: 1000,
            scaling: None,
            write_function_code: Some(16),
            raw_address: "400101 [5]".into(),
        });
        router.register(Arc::clone(&tag), Arc::clone(&queue), "cfg");

        assert!(router.route("Channel1.Device1.Block", Some(3), TagValue::Float(1.5)));
        let pending = queue.get_pending(10);
        // Element 3 of a 2-register type starts 6 registers in.
        assert_eq!(pending[0].address, 106);
        assert_eq!(pending[0].tag_info.data_type.is_array, false);
        assert_eq!(pending[0].tag_info.data_type.base, BaseType::Float32);
    }

    #[tokio::test]
    async fn test_monitor_start_stop_lifecycle() {
        let buffer = DataBuffer::new();
        let mut monitor = RuntimeMonitor::new(buffer.clone());

        monitor.start(&sample_project()).await.unwrap();
        assert!(monitor.is_running());
        assert_eq!(monitor.mapped_tags().len(), 3);
        // Static metadata registered up-front
        assert!(buffer
            .get_entry("Channel1.Device1.Probe")
            .is_none());

        monitor.stop().await;
        assert!(!monitor.is_running());
        assert!(buffer.is_empty());
        assert!(monitor.mapped_tags().is_empty());
    }

    #[tokio::test]
    async fn test_monitor_rejects_empty_project() {
        let mut monitor = RuntimeMonitor::new(DataBuffer::new());
        assert!(monitor.start(&Project::default()).await.is_err());
    }
}
