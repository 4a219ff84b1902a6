// src/io/scheduler.rs
//
// Groups due tags into contiguous read batches per (unit, address space).
// Adjacent and near-adjacent tags merge into one request as long as the total
// register span stays within the block-size limit for that address space —
// small gaps cost a few unused registers but save a request.

use std::collections::HashMap;
use std::sync::Arc;

use crate::io::mapping::{AddressType, MappedTag};

/// Per-address-space read limits from the device's block-size settings.
#[derive(Clone, Copy, Debug)]
pub struct BlockSizes {
    /// Max coils per FC01 read.
    pub out_coils: u16,
    /// Max discrete inputs per FC02 read.
    pub in_coils: u16,
    /// Max input registers per FC04 read.
    pub int_regs: u16,
    /// Max holding registers per FC03 read.
    pub hold_regs: u16,
}

impl Default for BlockSizes {
    fn default() -> Self {
        Self {
            out_coils: 2000,
            in_coils: 2000,
            int_regs: 120,
            hold_regs: 120,
        }
    }
}

impl BlockSizes {
    pub fn limit_for(&self, address_type: AddressType) -> u16 {
        match address_type {
            AddressType::Coil => self.out_coils,
            AddressType::DiscreteInput => self.in_coils,
            AddressType::InputRegister => self.int_regs,
            AddressType::HoldingRegister => self.hold_regs,
        }
    }
}

/// One grouped read request.
#[derive(Clone, Debug)]
pub struct ReadBatch {
    pub address_type: AddressType,
    pub unit_id: u8,
    pub start: u16,
    pub count: u16,
    pub tags: Vec<Arc<MappedTag>>,
    pub function_code: u8,
}

/// Group due tags into read batches. Tags are bucketed by
/// (unit, address space), sorted by start address and merged greedily while
/// the overall span `end - start + 1` stays within the bucket's limit.
pub fn group_reads(tags: &[Arc<MappedTag>], limits: &BlockSizes) -> Vec<ReadBatch> {
    let mut buckets: HashMap<(u8, AddressType), Vec<Arc<MappedTag>>> = HashMap::new();
    for tag in tags {
        buckets
            .entry((tag.unit_id, tag.address_type))
            .or_default()
            .push(Arc::clone(tag));
    }

    // Deterministic batch order across runs.
    let mut keys: Vec<(u8, AddressType)> = buckets.keys().copied().collect();
    keys.sort_by_key(|(unit, ty)| (*unit, ty.read_function_code()));

    let mut batches = Vec::new();
    for key in keys {
        let mut items = buckets.remove(&key).unwrap_or_default();
        items.sort_by_key(|t| t.address);
        let (unit_id, address_type) = key;
        let max_span = limits.limit_for(address_type).max(1) as u32;

        let mut i = 0;
        while i < items.len() {
            let start = items[i].address;
            let mut end = span_end(&items[i]);
            let mut batch_tags = vec![Arc::clone(&items[i])];

            let mut j = i + 1;
            while j < items.len() {
                let t = &items[j];
                let t_end = span_end(t);
                let span = u32::from(t_end.max(end)) - u32::from(start) + 1;
                if span <= max_span {
                    end = end.max(t_end);
                    batch_tags.push(Arc::clone(t));
                    j += 1;
                } else {
                    break;
                }
            }

            batches.push(ReadBatch {
                address_type,
                unit_id,
                start,
                count: (u32::from(end) - u32::from(start) + 1) as u16,
                tags: batch_tags,
                function_code: address_type.read_function_code(),
            });
            i = j;
        }
    }
    batches
}

fn span_end(tag: &MappedTag) -> u16 {
    tag.address + tag.register_count.max(1) - 1
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::mapping::{
        normalize_data_type, Access, AddressType, Encoding, MappedTag,
    };

    fn tag(name: &str, unit: u8, address_type: AddressType, address: u16, count: u16) -> Arc<MappedTag> {
        let (data_type, _) = normalize_data_type("Word");
        Arc::new(MappedTag {
            tree_path: format!("Channel1.Device{}.{}", unit, name),
            name: name.to_string(),
            description: String::new(),
            unit_id: unit,
            address_type,
            address,
            register_count: count,
            data_type,
            array_len: None,
            encoding: Encoding::default(),
            access: Access::ReadOnly,
            scan_ms: 1000,
            scaling: None,
            write_function_code: Some(6),
            raw_address: String::new(),
        })
    }

    fn limits(max: u16) -> BlockSizes {
        BlockSizes {
            out_coils: max,
            in_coils: max,
            int_regs: max,
            hold_regs: max,
        }
    }

    #[test]
    fn test_contiguous_tags_merge() {
        let tags = vec![
            tag("T1", 1, AddressType::HoldingRegister, 0, 2),
            tag("T2", 1, AddressType::HoldingRegister, 2, 2),
            tag("T3", 1, AddressType::HoldingRegister, 10, 1),
            tag("C1", 2, AddressType::Coil, 0, 1),
        ];
        let batches = group_reads(&tags, &limits(10));
        assert_eq!(batches.len(), 3);

        // Unit 1 holding registers: T1+T2 merge, T3 rides along inside the
        // 10-register span (0..=10 would be 11, so T3 is its own batch).
        let b0 = &batches[0];
        assert_eq!(b0.unit_id, 1);
        assert_eq!(b0.start, 0);
        assert_eq!(b0.count, 4);
        assert_eq!(b0.tags.len(), 2);
        assert_eq!(b0.function_code, 3);

        let b1 = &batches[1];
        assert_eq!(b1.start, 10);
        assert_eq!(b1.count, 1);

        let b2 = &batches[2];
        assert_eq!(b2.unit_id, 2);
        assert_eq!(b2.function_code, 1);
    }

    #[test]
    fn test_gap_merges_within_span() {
        // Gap between 0..2 and 8..9 fits in a 10-register span.
        let tags = vec![
            tag("A", 1, AddressType::HoldingRegister, 0, 2),
            tag("B", 1, AddressType::HoldingRegister, 8, 2),
        ];
        let batches = group_reads(&tags, &limits(10));
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].start, 0);
        assert_eq!(batches[0].count, 10);
        assert_eq!(batches[0].tags.len(), 2);
    }

    #[test]
    fn test_span_limit_enforced() {
        let tags = vec![
            tag("A", 1, AddressType::HoldingRegister, 0, 2),
            tag("B", 1, AddressType::HoldingRegister, 119, 2),
        ];
        let batches = group_reads(&tags, &limits(120));
        // 0..=120 is 121 registers, over the limit
        assert_eq!(batches.len(), 2);
        for batch in &batches {
            assert!(batch.count <= 120, "batch span {} over limit", batch.count);
        }
    }

    #[test]
    fn test_buckets_by_unit_and_space() {
        let tags = vec![
            tag("H", 1, AddressType::HoldingRegister, 0, 1),
            tag("I", 1, AddressType::InputRegister, 0, 1),
            tag("H2", 2, AddressType::HoldingRegister, 0, 1),
        ];
        let batches = group_reads(&tags, &limits(120));
        assert_eq!(batches.len(), 3);
    }

    #[test]
    fn test_coil_limit_independent_of_register_limit() {
        let mut block_sizes = limits(16);
        block_sizes.out_coils = 2000;
        let tags = vec![
            tag("C1", 1, AddressType::Coil, 0, 1),
            tag("C2", 1, AddressType::Coil, 500, 1),
        ];
        let batches = group_reads(&tags, &block_sizes);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].count, 501);
    }

    #[test]
    fn test_empty_input() {
        assert!(group_reads(&[], &BlockSizes::default()).is_empty());
    }
}
