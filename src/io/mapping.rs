// src/io/mapping.rs
//
// Address parsing and tag canonicalisation.
//
// Converts project Tag/Device/Channel records into the canonical form the
// runtime works with: zero-based protocol offsets, a typed data type with a
// per-element register count, per-tag copies of the device encoding flags and
// a precomputed write function code. The protocol client only ever sees
// zero-based offsets; all 6-digit address arithmetic happens here.

use std::time::Duration;

use crate::io::scaling::Scaling;
use crate::io::scheduler::BlockSizes;
use crate::project::{
    flag, num_f64, num_u64, text, ChannelNode, DeviceNode, EncodingSection, Setting, TagNode,
};

// ============================================================================
// Address spaces
// ============================================================================

/// The four Modbus address spaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    Coil,
    DiscreteInput,
    HoldingRegister,
    InputRegister,
}

impl AddressType {
    /// Modbus read function code for this address space.
    pub fn read_function_code(&self) -> u8 {
        match self {
            AddressType::Coil => 1,
            AddressType::DiscreteInput => 2,
            AddressType::HoldingRegister => 3,
            AddressType::InputRegister => 4,
        }
    }

    /// Coils and discrete inputs address single bits.
    pub fn is_bit(&self) -> bool {
        matches!(self, AddressType::Coil | AddressType::DiscreteInput)
    }
}

/// 6-digit presentational ranges: (min, max, offset, type).
const ADDRESS_RANGES: [(u32, u32, u32, AddressType); 4] = [
    (1, 65536, 0, AddressType::Coil),
    (100_001, 165_536, 100_000, AddressType::DiscreteInput),
    (300_001, 365_536, 300_000, AddressType::InputRegister),
    (400_001, 465_536, 400_000, AddressType::HoldingRegister),
];

// ============================================================================
// Data types
// ============================================================================

/// Canonical scalar types. The project document uses dialog names (Word,
/// Short, DInt, LLong, ...); `normalize_data_type` folds them onto these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum BaseType {
    Bool,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Bcd,
    Lbcd,
    Str,
}

impl BaseType {
    /// Registers occupied by one element of this type.
    pub fn registers_per_element(&self) -> u16 {
        match self {
            BaseType::Bool | BaseType::UInt8 | BaseType::Int16 | BaseType::UInt16 => 1,
            BaseType::Bcd => 1,
            BaseType::Int32 | BaseType::UInt32 | BaseType::Float32 | BaseType::Lbcd => 2,
            BaseType::Float64 | BaseType::Int64 | BaseType::UInt64 => 4,
            BaseType::Str => 6,
        }
    }

    /// Integer-like types get rounded when reverse-scaling a written value.
    pub fn is_integer(&self) -> bool {
        !matches!(self, BaseType::Float32 | BaseType::Float64 | BaseType::Str)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct DataType {
    pub base: BaseType,
    pub is_array: bool,
}

impl DataType {
    pub fn scalar(base: BaseType) -> Self {
        Self {
            base,
            is_array: false,
        }
    }
}

/// Normalize a dialog data-type name to (canonical type, registers per
/// element). Unknown names fall back to UInt16, preserving the permissive
/// legacy behaviour.
pub fn normalize_data_type(name: &str) -> (DataType, u16) {
    let s = name.trim().to_ascii_lowercase();
    // `[N]` or the word "array" marks an array type; the element count itself
    // lives in the address suffix.
    let is_array = s.contains("array") || s.contains("[");

    let base = if s.contains("bool") {
        BaseType::Bool
    } else if s.contains("float64") || s.contains("double") {
        BaseType::Float64
    } else if s.contains("float") || s.contains("real") {
        BaseType::Float32
    } else if s.contains("qword") || s.contains("uint64") {
        BaseType::UInt64
    } else if s.contains("llong") || s.contains("int64") {
        BaseType::Int64
    } else if s.contains("dword") || s.contains("uint32") {
        BaseType::UInt32
    } else if s.contains("dint") || s.contains("int32") || s.contains("long") {
        BaseType::Int32
    } else if s.contains("lbcd") {
        BaseType::Lbcd
    } else if s.contains("bcd") {
        BaseType::Bcd
    } else if s.contains("string") {
        BaseType::Str
    } else if s.contains("byte") || s.contains("uint8") || s.contains("char") {
        BaseType::UInt8
    } else if s.contains("short") || s.contains("int16") {
        BaseType::Int16
    } else {
        // word, uint16, bare "int" and anything unrecognised
        BaseType::UInt16
    };

    let ty = DataType { base, is_array };
    (ty, base.registers_per_element())
}

// ============================================================================
// Encoding flags
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum ByteOrder {
    Big,
    Little,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum WordOrder {
    LowHigh,
    HighLow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum BitOrder {
    Lsb,
    Msb,
}

/// Per-device register encoding flags, copied onto every canonical tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Encoding {
    pub byte_order: ByteOrder,
    pub word_order: WordOrder,
    pub dword_order: WordOrder,
    pub bit_order: BitOrder,
    pub treat_longs_as_decimals: bool,
}

impl Default for Encoding {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::Big,
            word_order: WordOrder::LowHigh,
            dword_order: WordOrder::LowHigh,
            bit_order: BitOrder::Lsb,
            treat_longs_as_decimals: false,
        }
    }
}

impl Encoding {
    pub fn from_section(section: &EncodingSection) -> Self {
        Self {
            byte_order: parse_byte_order(&section.byte_order),
            word_order: parse_word_order(&section.word_order),
            dword_order: parse_word_order(&section.dword_order),
            bit_order: parse_bit_order(&section.bit_order),
            treat_longs_as_decimals: flag(&section.treat_longs_as_decimals, false),
        }
    }
}

/// Enable(1) = big-endian (Modbus network order), Disable(0) = little-endian.
fn parse_byte_order(setting: &Option<Setting>) -> ByteOrder {
    match setting {
        None => ByteOrder::Big,
        Some(v) => {
            let s = v.as_text().to_ascii_lowercase();
            if s == "0" || s.contains("disable") || s.contains("little") || s.contains("intel") {
                ByteOrder::Little
            } else {
                ByteOrder::Big
            }
        }
    }
}

/// 1 = first word/dword low, 0 = first word/dword high.
fn parse_word_order(setting: &Option<Setting>) -> WordOrder {
    match setting {
        None => WordOrder::LowHigh,
        Some(v) => {
            let s = v.as_text().to_ascii_lowercase();
            if s == "0" || s == "high_low" || s == "high-low" {
                WordOrder::HighLow
            } else {
                WordOrder::LowHigh
            }
        }
    }
}

/// 1 = MSB (Modicon bit order), 0 = LSB.
fn parse_bit_order(setting: &Option<Setting>) -> BitOrder {
    match setting {
        None => BitOrder::Lsb,
        Some(v) => {
            let s = v.as_text().to_ascii_lowercase();
            if s == "1" || s.contains("enable") || s.contains("msb") || s.contains("modicon") {
                BitOrder::Msb
            } else {
                BitOrder::Lsb
            }
        }
    }
}

// ============================================================================
// Device / channel runtime settings
// ============================================================================

#[derive(Clone, Debug)]
pub struct Timing {
    pub connect_timeout: Duration,
    pub connect_attempts: u32,
    pub request_timeout: Duration,
    pub attempts_before_timeout: u32,
    pub inter_request_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            connect_attempts: 1,
            request_timeout: Duration::from_millis(3000),
            attempts_before_timeout: 1,
            inter_request_delay: Duration::ZERO,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DataAccessFlags {
    pub zero_based: bool,
    pub zero_based_bit: bool,
    pub bit_writes: bool,
    pub func_06: bool,
    pub func_05: bool,
}

impl Default for DataAccessFlags {
    fn default() -> Self {
        Self {
            zero_based: true,
            zero_based_bit: true,
            bit_writes: false,
            func_06: true,
            func_05: true,
        }
    }
}

/// Runtime view of one Device node.
#[derive(Clone, Debug)]
pub struct DeviceSettings {
    pub name: String,
    pub unit_id: u8,
    pub timing: Timing,
    pub data_access: DataAccessFlags,
    pub encoding: Encoding,
    pub block_sizes: BlockSizes,
}

impl DeviceSettings {
    pub fn from_node(node: &DeviceNode) -> Result<Self, String> {
        let name = if node.general.name.is_empty() {
            "Device".to_string()
        } else {
            node.general.name.clone()
        };

        let unit_raw = node
            .general
            .device_id
            .as_ref()
            .and_then(|s| s.as_u64())
            .unwrap_or(1);
        // The wire carries a single unit byte; reject ids the transport
        // cannot express instead of silently truncating.
        let unit_id = u8::try_from(unit_raw)
            .map_err(|_| format!("Device '{}': unit id {} exceeds 255", name, unit_raw))?;
        if unit_id == 0 {
            return Err(format!("Device '{}': unit id must be >= 1", name));
        }

        let t = &node.timing;
        let timing = Timing {
            connect_timeout: Duration::from_secs_f64(num_f64(&t.connect_timeout, 3.0).max(0.0)),
            connect_attempts: num_u64(&t.connect_attempts, 1).max(1) as u32,
            request_timeout: Duration::from_millis(num_u64(&t.request_timeout, 3000)),
            attempts_before_timeout: num_u64(&t.attempts_before_timeout, 1).max(1) as u32,
            inter_request_delay: Duration::from_millis(num_u64(&t.inter_request_delay, 0)),
        };

        let defaults = DataAccessFlags::default();
        let da = &node.data_access;
        let data_access = DataAccessFlags {
            zero_based: flag(&da.zero_based, defaults.zero_based),
            zero_based_bit: flag(&da.zero_based_bit, defaults.zero_based_bit),
            bit_writes: flag(&da.bit_writes, defaults.bit_writes),
            func_06: flag(&da.func_06, defaults.func_06),
            func_05: flag(&da.func_05, defaults.func_05),
        };

        let b = &node.block_sizes;
        let block_sizes = BlockSizes {
            out_coils: num_u64(&b.out_coils, 2000).min(2000) as u16,
            in_coils: num_u64(&b.in_coils, 2000).min(2000) as u16,
            int_regs: num_u64(&b.int_regs, 120).min(125) as u16,
            hold_regs: num_u64(&b.hold_regs, 120).min(125) as u16,
        };

        Ok(Self {
            name,
            unit_id,
            timing,
            data_access,
            encoding: Encoding::from_section(&node.encoding),
            block_sizes,
        })
    }
}

/// Runtime view of one Channel node: the transport it binds.
#[derive(Clone, Debug)]
pub struct ChannelSettings {
    pub name: String,
    pub transport: crate::io::client::TransportConfig,
}

impl ChannelSettings {
    pub fn from_node(node: &ChannelNode) -> Result<Self, String> {
        use crate::io::client::TransportConfig;

        let name = if node.general.name.is_empty() {
            "Channel".to_string()
        } else {
            node.general.name.clone()
        };

        let kind = node.driver.kind.to_ascii_lowercase();
        let params = &node.driver.params;
        let comm = &node.communication;

        // TCP channels may carry their address only as the canonical
        // `network_adapter: "Name (IP)"` form.
        let adapter_ip = comm
            .network_adapter
            .as_ref()
            .map(|s| s.as_text())
            .and_then(|s| extract_adapter_ip(&s));
        let tcp_host = |default: &str| -> String {
            let fallback = adapter_ip.clone().unwrap_or_else(|| default.to_string());
            text(&params.ip, &text(&comm.ip, &fallback))
        };

        let transport = if kind.contains("rtu serial") {
            TransportConfig::RtuSerial {
                port: text(&comm.com, &text(&params.com, "COM1")),
                baud: num_u64(&comm.baud, num_u64(&params.baud, 9600)) as u32,
                data_bits: num_u64(&comm.data_bits, num_u64(&params.data_bits, 8)) as u8,
                parity: text(&comm.parity, &text(&params.parity, "None")),
                stop_bits: num_u64(&comm.stop, num_u64(&params.stop, 1)) as u8,
            }
        } else if kind.contains("rtu over tcp") {
            TransportConfig::RtuOverTcp {
                host: tcp_host("127.0.0.1"),
                port: num_u64(&params.port, num_u64(&comm.port, 502)) as u16,
            }
        } else {
            // Modbus TCP/IP Ethernet is the default driver
            TransportConfig::Tcp {
                host: tcp_host("127.0.0.1"),
                port: num_u64(&params.port, num_u64(&comm.port, 502)) as u16,
            }
        };

        Ok(Self { name, transport })
    }
}

/// Pull the IP out of the canonical `"Adapter Name (192.168.1.10)"` form.
fn extract_adapter_ip(adapter: &str) -> Option<String> {
    let open = adapter.rfind('(')?;
    let close = adapter[open..].find(')').map(|i| open + i)?;
    let ip = adapter[open + 1..close].trim();
    if ip.is_empty() {
        None
    } else {
        Some(ip.to_string())
    }
}

// ============================================================================
// Address parsing
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedAddress {
    pub address_type: AddressType,
    /// Zero-based protocol offset. Clients use this value as-is.
    pub offset: u16,
    /// Element count from a `[N]` suffix, if present.
    pub array_len: Option<usize>,
    pub raw: String,
}

/// Parse a 6-digit Modbus address string into its address space and
/// zero-based protocol offset.
///
/// Accepts bare numbers ("400001"), prefixed forms ("4:400001",
/// "holding:400001", "hr400001") and array suffixes ("400001 [5]", count kept
/// separately). The zero-based flags subtract one more from the computed
/// offset; `zero_based_bit` applies to coil/discrete addresses,
/// `zero_based_reg` to register addresses.
pub fn parse_address(
    raw: &str,
    zero_based_reg: bool,
    zero_based_bit: bool,
) -> Result<ParsedAddress, String> {
    let raw_trim = raw.trim();
    let lower = raw_trim.to_ascii_lowercase();

    // Array suffix `[N]` — strip it from the numeric part, keep the count.
    let (body, array_len) = split_array_suffix(&lower)?;

    let digits: String = body.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(format!("Invalid address '{}': no digits found", raw_trim));
    }

    // Explicit textual prefixes pin the address space.
    let forced_type = if body.starts_with("coil") || body.starts_with("c:") || body.starts_with("co")
    {
        Some(AddressType::Coil)
    } else if body.starts_with("discrete") || body.starts_with("di") {
        Some(AddressType::DiscreteInput)
    } else if body.starts_with("holding") || body.starts_with("hr") || body.starts_with("h:") {
        Some(AddressType::HoldingRegister)
    } else if body.starts_with("input") || body.starts_with("ir") {
        Some(AddressType::InputRegister)
    } else if let Some((prefix, _)) = body.split_once(':') {
        match prefix {
            "0" => Some(AddressType::Coil),
            "1" => Some(AddressType::DiscreteInput),
            "3" => Some(AddressType::InputRegister),
            "4" => Some(AddressType::HoldingRegister),
            _ => None,
        }
    } else {
        None
    };

    // For colon/textual forms the digits after the prefix carry the number.
    let number_str = if let Some((_, rest)) = body.split_once(':') {
        rest.chars().filter(|c| c.is_ascii_digit()).collect()
    } else {
        digits
    };
    let number: u64 = number_str
        .parse()
        .map_err(|_| format!("Invalid address '{}': bad number", raw_trim))?;

    let range = ADDRESS_RANGES
        .iter()
        .find(|(min, max, _, _)| (*min as u64) <= number && number <= (*max as u64));

    let (address_type, offset) = match (forced_type, range) {
        // An explicit prefix pins the space; the number must sit in that
        // space's range or the offset degrades to 0 (permissive legacy
        // behaviour).
        (Some(ty), Some((_, _, range_offset, range_type))) if ty == *range_type => {
            (ty, range_offset_for(number, *range_offset, ty, zero_based_reg, zero_based_bit, raw_trim)?)
        }
        (Some(ty), _) => (ty, 0),
        // Bare numbers take the type from the range table.
        (None, Some((_, _, range_offset, range_type))) => (
            *range_type,
            range_offset_for(
                number,
                *range_offset,
                *range_type,
                zero_based_reg,
                zero_based_bit,
                raw_trim,
            )?,
        ),
        // Address 0 is a coil.
        (None, None) if number == 0 => (AddressType::Coil, 0),
        // Fallback: holding register at offset 0, no error.
        (None, None) => (AddressType::HoldingRegister, 0),
    };

    Ok(ParsedAddress {
        address_type,
        offset,
        array_len,
        raw: raw_trim.to_string(),
    })
}

fn range_offset_for(
    number: u64,
    range_offset: u32,
    address_type: AddressType,
    zero_based_reg: bool,
    zero_based_bit: bool,
    raw: &str,
) -> Result<u16, String> {
    let zero_based = if address_type.is_bit() {
        zero_based_bit
    } else {
        zero_based_reg
    };
    let adjusted =
        (number as i64) - i64::from(range_offset) - if zero_based { 1 } else { 0 };
    let adjusted = adjusted.max(0);
    u16::try_from(adjusted)
        .map_err(|_| format!("Invalid address '{}': offset {} out of range", raw, adjusted))
}

fn split_array_suffix(s: &str) -> Result<(String, Option<usize>), String> {
    if let Some(open) = s.find('[') {
        let close = s[open..]
            .find(']')
            .map(|i| open + i)
            .ok_or_else(|| format!("Invalid address '{}': unterminated array suffix", s))?;
        let count_str = s[open + 1..close].trim();
        let count = if count_str.is_empty() {
            1
        } else {
            count_str
                .parse::<usize>()
                .map_err(|_| format!("Invalid address '{}': bad array length", s))?
        };
        if count == 0 {
            return Err(format!("Invalid address '{}': array length must be >= 1", s));
        }
        let mut body = String::new();
        body.push_str(&s[..open]);
        body.push_str(&s[close + 1..]);
        Ok((body.trim().to_string(), Some(count)))
    } else {
        Ok((s.to_string(), None))
    }
}

// ============================================================================
// Canonical tag
// ============================================================================

/// Access mode exposed through the buffer and the OPC UA node tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::ReadOnly => "Read Only",
            Access::ReadWrite => "Read/Write",
        }
    }
}

fn parse_access(s: &str) -> Access {
    let t = s.to_ascii_lowercase();
    if (t.contains("read") && t.contains("write")) || t.contains("r/w") || t == "rw" {
        Access::ReadWrite
    } else {
        Access::ReadOnly
    }
}

/// Canonical mapped tag — everything a worker needs to poll and decode one
/// data point, plus everything the write path needs to encode one.
#[derive(Clone, Debug)]
pub struct MappedTag {
    /// Dotted `Channel.Device[.Group...].Tag` path, the key used everywhere.
    pub tree_path: String,
    pub name: String,
    pub description: String,
    pub unit_id: u8,
    pub address_type: AddressType,
    /// Zero-based protocol offset.
    pub address: u16,
    /// Total registers (or bits for coil space) this tag spans.
    pub register_count: u16,
    pub data_type: DataType,
    /// Element count for array tags.
    pub array_len: Option<usize>,
    pub encoding: Encoding,
    pub access: Access,
    pub scan_ms: u64,
    pub scaling: Option<Scaling>,
    /// Preferred write function code; `None` for unwritable address spaces.
    pub write_function_code: Option<u8>,
    pub raw_address: String,
}

/// Write function code selection:
/// - Coil: FC5 when func-05 is enabled, else FC15.
/// - Holding register: FC16 whenever the type spans more than one register,
///   else FC6 when func-06 is enabled, else FC16.
/// - Discrete inputs and input registers are not writable.
pub fn select_write_function_code(
    address_type: AddressType,
    base: BaseType,
    access: &DataAccessFlags,
) -> Option<u8> {
    match address_type {
        AddressType::Coil => Some(if access.func_05 { 5 } else { 15 }),
        AddressType::HoldingRegister => {
            if base.registers_per_element() > 1 {
                Some(16)
            } else if access.func_06 {
                Some(6)
            } else {
                Some(16)
            }
        }
        AddressType::DiscreteInput | AddressType::InputRegister => None,
    }
}

/// Map one project Tag under its parent Device to canonical form.
pub fn map_tag(tag: &TagNode, device: &DeviceSettings, tree_path: &str) -> Result<MappedTag, String> {
    let general = &tag.general;
    let (data_type, regs_per_element) = normalize_data_type(&general.data_type);

    let parsed = parse_address(
        &general.address,
        device.data_access.zero_based,
        device.data_access.zero_based_bit,
    )
    .map_err(|e| format!("Tag '{}': {}", tree_path, e))?;

    // The `[N]` suffix on the address carries the element count; the data
    // type only says whether the tag is an array.
    let array_len = if data_type.is_array {
        Some(parsed.array_len.unwrap_or(1))
    } else {
        None
    };
    let elements = array_len.unwrap_or(1) as u16;
    let register_count = regs_per_element
        .checked_mul(elements)
        .ok_or_else(|| format!("Tag '{}': register span overflows", tree_path))?;

    let scaling = Scaling::from_section(tag.scaling.as_ref())
        .map_err(|e| format!("Tag '{}': {}", tree_path, e))?;

    let scan_ms = general
        .scan_rate
        .as_ref()
        .and_then(|s| s.as_u64())
        .unwrap_or(1000)
        .max(10);

    Ok(MappedTag {
        tree_path: tree_path.to_string(),
        name: general.name.clone(),
        description: general.description.clone(),
        unit_id: device.unit_id,
        address_type: parsed.address_type,
        address: parsed.offset,
        register_count,
        data_type,
        array_len,
        encoding: device.encoding,
        access: parse_access(&general.access),
        scan_ms,
        scaling,
        write_function_code: select_write_function_code(
            parsed.address_type,
            data_type.base,
            &device.data_access,
        ),
        raw_address: parsed.raw,
    })
}

// ============================================================================
// Tests
// ============================================================================
