// src/io/codec.rs
//
// Register-level codec: converts between raw Modbus register bytes and typed
// values across byte order, word order, dword order and Modicon bit order,
// including the packed-decimal mode for 64-bit integers.
//
// Wire convention: register payloads arrive as 2 bytes per register in
// network order (big-endian per register, the form tokio-modbus register
// values serialize to). Decoding first normalises the buffer to plain
// big-endian via a per-type transform, then interprets it; encoding runs the
// same transform on the big-endian serialisation of the value. The transform
// is composed of mutually commuting involutions, so one function serves both
// directions and round-trips are exact.

use crate::io::mapping::{BaseType, BitOrder, ByteOrder, DataType, Encoding, WordOrder};
use crate::io::TagValue;

// ============================================================================
// Buffer transforms
// ============================================================================

/// Reverse the bit positions within a 16-bit register (Modicon bit order).
fn reverse_bits16(value: u16) -> u16 {
    value.reverse_bits()
}

/// Normalise a device-order buffer to big-endian (or the reverse — the
/// transform is an involution). `raw` length must be 2, 4 or 8 bytes.
fn transform_buffer(raw: &[u8], enc: &Encoding) -> Vec<u8> {
    let mut words: Vec<[u8; 2]> = raw.chunks(2).map(|c| [c[0], c[1]]).collect();

    if enc.byte_order == ByteOrder::Little {
        for w in words.iter_mut() {
            w.swap(0, 1);
        }
    }

    match words.len() {
        2 => {
            // 32-bit: device [low, high] with word-order low-high; the
            // internal form wants [high, low].
            if enc.word_order == WordOrder::LowHigh {
                words.swap(0, 1);
            }
        }
        4 => {
            // 64-bit: word order applies within each dword pair, dword order
            // across the two dwords.
            if enc.word_order == WordOrder::LowHigh {
                words.swap(0, 1);
                words.swap(2, 3);
            }
            if enc.dword_order == WordOrder::LowHigh {
                let (a, b) = (words[0], words[1]);
                words[0] = words[2];
                words[1] = words[3];
                words[2] = a;
                words[3] = b;
            }
        }
        _ => {}
    }

    if enc.bit_order == BitOrder::Msb {
        for w in words.iter_mut() {
            let v = reverse_bits16(u16::from_be_bytes(*w));
            *w = v.to_be_bytes();
        }
    }

    words.concat()
}

/// Strings only honour the per-register byte swap; word reordering is a
/// 32/64-bit concept.
fn transform_string_buffer(raw: &[u8], enc: &Encoding) -> Vec<u8> {
    let mut out = raw.to_vec();
    if enc.byte_order == ByteOrder::Little {
        for chunk in out.chunks_mut(2) {
            if chunk.len() == 2 {
                chunk.swap(0, 1);
            }
        }
    }
    out
}

// ============================================================================
// BCD helpers
// ============================================================================

fn bcd_decode(value: u64, digits: u32) -> Option<u64> {
    let mut out: u64 = 0;
    let mut scale: u64 = 1;
    for i in 0..digits {
        let nibble = (value >> (4 * i)) & 0xF;
        if nibble > 9 {
            return None;
        }
        out += nibble * scale;
        scale *= 10;
    }
    Some(out)
}

fn bcd_encode(value: u64, digits: u32) -> Option<u64> {
    let max: u64 = 10u64.pow(digits) - 1;
    if value > max {
        return None;
    }
    let mut out: u64 = 0;
    let mut v = value;
    for i in 0..digits {
        out |= (v % 10) << (4 * i);
        v /= 10;
    }
    Some(out)
}

// ============================================================================
// Decode
// ============================================================================

/// Decode one scalar of `base` from the front of `raw`. Returns `Null` when
/// the buffer is shorter than the element needs.
pub fn decode_scalar(raw: &[u8], base: BaseType, enc: &Encoding) -> TagValue {
    let need = base.registers_per_element() as usize * 2;
    if raw.len() < need {
        return TagValue::Null;
    }
    let raw = &raw[..need];

    if base == BaseType::Str {
        let b = transform_string_buffer(raw, enc);
        let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
        return match std::str::from_utf8(&b[..end]) {
            Ok(s) => TagValue::Text(s.trim_end().to_string()),
            Err(_) => TagValue::Null,
        };
    }

    let b = transform_buffer(raw, enc);
    match base {
        BaseType::Bool => TagValue::Bool(u16::from_be_bytes([b[0], b[1]]) != 0),
        BaseType::UInt8 => TagValue::UInt(u64::from(u16::from_be_bytes([b[0], b[1]]) & 0xFF)),
        BaseType::Int16 => TagValue::Int(i64::from(i16::from_be_bytes([b[0], b[1]]))),
        BaseType::UInt16 => TagValue::UInt(u64::from(u16::from_be_bytes([b[0], b[1]]))),
        BaseType::Bcd => match bcd_decode(u64::from(u16::from_be_bytes([b[0], b[1]])), 4) {
            Some(v) => TagValue::UInt(v),
            None => TagValue::Null,
        },
        BaseType::Int32 => {
            TagValue::Int(i64::from(i32::from_be_bytes([b[0], b[1], b[2], b[3]])))
        }
        BaseType::UInt32 => {
            TagValue::UInt(u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]])))
        }
        BaseType::Float32 => {
            TagValue::Float(f64::from(f32::from_be_bytes([b[0], b[1], b[2], b[3]])))
        }
        BaseType::Lbcd => {
            match bcd_decode(u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]])), 8) {
                Some(v) => TagValue::UInt(v),
                None => TagValue::Null,
            }
        }
        BaseType::Int64 | BaseType::UInt64 if enc.treat_longs_as_decimals => {
            // Packed decimal: lanes [0, high, 0, low], value = high * 10000 + low.
            let high = u64::from(u16::from_be_bytes([b[2], b[3]]));
            let low = u64::from(u16::from_be_bytes([b[6], b[7]]));
            TagValue::UInt(high * 10_000 + low)
        }
        BaseType::Int64 => {
            let v = i64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
            TagValue::Int(v)
        }
        BaseType::UInt64 => {
            let v = u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
            TagValue::UInt(v)
        }
        BaseType::Float64 => {
            let v = f64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
            TagValue::Float(v)
        }
        BaseType::Str => unreachable!(),
    }
}

/// Decode a register payload for a tag. Array tags consume exactly
/// `array_len * registers_per_element` registers and always yield
/// `array_len` elements; elements past the end of the payload are `Null`.
pub fn decode_registers(
    raw: &[u8],
    ty: DataType,
    array_len: Option<usize>,
    enc: &Encoding,
) -> TagValue {
    if ty.is_array {
        let n = array_len.unwrap_or(1);
        let elem_bytes = ty.base.registers_per_element() as usize * 2;
        let elements = (0..n)
            .map(|i| {
                let start = i * elem_bytes;
                if start >= raw.len() {
                    TagValue::Null
                } else {
                    decode_scalar(&raw[start..], ty.base, enc)
                }
            })
            .collect();
        TagValue::Array(elements)
    } else {
        decode_scalar(raw, ty.base, enc)
    }
}

// ============================================================================
// Encode
// ============================================================================

fn to_i64(value: &TagValue) -> Result<i64, String> {
    match value {
        TagValue::Bool(b) => Ok(i64::from(*b)),
        TagValue::Int(v) => Ok(*v),
        TagValue::UInt(v) => i64::try_from(*v).map_err(|_| format!("value {} out of range", v)),
        TagValue::Float(v) => Ok(v.round() as i64),
        other => Err(format!("cannot encode {:?} as integer", other)),
    }
}

fn to_u64(value: &TagValue) -> Result<u64, String> {
    match value {
        TagValue::Bool(b) => Ok(u64::from(*b)),
        TagValue::Int(v) => u64::try_from(*v).map_err(|_| format!("value {} out of range", v)),
        TagValue::UInt(v) => Ok(*v),
        TagValue::Float(v) => {
            let r = v.round();
            if r < 0.0 {
                Err(format!("value {} out of range", v))
            } else {
                Ok(r as u64)
            }
        }
        other => Err(format!("cannot encode {:?} as integer", other)),
    }
}

fn to_f64(value: &TagValue) -> Result<f64, String> {
    value
        .as_f64()
        .ok_or_else(|| format!("cannot encode {:?} as number", value))
}

/// Encode one scalar to its big-endian internal byte form.
fn encode_internal(value: &TagValue, base: BaseType, enc: &Encoding) -> Result<Vec<u8>, String> {
    let bytes = match base {
        BaseType::Bool => {
            let b = value
                .as_bool()
                .ok_or_else(|| format!("cannot encode {:?} as boolean", value))?;
            (u16::from(b)).to_be_bytes().to_vec()
        }
        BaseType::UInt8 => {
            let v = to_u64(value)?;
            if v > 0xFF {
                return Err(format!("value {} exceeds byte range", v));
            }
            (v as u16).to_be_bytes().to_vec()
        }
        BaseType::Int16 => {
            let v = to_i64(value)?;
            i16::try_from(v)
                .map_err(|_| format!("value {} exceeds int16 range", v))?
                .to_be_bytes()
                .to_vec()
        }
        BaseType::UInt16 => {
            let v = to_u64(value)?;
            u16::try_from(v)
                .map_err(|_| format!("value {} exceeds word range", v))?
                .to_be_bytes()
                .to_vec()
        }
        BaseType::Bcd => {
            let v = to_u64(value)?;
            let packed =
                bcd_encode(v, 4).ok_or_else(|| format!("value {} exceeds BCD range", v))?;
            (packed as u16).to_be_bytes().to_vec()
        }
        BaseType::Int32 => {
            let v = to_i64(value)?;
            i32::try_from(v)
                .map_err(|_| format!("value {} exceeds long range", v))?
                .to_be_bytes()
                .to_vec()
        }
        BaseType::UInt32 => {
            let v = to_u64(value)?;
            u32::try_from(v)
                .map_err(|_| format!("value {} exceeds dword range", v))?
                .to_be_bytes()
                .to_vec()
        }
        BaseType::Float32 => ((to_f64(value)? as f32).to_be_bytes()).to_vec(),
        BaseType::Lbcd => {
            let v = to_u64(value)?;
            let packed =
                bcd_encode(v, 8).ok_or_else(|| format!("value {} exceeds LBCD range", v))?;
            (packed as u32).to_be_bytes().to_vec()
        }
        BaseType::Int64 | BaseType::UInt64 if enc.treat_longs_as_decimals => {
            let v = to_u64(value)?.min(99_999_999);
            let high = (v / 10_000) as u16;
            let low = (v % 10_000) as u16;
            let mut out = Vec::with_capacity(8);
            out.extend_from_slice(&0u16.to_be_bytes());
            out.extend_from_slice(&high.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes());
            out.extend_from_slice(&low.to_be_bytes());
            out
        }
        BaseType::Int64 => to_i64(value)?.to_be_bytes().to_vec(),
        BaseType::UInt64 => to_u64(value)?.to_be_bytes().to_vec(),
        BaseType::Float64 => to_f64(value)?.to_be_bytes().to_vec(),
        BaseType::Str => {
            let s = match value {
                TagValue::Text(s) => s.clone(),
                other => return Err(format!("cannot encode {:?} as string", other)),
            };
            let mut b = s.into_bytes();
            b.truncate(12);
            b.resize(12, 0);
            b
        }
    };
    Ok(bytes)
}

/// Encode one scalar into device-order registers.
pub fn encode_scalar(value: &TagValue, base: BaseType, enc: &Encoding) -> Result<Vec<u16>, String> {
    let internal = encode_internal(value, base, enc)?;
    let device = if base == BaseType::Str {
        transform_string_buffer(&internal, enc)
    } else {
        transform_buffer(&internal, enc)
    };
    Ok(device
        .chunks(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect())
}

/// Encode a tag value (scalar or array) into device-order registers.
pub fn encode_registers(
    value: &TagValue,
    ty: DataType,
    enc: &Encoding,
) -> Result<Vec<u16>, String> {
    match (ty.is_array, value) {
        (true, TagValue::Array(elements)) => {
            let mut regs = Vec::new();
            for element in elements {
                regs.extend(encode_scalar(element, ty.base, enc)?);
            }
            Ok(regs)
        }
        (true, scalar) => encode_scalar(scalar, ty.base, enc),
        (false, TagValue::Array(_)) => Err("scalar tag cannot take an array value".to_string()),
        (false, scalar) => encode_scalar(scalar, ty.base, enc),
    }
}

// ============================================================================
// Tests
// ============================================================================
