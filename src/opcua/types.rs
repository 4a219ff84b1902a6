// src/opcua/types.rs
//
// Mapping between gateway data types / values and OPC UA variant types.
// When a tag carries scaling, the node exposes the scaled engineering type;
// otherwise the raw Modbus type decides the variant.

use opcua::types::{DataTypeId, Variant};

use crate::io::mapping::{BaseType, MappedTag};
use crate::io::TagValue;

/// The variant family a node stores. Collapses the gateway types onto the
/// OPC UA scalar types used by the node tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeValueKind {
    Boolean,
    Byte,
    Int16,
    UInt16,
    Int32,
    Int64,
    Float,
    Double,
    Text,
}

impl NodeValueKind {
    pub fn data_type_id(&self) -> DataTypeId {
        match self {
            NodeValueKind::Boolean => DataTypeId::Boolean,
            NodeValueKind::Byte => DataTypeId::Byte,
            NodeValueKind::Int16 => DataTypeId::Int16,
            NodeValueKind::UInt16 => DataTypeId::UInt16,
            NodeValueKind::Int32 => DataTypeId::Int32,
            NodeValueKind::Int64 => DataTypeId::Int64,
            NodeValueKind::Float => DataTypeId::Float,
            NodeValueKind::Double => DataTypeId::Double,
            NodeValueKind::Text => DataTypeId::String,
        }
    }

    /// Type-zero default, used for initial node values and for missing array
    /// indices during aggregation.
    pub fn zero(&self) -> Variant {
        match self {
            NodeValueKind::Boolean => Variant::from(false),
            NodeValueKind::Byte => Variant::from(0u8),
            NodeValueKind::Int16 => Variant::from(0i16),
            NodeValueKind::UInt16 => Variant::from(0u16),
            NodeValueKind::Int32 => Variant::from(0i32),
            NodeValueKind::Int64 => Variant::from(0i64),
            NodeValueKind::Float => Variant::from(0f32),
            NodeValueKind::Double => Variant::from(0f64),
            NodeValueKind::Text => Variant::from(String::new()),
        }
    }

    /// Coerce a buffered value into this node's variant type. Floats are
    /// promoted or truncated to fit integer nodes; `Null` coerces to zero.
    pub fn scalar_variant(&self, value: &TagValue) -> Variant {
        match self {
            NodeValueKind::Boolean => Variant::from(value.as_bool().unwrap_or(false)),
            NodeValueKind::Byte => Variant::from(value.as_f64().map(|v| v.round() as u8).unwrap_or(0)),
            NodeValueKind::Int16 => {
                Variant::from(value.as_f64().map(|v| v.round() as i16).unwrap_or(0))
            }
            NodeValueKind::UInt16 => {
                Variant::from(value.as_f64().map(|v| v.round() as u16).unwrap_or(0))
            }
            NodeValueKind::Int32 => {
                Variant::from(value.as_f64().map(|v| v.round() as i32).unwrap_or(0))
            }
            NodeValueKind::Int64 => Variant::from(match value {
                TagValue::Int(v) => *v,
                TagValue::UInt(v) => *v as i64,
                other => other.as_f64().map(|v| v.round() as i64).unwrap_or(0),
            }),
            NodeValueKind::Float => {
                Variant::from(value.as_f64().map(|v| v as f32).unwrap_or(0.0))
            }
            NodeValueKind::Double => Variant::from(value.as_f64().unwrap_or(0.0)),
            NodeValueKind::Text => Variant::from(match value {
                TagValue::Text(s) => s.clone(),
                other => other
                    .as_f64()
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            }),
        }
    }

    /// Build an array variant from aggregated element values; `Null` slots
    /// become type-zero.
    pub fn array_variant(&self, values: &[TagValue]) -> Variant {
        match self {
            NodeValueKind::Boolean => Variant::from(
                values
                    .iter()
                    .map(|v| v.as_bool().unwrap_or(false))
                    .collect::<Vec<bool>>(),
            ),
            NodeValueKind::Byte => Variant::from(
                values
                    .iter()
                    .map(|v| v.as_f64().map(|x| x.round() as u8).unwrap_or(0))
                    .collect::<Vec<u8>>(),
            ),
            NodeValueKind::Int16 => Variant::from(
                values
                    .iter()
                    .map(|v| v.as_f64().map(|x| x.round() as i16).unwrap_or(0))
                    .collect::<Vec<i16>>(),
            ),
            NodeValueKind::UInt16 => Variant::from(
                values
                    .iter()
                    .map(|v| v.as_f64().map(|x| x.round() as u16).unwrap_or(0))
                    .collect::<Vec<u16>>(),
            ),
            NodeValueKind::Int32 => Variant::from(
                values
                    .iter()
                    .map(|v| v.as_f64().map(|x| x.round() as i32).unwrap_or(0))
                    .collect::<Vec<i32>>(),
            ),
            NodeValueKind::Int64 => Variant::from(
                values
                    .iter()
                    .map(|v| match v {
                        TagValue::Int(x) => *x,
                        TagValue::UInt(x) => *x as i64,
                        other => other.as_f64().map(|x| x.round() as i64).unwrap_or(0),
                    })
                    .collect::<Vec<i64>>(),
            ),
            NodeValueKind::Float => Variant::from(
                values
                    .iter()
                    .map(|v| v.as_f64().map(|x| x as f32).unwrap_or(0.0))
                    .collect::<Vec<f32>>(),
            ),
            NodeValueKind::Double => Variant::from(
                values
                    .iter()
                    .map(|v| v.as_f64().unwrap_or(0.0))
                    .collect::<Vec<f64>>(),
            ),
            NodeValueKind::Text => Variant::from(
                values
                    .iter()
                    .map(|v| match v {
                        TagValue::Text(s) => s.clone(),
                        other => other.as_f64().map(|x| x.to_string()).unwrap_or_default(),
                    })
                    .collect::<Vec<String>>(),
            ),
        }
    }
}

/// Variant family for a raw Modbus type.
pub fn kind_for_base(base: BaseType) -> NodeValueKind {
    match base {
        BaseType::Bool => NodeValueKind::Boolean,
        BaseType::UInt8 => NodeValueKind::Byte,
        BaseType::Int16 => NodeValueKind::Int16,
        BaseType::UInt16 | BaseType::Bcd => NodeValueKind::UInt16,
        BaseType::Int32 | BaseType::UInt32 | BaseType::Lbcd => NodeValueKind::Int32,
        BaseType::Int64 | BaseType::UInt64 => NodeValueKind::Int64,
        BaseType::Float32 => NodeValueKind::Float,
        BaseType::Float64 => NodeValueKind::Double,
        BaseType::Str => NodeValueKind::Text,
    }
}

/// Variant family for a dialog type name ("Float", "Double", "Int32", ...).
/// Used for the scaled engineering type of a scaled tag.
pub fn kind_for_name(name: &str) -> NodeValueKind {
    let s = name.to_ascii_lowercase();
    if s.contains("bool") {
        NodeValueKind::Boolean
    } else if s.contains("byte") || s.contains("uint8") || s.contains("char") {
        NodeValueKind::Byte
    } else if s.contains("short") || s.contains("int16") {
        NodeValueKind::Int16
    } else if s.contains("llong") || s.contains("int64") || s.contains("qword") || s.contains("uint64") {
        NodeValueKind::Int64
    } else if s.contains("long") || s.contains("int32") || s.contains("dword") || s.contains("uint32") {
        NodeValueKind::Int32
    } else if s.contains("double") {
        NodeValueKind::Double
    } else if s.contains("float") || s.contains("real") {
        NodeValueKind::Float
    } else if s.contains("string") {
        NodeValueKind::Text
    } else if s.contains("word") || s.contains("uint16") || s.contains("int") {
        NodeValueKind::UInt16
    } else {
        NodeValueKind::Double
    }
}

/// Variant family for a tag: the scaled type when scaling is enabled,
/// otherwise the raw type.
pub fn kind_for_tag(tag: &MappedTag) -> NodeValueKind {
    match &tag.scaling {
        Some(scaling) => match &scaling.scaled_type {
            Some(name) => kind_for_name(name),
            // Scaling always yields floats; default the node to Double when
            // no explicit scaled type is configured.
            None => NodeValueKind::Double,
        },
        None => kind_for_base(tag.data_type.base),
    }
}

/// Convert an OPC UA variant written by a client into a gateway value.
pub fn variant_to_tag_value(variant: &Variant) -> TagValue {
    match variant {
        Variant::Boolean(b) => TagValue::Bool(*b),
        Variant::Byte(v) => TagValue::UInt(u64::from(*v)),
        Variant::SByte(v) => TagValue::Int(i64::from(*v)),
        Variant::Int16(v) => TagValue::Int(i64::from(*v)),
        Variant::UInt16(v) => TagValue::UInt(u64::from(*v)),
        Variant::Int32(v) => TagValue::Int(i64::from(*v)),
        Variant::UInt32(v) => TagValue::UInt(u64::from(*v)),
        Variant::Int64(v) => TagValue::Int(*v),
        Variant::UInt64(v) => TagValue::UInt(*v),
        Variant::Float(v) => TagValue::Float(f64::from(*v)),
        Variant::Double(v) => TagValue::Float(*v),
        Variant::String(s) => TagValue::Text(s.to_string()),
        Variant::Array(array) => TagValue::Array(
            array
                .values
                .iter()
                .map(variant_to_tag_value)
                .collect(),
        ),
        _ => TagValue::Null,
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
    use std::sync::Arc;

    fn tag_with(data_type: &str, scaled_type: Option<&str>) -> Arc<MappedTag> {
        let (ty, regs) = normalize_data_type(data_type);
        let scaling = scaled_type.map(|st| Scaling {
            kind: ScalingKind::Linear,
            raw_low: 0.0,
            raw_high: 1000.0,
            scaled_low: 0.0,
            scaled_high: 100.0,
            clamp_low: false,
            clamp_high: false,
            negate: false,
            scaled_type: if st.is_empty() {
                None
            } else {
                Some(st.to_string())
            },
            units: String::new(),
        });
        Arc::new(MappedTag {
            tree_path: "Channel1.Device1.T".into(),
            name: "T".into(),
            description: String::new(),
            unit_id: 1,
            address_type: AddressType::HoldingRegister,
            address: 0,
            register_count: regs,
            data_type: ty,
            array_len: None,
            encoding: Encoding::default(),
            access: Access::ReadOnly,
            scan_ms: 1000,
            scaling,
            write_function_code: Some(16),
            raw_address: String::new(),
        })
    }

    #[test]
    fn test_kind_for_base_mapping() {
        assert_eq!(kind_for_base(BaseType::Bool), NodeValueKind::Boolean);
        assert_eq!(kind_for_base(BaseType::UInt16), NodeValueKind::UInt16);
        assert_eq!(kind_for_base(BaseType::Int32), NodeValueKind::Int32);
        assert_eq!(kind_for_base(BaseType::UInt32), NodeValueKind::Int32);
        assert_eq!(kind_for_base(BaseType::UInt64), NodeValueKind::Int64);
        assert_eq!(kind_for_base(BaseType::Float32), NodeValueKind::Float);
        assert_eq!(kind_for_base(BaseType::Float64), NodeValueKind::Double);
        assert_eq!(kind_for_base(BaseType::Str), NodeValueKind::Text);
    }

    #[test]
    fn test_kind_for_tag_prefers_scaled_type() {
        // Raw Word with Float scaling exposes a Float node
        let tag = tag_with("Word", Some("Float"));
        assert_eq!(kind_for_tag(&tag), NodeValueKind::Float);
        // Scaling without an explicit target defaults to Double
        let tag = tag_with("Word", Some(""));
        assert_eq!(kind_for_tag(&tag), NodeValueKind::Double);
        // No scaling: raw type decides
        let tag = tag_with("Word", None);
        assert_eq!(kind_for_tag(&tag), NodeValueKind::UInt16);
    }

    #[test]
    fn test_scalar_variant_coercion() {
        let v = NodeValueKind::Float.scalar_variant(&TagValue::Float(50.0));
        assert_eq!(v, Variant::from(50.0f32));
        // Float into an integer node truncates via rounding
        let v = NodeValueKind::UInt16.scalar_variant(&TagValue::Float(49.7));
        assert_eq!(v, Variant::from(50u16));
        let v = NodeValueKind::Boolean.scalar_variant(&TagValue::UInt(1));
        assert_eq!(v, Variant::from(true));
    }

    #[test]
    fn test_array_variant_fills_null_with_zero() {
        let variant = NodeValueKind::UInt16.array_variant(&[
            TagValue::UInt(10),
            TagValue::Null,
            TagValue::UInt(30),
        ]);
        match variant {
            Variant::Array(array) => {
                assert_eq!(array.values.len(), 3);
                assert_eq!(array.values[1], Variant::from(0u16));
            }
            other => panic!("expected array variant, got {:?}", other),
        }
    }

    #[test]
    fn test_variant_round_trip_to_tag_value() {
        assert_eq!(
            variant_to_tag_value(&Variant::from(12.5f64)),
            TagValue::Float(12.5)
        );
        assert_eq!(
            variant_to_tag_value(&Variant::from(true)),
            TagValue::Bool(true)
        );
        assert_eq!(
            variant_to_tag_value(&Variant::from(42i32)),
            TagValue::Int(42)
        );
    }
}
