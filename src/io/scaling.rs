// src/io/scaling.rs
//
// Linear and square-root scaling between raw Modbus values and engineering
// values, with optional clamping and negation. Applied element-wise over
// arrays. `reverse_scaling` is the exact inverse and is used when routing
// OPC UA client writes back to the device.

use crate::io::mapping::BaseType;
use crate::io::TagValue;
use crate::project::{num_f64, ScalingSection};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum ScalingKind {
    Linear,
    SquareRoot,
}

/// A validated scaling descriptor. Tags without scaling carry `None` instead
/// of a descriptor, so a `Scaling` always has usable ranges.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Scaling {
    pub kind: ScalingKind,
    pub raw_low: f64,
    pub raw_high: f64,
    pub scaled_low: f64,
    pub scaled_high: f64,
    pub clamp_low: bool,
    pub clamp_high: bool,
    pub negate: bool,
    /// Target engineering data type ("Float", "Double", ...); drives the
    /// OPC UA variant type when scaling is enabled.
    pub scaled_type: Option<String>,
    pub units: String,
}

impl Scaling {
    /// Build a descriptor from the project section. Returns `Ok(None)` for
    /// kind None; rejects zero raw/scaled ranges as configuration errors.
    pub fn from_section(section: Option<&ScalingSection>) -> Result<Option<Scaling>, String> {
        let Some(section) = section else {
            return Ok(None);
        };

        let kind = match section.kind.trim().to_ascii_lowercase().as_str() {
            "" | "none" => return Ok(None),
            "linear" => ScalingKind::Linear,
            "square root" | "squareroot" | "square_root" => ScalingKind::SquareRoot,
            other => return Err(format!("Unknown scaling type '{}'", other)),
        };

        let raw_low = num_f64(&section.raw_low, 0.0);
        let raw_high = num_f64(&section.raw_high, 65535.0);
        let scaled_low = num_f64(&section.scaled_low, 0.0);
        let scaled_high = num_f64(&section.scaled_high, 100.0);

        if raw_high - raw_low == 0.0 {
            return Err("Scaling raw range must be non-zero".to_string());
        }
        if scaled_high - scaled_low == 0.0 {
            return Err("Scaling scaled range must be non-zero".to_string());
        }

        let yes = |s: &Option<crate::project::Setting>| {
            s.as_ref().map_or(false, |v| v.is_enabled(false))
        };

        Ok(Some(Scaling {
            kind,
            raw_low,
            raw_high,
            scaled_low,
            scaled_high,
            clamp_low: yes(&section.clamp_low),
            clamp_high: yes(&section.clamp_high),
            negate: yes(&section.negate),
            scaled_type: if section.scaled_type.trim().is_empty() {
                None
            } else {
                Some(section.scaled_type.clone())
            },
            units: section.units.clone(),
        }))
    }
}

/// Apply scaling to a polled value. Arrays scale element-wise; `Null` and
/// non-numeric values pass through untouched. A zero raw range returns the
/// raw value and logs instead of failing the poll.
pub fn apply_scaling(value: &TagValue, scaling: &Scaling) -> TagValue {
    if let TagValue::Array(elements) = value {
        return TagValue::Array(elements.iter().map(|v| apply_scaling(v, scaling)).collect());
    }

    let Some(raw) = value.as_f64() else {
        return value.clone();
    };

    let raw_range = scaling.raw_high - scaling.raw_low;
    if raw_range == 0.0 {
        tlog!("[Scaling] Raw range is zero, returning raw value");
        return value.clone();
    }
    let scaled_range = scaling.scaled_high - scaling.scaled_low;

    let mut scaled = match scaling.kind {
        ScalingKind::Linear => (raw - scaling.raw_low) * scaled_range / raw_range + scaling.scaled_low,
        ScalingKind::SquareRoot => {
            let normalized = ((raw - scaling.raw_low) / raw_range).max(0.0);
            normalized.sqrt() * scaled_range + scaling.scaled_low
        }
    };

    if scaling.negate {
        scaled = -scaled;
    }
    if scaling.clamp_low && scaled < scaling.scaled_low {
        scaled = scaling.scaled_low;
    }
    if scaling.clamp_high && scaled > scaling.scaled_high {
        scaled = scaling.scaled_high;
    }

    TagValue::Float(scaled)
}

/// Invert `apply_scaling`: convert an engineering value written by a client
/// back to the raw device value. When the raw data type is integer-like the
/// result is rounded to the nearest whole number.
pub fn reverse_scaling(value: &TagValue, scaling: &Scaling, raw_type: BaseType) -> TagValue {
    if let TagValue::Array(elements) = value {
        return TagValue::Array(
            elements
                .iter()
                .map(|v| reverse_scaling(v, scaling, raw_type))
                .collect(),
        );
    }

    let Some(mut scaled) = value.as_f64() else {
        return value.clone();
    };

    // Undo negation first, then the range mapping.
    if scaling.negate {
        scaled = -scaled;
    }

    let scaled_range = scaling.scaled_high - scaling.scaled_low;
    if scaled_range == 0.0 {
        tlog!("[Scaling] Scaled range is zero, returning value unchanged");
        return value.clone();
    }
    let raw_range = scaling.raw_high - scaling.raw_low;

    let raw = match scaling.kind {
        ScalingKind::Linear => (scaled - scaling.scaled_low) * raw_range / scaled_range + scaling.raw_low,
        ScalingKind::SquareRoot => {
            let normalized = ((scaled - scaling.scaled_low) / scaled_range).max(0.0);
            normalized * normalized * raw_range + scaling.raw_low
        }
    };

    if raw_type.is_integer() {
        TagValue::Float(raw.round())
    } else {
        TagValue::Float(raw)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Setting;

    fn linear(raw: (f64, f64), scaled: (f64, f64)) -> Scaling {
        Scaling {
            kind: ScalingKind::Linear,
            raw_low: raw.0,
            raw_high: raw.1,
            scaled_low: scaled.0,
            scaled_high: scaled.1,
            clamp_low: false,
            clamp_high: false,
            negate: false,
            scaled_type: None,
            units: String::new(),
        }
    }

    fn as_f64(v: TagValue) -> f64 {
        v.as_f64().expect("numeric value")
    }

    #[test]
    fn test_linear_scaling() {
        let s = linear((0.0, 1000.0), (0.0, 100.0));
        assert_eq!(as_f64(apply_scaling(&TagValue::UInt(500), &s)), 50.0);
        assert_eq!(as_f64(apply_scaling(&TagValue::UInt(0), &s)), 0.0);
        assert_eq!(as_f64(apply_scaling(&TagValue::UInt(1000), &s)), 100.0);
    }

    #[test]
    fn test_square_root_scaling() {
        let mut s = linear((0.0, 100.0), (0.0, 10.0));
        s.kind = ScalingKind::SquareRoot;
        assert!((as_f64(apply_scaling(&TagValue::UInt(25), &s)) - 5.0).abs() < 1e-9);
        // Raw below raw_low clamps the normalized input at zero before sqrt
        assert_eq!(as_f64(apply_scaling(&TagValue::Int(-5), &s)), 0.0);
    }

    #[test]
    fn test_negate_then_clamp() {
        let mut s = linear((0.0, 100.0), (0.0, 100.0));
        s.negate = true;
        assert_eq!(as_f64(apply_scaling(&TagValue::UInt(40), &s)), -40.0);

        // Clamping applies after negation
        s.clamp_low = true;
        assert_eq!(as_f64(apply_scaling(&TagValue::UInt(40), &s)), 0.0);
    }

    #[test]
    fn test_clamp_high() {
        let mut s = linear((0.0, 100.0), (0.0, 50.0));
        s.clamp_high = true;
        assert_eq!(as_f64(apply_scaling(&TagValue::UInt(200), &s)), 50.0);
    }

    #[test]
    fn test_array_scaled_element_wise() {
        let s = linear((0.0, 1000.0), (0.0, 100.0));
        let value = TagValue::Array(vec![
            TagValue::UInt(100),
            TagValue::Null,
            TagValue::UInt(1000),
        ]);
        let scaled = apply_scaling(&value, &s);
        match scaled {
            TagValue::Array(items) => {
                assert_eq!(items[0], TagValue::Float(10.0));
                assert_eq!(items[1], TagValue::Null);
                assert_eq!(items[2], TagValue::Float(100.0));
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_raw_range_returns_raw() {
        let mut s = linear((5.0, 5.0), (0.0, 100.0));
        s.raw_high = 5.0;
        let v = apply_scaling(&TagValue::UInt(42), &s);
        assert_eq!(v, TagValue::UInt(42));
    }

    #[test]
    fn test_reverse_scaling_round_trip() {
        let s = linear((0.0, 1000.0), (0.0, 100.0));
        for raw in [0.0_f64, 1.0, 250.0, 999.0, 1000.0] {
            let scaled = apply_scaling(&TagValue::Float(raw), &s);
            let back = reverse_scaling(&scaled, &s, BaseType::Float32);
            assert!((as_f64(back) - raw).abs() < 1e-9, "raw={}", raw);
        }
    }

    #[test]
    fn test_reverse_scaling_rounds_integer_raw_types() {
        let s = linear((0.0, 1000.0), (0.0, 100.0));
        // 12.5 -> 125.0 raw; integer raw types round
        let raw = reverse_scaling(&TagValue::Float(12.51), &s, BaseType::UInt16);
        assert_eq!(as_f64(raw), 125.0);
        let raw = reverse_scaling(&TagValue::Float(12.51), &s, BaseType::Float32);
        assert!((as_f64(raw) - 125.1).abs() < 1e-9);
    }

    #[test]
    fn test_reverse_scaling_undoes_negation() {
        let mut s = linear((0.0, 100.0), (0.0, 100.0));
        s.negate = true;
        let scaled = apply_scaling(&TagValue::UInt(30), &s);
        assert_eq!(as_f64(scaled.clone()), -30.0);
        let back = reverse_scaling(&scaled, &s, BaseType::UInt16);
        assert_eq!(as_f64(back), 30.0);
    }

    #[test]
    fn test_from_section_rejects_zero_ranges() {
        let section = ScalingSection {
            kind: "Linear".into(),
            raw_low: Some(Setting::Int(10)),
            raw_high: Some(Setting::Int(10)),
            scaled_low: Some(Setting::Int(0)),
            scaled_high: Some(Setting::Int(100)),
            clamp_low: None,
            clamp_high: None,
            negate: None,
            scaled_type: String::new(),
            units: String::new(),
        };
        assert!(Scaling::from_section(Some(&section)).is_err());
    }

    #[test]
    fn test_from_section_none_kind() {
        let section = ScalingSection {
            kind: "None".into(),
            raw_low: None,
            raw_high: None,
            scaled_low: None,
            scaled_high: None,
            clamp_low: None,
            clamp_high: None,
            negate: None,
            scaled_type: String::new(),
            units: String::new(),
        };
        assert_eq!(Scaling::from_section(Some(&section)).unwrap(), None);
        assert_eq!(Scaling::from_section(None).unwrap(), None);
    }

    #[test]
    fn test_from_section_parses_yes_no() {
        let section = ScalingSection {
            kind: "Square Root".into(),
            raw_low: Some(Setting::Int(0)),
            raw_high: Some(Setting::Int(1000)),
            scaled_low: Some(Setting::Int(0)),
            scaled_high: Some(Setting::Int(100)),
            clamp_low: Some(Setting::Text("Yes".into())),
            clamp_high: Some(Setting::Text("No".into())),
            negate: Some(Setting::Text("Yes".into())),
            scaled_type: "Double".into(),
            units: "degC".into(),
        };
        let s = Scaling::from_section(Some(&section)).unwrap().unwrap();
        assert_eq!(s.kind, ScalingKind::SquareRoot);
        assert!(s.clamp_low);
        assert!(!s.clamp_high);
        assert!(s.negate);
        assert_eq!(s.scaled_type.as_deref(), Some("Double"));
        assert_eq!(s.units, "degC");
    }
}
