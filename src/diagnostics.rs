// src/diagnostics.rs
//
// Pub-sub diagnostics sink. Workers and clients emit one record per TX and
// RX ADU (plus lifecycle messages) tagged with a config id
// ("ChannelName_DeviceName"); a terminal or diagnostics view registers a
// listener to receive them. Emission is a no-op when nothing is listening.
// Records are kept in a bounded ring for late-attaching listeners.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::RwLock;

const RECORD_CAPACITY: usize = 5000;

/// Structured context attached to a diagnostic record.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DiagContext {
    /// "ChannelName_DeviceName"
    pub config_id: String,
    /// "TX" or "RX" for wire records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    /// Function code parsed from the ADU header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fc: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<u8>,
    /// Space-separated hex payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Transport identifier: "tcp", "rtu" or "rtu_over_tcp"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DiagnosticRecord {
    /// Local wall-clock timestamp, HH:MM:SS.mmm
    pub timestamp: String,
    pub text: String,
    pub context: DiagContext,
}

type ListenerFn = Box<dyn Fn(&DiagnosticRecord) + Send + Sync>;

struct Listener {
    token: String,
    name: String,
    callback: ListenerFn,
}

#[derive(Default)]
struct DiagnosticsState {
    records: VecDeque<DiagnosticRecord>,
    listeners: Vec<Listener>,
    /// When set, only TX/RX wire records are emitted.
    only_txrx: bool,
}

static DIAGNOSTICS: Lazy<RwLock<DiagnosticsState>> =
    Lazy::new(|| RwLock::new(DiagnosticsState::default()));

/// Register a listener; returns a token for `unregister_listener`.
pub fn register_listener<F>(name: &str, callback: F) -> String
where
    F: Fn(&DiagnosticRecord) + Send + Sync + 'static,
{
    let token = uuid::Uuid::new_v4().to_string();
    let mut state = DIAGNOSTICS.write().unwrap();
    state.listeners.push(Listener {
        token: token.clone(),
        name: name.to_string(),
        callback: Box::new(callback),
    });
    tlog!("[Diagnostics] Listener '{}' registered", name);
    token
}

pub fn unregister_listener(token: &str) {
    let mut state = DIAGNOSTICS.write().unwrap();
    if let Some(pos) = state.listeners.iter().position(|l| l.token == token) {
        let listener = state.listeners.remove(pos);
        tlog!("[Diagnostics] Listener '{}' unregistered", listener.name);
    }
}

/// Restrict emission to TX/RX wire records.
pub fn set_only_txrx(value: bool) {
    DIAGNOSTICS.write().unwrap().only_txrx = value;
}

pub fn clear() {
    DIAGNOSTICS.write().unwrap().records.clear();
}

/// Copy of the retained records, oldest first.
pub fn snapshot() -> Vec<DiagnosticRecord> {
    DIAGNOSTICS.read().unwrap().records.iter().cloned().collect()
}

pub fn listener_count() -> usize {
    DIAGNOSTICS.read().unwrap().listeners.len()
}

/// Emit a diagnostic record. Cheap no-op when no listeners are registered
/// and the ring is the only consumer.
pub fn emit(text: impl Into<String>, context: DiagContext) {
    let text = text.into();
    let mut state = DIAGNOSTICS.write().unwrap();

    if state.only_txrx {
        let is_wire = context
            .direction
            .as_deref()
            .map(|d| d == "TX" || d == "RX")
            .unwrap_or(false)
            || text.contains("TX:")
            || text.contains("RX:");
        if !is_wire {
            return;
        }
    }

    let record = DiagnosticRecord {
        timestamp: chrono::Local::now().format("%H:%M:%S%.3f").to_string(),
        text,
        context,
    };

    if state.records.len() >= RECORD_CAPACITY {
        state.records.pop_front();
    }
    state.records.push_back(record.clone());

    for listener in &state.listeners {
        (listener.callback)(&record);
    }
}

/// Format a byte buffer as the space-separated uppercase hex used in
/// terminal views.
pub fn hex_string(data: &[u8]) -> String {
    let encoded = hex::encode_upper(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / 2);
    for (i, pair) in encoded.as_bytes().chunks(2).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(std::str::from_utf8(pair).unwrap_or(""));
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_listener_receives_records() {
        clear();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let token = register_listener("test", move |_record| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        emit(
            "[ADU] TX: | 01 03 00 00 00 02 |",
            DiagContext {
                config_id: "Channel1_Device1".into(),
                direction: Some("TX".into()),
                fc: Some(3),
                unit: Some(1),
                ..Default::default()
            },
        );
        assert!(seen.load(Ordering::SeqCst) >= 1);

        unregister_listener(&token);
        let before = seen.load(Ordering::SeqCst);
        emit("after unregister", DiagContext::default());
        assert_eq!(seen.load(Ordering::SeqCst), before);
    }

    #[test]
    fn test_hex_string_format() {
        assert_eq!(hex_string(&[0x01, 0xAB, 0x00]), "01 AB 00");
        assert_eq!(hex_string(&[]), "");
    }

    #[test]
    fn test_emit_without_listeners_is_noop() {
        // Must not panic or block
        emit("no listeners", DiagContext::default());
    }
}
