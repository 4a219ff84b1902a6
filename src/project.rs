// src/project.rs
//
// Typed model of the project document: Project -> Channels -> Devices ->
// [Groups] -> Tags, plus the OPC UA server settings. The JSON document is
// the authoritative store; the runtime parses it once into these records
// and never consults any other representation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Flexible scalar
// ============================================================================

/// A configuration scalar that may arrive as a bool, number or string.
/// Device dialogs historically stored "Enable"/"Disable", "1"/"0" and plain
/// numbers interchangeably, so every consumer goes through these accessors.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Setting {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Setting {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Setting::Bool(b) => Some(i64::from(*b)),
            Setting::Int(v) => Some(*v),
            Setting::Float(v) => Some(*v as i64),
            Setting::Text(s) => s.trim().parse::<i64>().ok(),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_i64().and_then(|v| u64::try_from(v).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Setting::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Setting::Int(v) => Some(*v as f64),
            Setting::Float(v) => Some(*v),
            Setting::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Setting::Bool(b) => b.to_string(),
            Setting::Int(v) => v.to_string(),
            Setting::Float(v) => v.to_string(),
            Setting::Text(s) => s.clone(),
        }
    }

    /// Interpret an Enable/Disable style flag. Accepts 1/0, true/false and
    /// the strings "enable(d)", "disable(d)", "yes", "no", "on", "off",
    /// "msb", "lsb" (bit order dialogs store those directly).
    pub fn is_enabled(&self, default: bool) -> bool {
        match self {
            Setting::Bool(b) => *b,
            Setting::Int(v) => *v != 0,
            Setting::Float(v) => *v != 0.0,
            Setting::Text(s) => {
                let s = s.trim().to_ascii_lowercase();
                if s.is_empty() {
                    return default;
                }
                match s.as_str() {
                    "1" | "true" | "yes" | "on" | "enable" | "enabled" | "msb" => true,
                    "0" | "false" | "no" | "off" | "disable" | "disabled" | "lsb" => false,
                    _ => default,
                }
            }
        }
    }
}

/// Read an optional flag with a default.
pub fn flag(setting: &Option<Setting>, default: bool) -> bool {
    setting.as_ref().map_or(default, |s| s.is_enabled(default))
}

/// Read an optional numeric setting with a default.
pub fn num_u64(setting: &Option<Setting>, default: u64) -> u64 {
    setting.as_ref().and_then(|s| s.as_u64()).unwrap_or(default)
}

pub fn num_f64(setting: &Option<Setting>, default: f64) -> f64 {
    setting.as_ref().and_then(|s| s.as_f64()).unwrap_or(default)
}

pub fn text(setting: &Option<Setting>, default: &str) -> String {
    setting
        .as_ref()
        .map(|s| s.as_text())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

// ============================================================================
// Project tree
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Project {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub channels: Vec<ChannelNode>,
    #[serde(default)]
    pub opcua_settings: OpcUaSettings,
}

/// Common `general` section shared by all node types.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct General {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Modbus unit id on Device nodes; absent elsewhere.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "id")]
    pub device_id: Option<Setting>,
}

/// Child node of a channel, device or group, discriminated by `type`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProjectNode {
    Channel(ChannelNode),
    Device(DeviceNode),
    Group(GroupNode),
    Tag(TagNode),
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ChannelNode {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub driver: Driver,
    /// Canonical copy of the transport parameters; TCP channels carry
    /// `network_adapter` as "Name (IP)".
    #[serde(default)]
    pub communication: CommParams,
    #[serde(default)]
    pub children: Vec<ProjectNode>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Driver {
    /// "Modbus TCP/IP Ethernet", "Modbus RTU Serial" or "Modbus RTU over TCP".
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub params: CommParams,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct CommParams {
    // TCP transports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_adapter: Option<Setting>,
    // Serial transports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub com: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baud: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_bits: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parity: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<Setting>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct DeviceNode {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub timing: TimingSection,
    #[serde(default)]
    pub data_access: DataAccessSection,
    #[serde(default)]
    pub encoding: EncodingSection,
    #[serde(default)]
    pub block_sizes: BlockSizesSection,
    #[serde(default)]
    pub children: Vec<ProjectNode>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct TimingSection {
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_attempts: Option<Setting>,
    /// Milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts_before_timeout: Option<Setting>,
    /// Milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inter_request_delay: Option<Setting>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct DataAccessSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zero_based: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zero_based_bit: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_writes: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub func_06: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub func_05: Option<Setting>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct EncodingSection {
    /// Enable = big-endian (Modbus network order), Disable = little-endian.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_order: Option<Setting>,
    /// 1 = first word low, 0 = first word high (32-bit values).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_order: Option<Setting>,
    /// 1 = first dword low, 0 = first dword high (64-bit values).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dword_order: Option<Setting>,
    /// 1 = MSB (Modicon), 0 = LSB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_order: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treat_longs_as_decimals: Option<Setting>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct BlockSizesSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_coils: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_coils: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int_regs: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_regs: Option<Setting>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct GroupNode {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub children: Vec<ProjectNode>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct TagNode {
    #[serde(default)]
    pub general: TagGeneral,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling: Option<ScalingSection>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TagGeneral {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 6-digit Modbus address, optionally suffixed `[N]` for arrays.
    #[serde(default)]
    pub address: String,
    #[serde(default = "default_data_type")]
    pub data_type: String,
    #[serde(default = "default_access")]
    pub access: String,
    /// Milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_rate: Option<Setting>,
}

impl Default for TagGeneral {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            address: String::new(),
            data_type: default_data_type(),
            access: default_access(),
            scan_rate: None,
        }
    }
}

fn default_data_type() -> String {
    "Word".to_string()
}
fn default_access() -> String {
    "Read Only".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScalingSection {
    /// "None", "Linear" or "Square Root".
    #[serde(rename = "type", default = "default_scaling_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_low: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_high: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaled_low: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaled_high: Option<Setting>,
    /// "Yes"/"No"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clamp_low: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clamp_high: Option<Setting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negate: Option<Setting>,
    #[serde(default)]
    pub scaled_type: String,
    #[serde(default)]
    pub units: String,
}

fn default_scaling_kind() -> String {
    "None".to_string()
}

// ============================================================================
// OPC UA settings
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct OpcUaSettings {
    #[serde(default)]
    pub general: OpcUaGeneral,
    #[serde(default)]
    pub authentication: AuthenticationSettings,
    #[serde(default)]
    pub security_policies: SecurityPolicies,
    #[serde(default)]
    pub certificate: CertificateSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpcUaGeneral {
    #[serde(default = "default_application_name")]
    pub application_name: String,
    #[serde(default = "default_bind_host")]
    pub network_adapter_ip: String,
    #[serde(default = "default_opcua_port")]
    pub port: u16,
    #[serde(default)]
    pub product_uri: String,
    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,
}

impl Default for OpcUaGeneral {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            network_adapter_ip: default_bind_host(),
            port: default_opcua_port(),
            product_uri: String::new(),
            publish_interval_ms: default_publish_interval_ms(),
        }
    }
}

fn default_application_name() -> String {
    "modgate".to_string()
}
fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}
fn default_opcua_port() -> u16 {
    4848
}
fn default_publish_interval_ms() -> u64 {
    1000
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthenticationSettings {
    /// "Anonymous" or "Username/Password".
    #[serde(default = "default_auth_mode")]
    pub authentication: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Default for AuthenticationSettings {
    fn default() -> Self {
        Self {
            authentication: default_auth_mode(),
            username: String::new(),
            password: String::new(),
        }
    }
}

fn default_auth_mode() -> String {
    "Anonymous".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecurityPolicies {
    #[serde(default = "default_true")]
    pub policy_none: bool,
    #[serde(default)]
    pub policy_sign_basic256sha256: bool,
    #[serde(default)]
    pub policy_encrypt_basic256sha256: bool,
    #[serde(default)]
    pub policy_sign_aes128: bool,
    #[serde(default)]
    pub policy_encrypt_aes128: bool,
    #[serde(default)]
    pub policy_sign_aes256: bool,
    #[serde(default)]
    pub policy_encrypt_aes256: bool,
}

impl Default for SecurityPolicies {
    fn default() -> Self {
        Self {
            policy_none: true,
            policy_sign_basic256sha256: false,
            policy_encrypt_basic256sha256: false,
            policy_sign_aes128: false,
            policy_encrypt_aes128: false,
            policy_sign_aes256: false,
            policy_encrypt_aes256: false,
        }
    }
}

impl SecurityPolicies {
    pub fn any_enabled(&self) -> bool {
        self.policy_none
            || self.policy_sign_basic256sha256
            || self.policy_encrypt_basic256sha256
            || self.policy_sign_aes128
            || self.policy_encrypt_aes128
            || self.policy_sign_aes256
            || self.policy_encrypt_aes256
    }

    /// Any policy other than None requires a server certificate.
    pub fn needs_certificate(&self) -> bool {
        self.policy_sign_basic256sha256
            || self.policy_encrypt_basic256sha256
            || self.policy_sign_aes128
            || self.policy_encrypt_aes128
            || self.policy_sign_aes256
            || self.policy_encrypt_aes256
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CertificateSettings {
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub locality: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub organization_unit: String,
    /// Years
    #[serde(default = "default_cert_validity")]
    pub cert_validity: u32,
}

impl Default for CertificateSettings {
    fn default() -> Self {
        Self {
            country: String::new(),
            state: String::new(),
            locality: String::new(),
            organization: String::new(),
            organization_unit: String::new(),
            cert_validity: default_cert_validity(),
        }
    }
}

fn default_cert_validity() -> u32 {
    20
}

// ============================================================================
// Load / save
// ============================================================================

impl Project {
    pub fn from_json(json: &str) -> Result<Project, String> {
        serde_json::from_str(json).map_err(|e| format!("Invalid project document: {}", e))
    }

    pub fn from_file(path: &Path) -> Result<Project, String> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read project file {}: {}", path.display(), e))?;
        Self::from_json(&json)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize project: {}", e))?;
        std::fs::write(path, json)
            .map_err(|e| format!("Failed to write project file {}: {}", path.display(), e))
    }

    /// Location of the working copy that survives restarts.
    pub fn working_copy_path() -> PathBuf {
        std::env::temp_dir().join("modgate-project.json")
    }

    /// Persist the working copy; failures are logged, never fatal.
    pub fn save_working_copy(&self) {
        let path = Self::working_copy_path();
        if let Err(e) = self.save_to_file(&path) {
            tlog!("[Project] Failed to save working copy: {}", e);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_project_json() -> &'static str {
        r#"{
            "general": {"name": "Plant"},
            "channels": [{
                "general": {"name": "Channel1"},
                "driver": {"type": "Modbus TCP/IP Ethernet", "params": {"ip": "127.0.0.1", "port": 5020}},
                "communication": {"network_adapter": "Default (127.0.0.1)"},
                "children": [{
                    "type": "Device",
                    "general": {"name": "Device1", "device_id": 1},
                    "timing": {"connect_timeout": 3, "request_timeout": 1000},
                    "data_access": {"zero_based": "Enable", "func_06": 1},
                    "encoding": {"byte_order": "Enable", "word_order": 1},
                    "block_sizes": {"hold_regs": 120},
                    "children": [
                        {"type": "Tag", "general": {"name": "Probe", "address": "400001", "data_type": "Int", "access": "Read Only", "scan_rate": 1000}},
                        {"type": "Group", "general": {"name": "Data"}, "children": [
                            {"type": "Tag", "general": {"name": "Freq", "address": "400010", "data_type": "Float", "access": "Read/Write"}}
                        ]}
                    ]
                }]
            }],
            "opcua_settings": {
                "general": {"application_name": "modgate", "port": 4848},
                "authentication": {"authentication": "Anonymous"},
                "security_policies": {"policy_none": true}
            }
        }"#
    }

    #[test]
    fn test_parse_sample_project() {
        let project = Project::from_json(sample_project_json()).expect("parse failed");
        assert_eq!(project.channels.len(), 1);
        let channel = &project.channels[0];
        assert_eq!(channel.general.name, "Channel1");
        assert_eq!(channel.driver.kind, "Modbus TCP/IP Ethernet");

        let device = match &channel.children[0] {
            ProjectNode::Device(d) => d,
            other => panic!("expected device, got {:?}", other),
        };
        assert_eq!(device.general.name, "Device1");
        assert_eq!(device.general.device_id.as_ref().unwrap().as_u64(), Some(1));
        assert!(flag(&device.data_access.zero_based, false));
        assert_eq!(num_u64(&device.block_sizes.hold_regs, 0), 120);

        // Tag directly under the device
        match &device.children[0] {
            ProjectNode::Tag(t) => {
                assert_eq!(t.general.name, "Probe");
                assert_eq!(t.general.data_type, "Int");
            }
            other => panic!("expected tag, got {:?}", other),
        }
        // Tag nested under a group
        match &device.children[1] {
            ProjectNode::Group(g) => match &g.children[0] {
                ProjectNode::Tag(t) => assert_eq!(t.general.name, "Freq"),
                other => panic!("expected tag, got {:?}", other),
            },
            other => panic!("expected group, got {:?}", other),
        }
    }

    #[test]
    fn test_setting_flag_variants() {
        assert!(Setting::Text("Enable".into()).is_enabled(false));
        assert!(Setting::Text("enabled".into()).is_enabled(false));
        assert!(Setting::Int(1).is_enabled(false));
        assert!(Setting::Bool(true).is_enabled(false));
        assert!(!Setting::Text("Disable".into()).is_enabled(true));
        assert!(!Setting::Int(0).is_enabled(true));
        // Unknown strings fall back to the default
        assert!(Setting::Text("maybe".into()).is_enabled(true));
        assert!(!Setting::Text("maybe".into()).is_enabled(false));
    }

    #[test]
    fn test_setting_numeric_coercion() {
        assert_eq!(Setting::Text("1000".into()).as_u64(), Some(1000));
        assert_eq!(Setting::Int(3).as_f64(), Some(3.0));
        assert_eq!(Setting::Float(2.5).as_i64(), Some(2));
        assert_eq!(Setting::Text("junk".into()).as_u64(), None);
    }

    #[test]
    fn test_opcua_settings_defaults() {
        let project = Project::from_json("{}").expect("empty project should parse");
        let opcua = &project.opcua_settings;
        assert_eq!(opcua.general.port, 4848);
        assert_eq!(opcua.general.publish_interval_ms, 1000);
        assert_eq!(opcua.authentication.authentication, "Anonymous");
        assert!(opcua.security_policies.policy_none);
        assert!(opcua.security_policies.any_enabled());
        assert!(!opcua.security_policies.needs_certificate());
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let project = Project::from_json(sample_project_json()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.json");
        project.save_to_file(&path).unwrap();
        let reloaded = Project::from_file(&path).unwrap();
        assert_eq!(reloaded.channels.len(), 1);
        assert_eq!(reloaded.channels[0].general.name, "Channel1");
    }
}
