// src/opcua/server.rs
//
// OPC UA server bridge.
//
// Node identifiers are string node ids in namespace 2 equal to the dotted
// tree path. Folder nodes are created lazily per path prefix and cached;
// the cache is revalidated against the address space on every use so a
// reload underneath cannot leave stale handles. The periodic push writes
// buffered values directly into the address space (bypassing the write
// path, so pushes never loop back through the write interceptor); client
// writes arrive through per-variable value setters and are handed to the
// runtime monitor's write router.
//
// The server itself runs the opcua crate's own loop on a dedicated
// background thread; the push runs as a polling action on that loop.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use opcua::server::prelude::*;
use opcua::sync::RwLock as OpcRwLock;

use crate::buffer::DataBuffer;
use crate::io::mapping::{Access, MappedTag};
use crate::io::monitor::WriteRouter;
use crate::io::TagValue;
use crate::opcua::types::{kind_for_tag, variant_to_tag_value, NodeValueKind};
use crate::project::OpcUaSettings;

/// Floor for the periodic push interval.
const MIN_PUBLISH_INTERVAL_MS: u64 = 100;
/// Settle time between tearing down and rebuilding the node tree.
const RELOAD_SETTLE: Duration = Duration::from_secs(2);

const GATEWAY_USER_TOKEN_ID: &str = "gateway_user";

/// Delay before binding the endpoint, letting a previously bound port be
/// released. Windows holds closed listener ports longer than Unix does.
fn post_stop_cleanup_delay() -> Duration {
    if cfg!(windows) {
        Duration::from_secs(2)
    } else {
        Duration::from_millis(200)
    }
}

#[derive(Clone, Debug)]
struct NodeMeta {
    node_id: NodeId,
    kind: NodeValueKind,
    array_len: Option<usize>,
}

#[derive(Default)]
struct NodeState {
    /// Tag path -> variable node.
    tag_nodes: HashMap<String, NodeMeta>,
    /// Path prefix -> folder node.
    folder_nodes: HashMap<String, NodeId>,
    /// Buffer element path "base [i]" -> (base path, index).
    element_map: HashMap<String, (String, usize)>,
    /// Paths currently being rebuilt; client writes to them are ignored.
    updating: HashSet<String>,
}

pub struct OpcUaBridge {
    settings: OpcUaSettings,
    buffer: DataBuffer,
    state: Arc<Mutex<NodeState>>,
    server: Option<Arc<OpcRwLock<Server>>>,
    address_space: Option<Arc<OpcRwLock<AddressSpace>>>,
    router: Option<Arc<WriteRouter>>,
    namespace: u16,
    server_thread: Option<std::thread::JoinHandle<()>>,
    running: bool,
}

impl OpcUaBridge {
    pub fn new(settings: OpcUaSettings, buffer: DataBuffer) -> Self {
        Self {
            settings,
            buffer,
            state: Arc::new(Mutex::new(NodeState::default())),
            server: None,
            address_space: None,
            router: None,
            namespace: 2,
            server_thread: None,
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Bring the server up: endpoint, security, certificate, user tokens,
    /// node tree, periodic push. Startup failures are surfaced to the
    /// caller; the server is left not-running.
    pub async fn start(
        &mut self,
        tags: Vec<Arc<MappedTag>>,
        router: Arc<WriteRouter>,
    ) -> Result<(), String> {
        if self.running {
            return Err("OPC UA server is already running".to_string());
        }

        let general = self.settings.general.clone();
        let host = general.network_adapter_ip.clone();
        let port = general.port;
        let app_name = general.application_name.clone();

        if !self.settings.security_policies.any_enabled() {
            return Err(
                "OpcuaStartFailure: no security policies enabled; enable at least one".to_string(),
            );
        }

        // Let a previously bound endpoint port drain before rebinding.
        tokio::time::sleep(post_stop_cleanup_delay()).await;

        // Preflight the endpoint port so PortInUse surfaces here instead of
        // inside the server thread.
        std::net::TcpListener::bind((host.as_str(), port))
            .map(drop)
            .map_err(|e| format!("OpcuaStartFailure: PortInUse: {}:{}: {}", host, port, e))?;

        let server = self.build_server(&app_name, &host, port)?;
        let server = Arc::new(OpcRwLock::new(server));
        let address_space = server.read().address_space();

        // Register the gateway namespace; user nodes live in ns=2.
        {
            let mut space = address_space.write();
            self.namespace = space
                .register_namespace(&format!("urn:{}:tags", app_name))
                .map_err(|_| "OpcuaStartFailure: failed to register namespace".to_string())?;
        }

        self.router = Some(Arc::clone(&router));
        build_node_tree(&address_space, &self.state, &router, &tags, self.namespace);
        tlog!(
            "[OpcUa] Node tree built: {} tag node(s) in ns={}",
            tags.len(),
            self.namespace
        );

        // Periodic push of buffered values into the address space.
        {
            let interval = general.publish_interval_ms.max(MIN_PUBLISH_INTERVAL_MS);
            let buffer = self.buffer.clone();
            let space = Arc::clone(&address_space);
            let state = Arc::clone(&self.state);
            server.write().add_polling_action(interval, move || {
                push_buffer_to_nodes(&buffer, &space, &state);
            });
        }

        // The opcua crate drives its own event loop; give it a dedicated
        // thread like any other blocking runtime.
        let server_for_thread = Arc::clone(&server);
        let thread = std::thread::Builder::new()
            .name("opcua-server".to_string())
            .spawn(move || {
                Server::run_server(server_for_thread);
            })
            .map_err(|e| format!("OpcuaStartFailure: failed to spawn server thread: {}", e))?;

        self.server = Some(server);
        self.address_space = Some(address_space);
        self.server_thread = Some(thread);
        self.running = true;
        tlog!(
            "[OpcUa] Server started at opc.tcp://{}:{}/ ({} endpoint policies)",
            host,
            port,
            enabled_policy_count(&self.settings)
        );
        Ok(())
    }

    fn build_server(&self, app_name: &str, host: &str, port: u16) -> Result<Server, String> {
        let general = &self.settings.general;
        let auth = &self.settings.authentication;
        let policies = &self.settings.security_policies;

        let app_uri = format!("urn:{}:server", app_name);
        let product_uri = if general.product_uri.is_empty() {
            format!("urn:{}:product", app_name)
        } else {
            general.product_uri.clone()
        };

        let mut user_token_ids: Vec<String> = Vec::new();
        let mut builder = ServerBuilder::new()
            .application_name(app_name)
            .application_uri(&app_uri)
            .product_uri(&product_uri)
            .host_and_port(host, port)
            .discovery_urls(vec![format!("opc.tcp://{}:{}/", host, port)]);

        match auth.authentication.as_str() {
            "Username/Password" => {
                if auth.username.is_empty() {
                    return Err(
                        "OpcuaStartFailure: username/password authentication needs a username"
                            .to_string(),
                    );
                }
                builder = builder.user_token(
                    GATEWAY_USER_TOKEN_ID,
                    ServerUserToken::user_pass(&auth.username, &auth.password),
                );
                user_token_ids.push(GATEWAY_USER_TOKEN_ID.to_string());
            }
            _ => {
                // Anonymous admits all sessions.
                user_token_ids.push(opcua::server::config::ANONYMOUS_USER_TOKEN_ID.to_string());
            }
        }

        let path = "/";
        if policies.policy_none {
            builder = builder.endpoint("none", ServerEndpoint::new_none(path, &user_token_ids));
        }
        if policies.policy_sign_basic256sha256 {
            builder = builder.endpoint(
                "basic256sha256_sign",
                ServerEndpoint::new_basic256sha256_sign(path, &user_token_ids),
            );
        }
        if policies.policy_encrypt_basic256sha256 {
            builder = builder.endpoint(
                "basic256sha256_sign_encrypt",
                ServerEndpoint::new_basic256sha256_sign_encrypt(path, &user_token_ids),
            );
        }
        if policies.policy_sign_aes128 {
            builder = builder.endpoint(
                "aes128_sha256_rsaoaep_sign",
                ServerEndpoint::new_aes128_sha256_rsaoaep_sign(path, &user_token_ids),
            );
        }
        if policies.policy_encrypt_aes128 {
            builder = builder.endpoint(
                "aes128_sha256_rsaoaep_sign_encrypt",
                ServerEndpoint::new_aes128_sha256_rsaoaep_sign_encrypt(path, &user_token_ids),
            );
        }
        if policies.policy_sign_aes256 {
            builder = builder.endpoint(
                "aes256_sha256_rsapss_sign",
                ServerEndpoint::new_aes256_sha256_rsapss_sign(path, &user_token_ids),
            );
        }
        if policies.policy_encrypt_aes256 {
            builder = builder.endpoint(
                "aes256_sha256_rsapss_sign_encrypt",
                ServerEndpoint::new_aes256_sha256_rsapss_sign_encrypt(path, &user_token_ids),
            );
        }

        if policies.needs_certificate() {
            let (pki_dir, cert_path, key_path) = self.ensure_certificate(app_name, host)?;
            builder = builder
                .pki_dir(pki_dir)
                .certificate_path(cert_path)
                .private_key_path(key_path)
                // Development default: accept any client certificate.
                // Production deployments substitute a curated trust store.
                .trust_client_certs();
        }

        builder
            .server()
            .ok_or_else(|| "OpcuaStartFailure: invalid server configuration".to_string())
    }

    /// Generate (or reuse) the self-signed server certificate. The
    /// certificate and key live in the per-user directory as
    /// `server_certificate.der` and `server_private_key.pem`; the PKI
    /// subdirectory next to them holds the client-certificate trust store.
    fn ensure_certificate(
        &self,
        app_name: &str,
        host: &str,
    ) -> Result<(std::path::PathBuf, std::path::PathBuf, std::path::PathBuf), String> {
        use opcua::crypto::{CertificateStore, X509Data};

        let base_dir = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("modgate");
        let pki_dir = base_dir.join("pki");
        let cert_path = base_dir.join("server_certificate.der");
        let key_path = base_dir.join("server_private_key.pem");

        if cert_path.exists() && key_path.exists() {
            tlog!("[OpcUa] Reusing server certificate: {}", cert_path.display());
            return Ok((pki_dir, cert_path, key_path));
        }

        let cert_settings = &self.settings.certificate;
        let mut alt_host_names = vec![
            format!("urn:{}:server", app_name),
            app_name.to_string(),
            "localhost".to_string(),
            "127.0.0.1".to_string(),
        ];
        if let Ok(hostname) = std::env::var("HOSTNAME") {
            if !hostname.is_empty() {
                alt_host_names.push(hostname);
            }
        }
        if !host.is_empty() && host != "0.0.0.0" {
            alt_host_names.push(host.to_string());
        }

        let x509_data = X509Data {
            key_size: 2048,
            common_name: app_name.to_string(),
            organization: if cert_settings.organization.is_empty() {
                app_name.to_string()
            } else {
                cert_settings.organization.clone()
            },
            organizational_unit: cert_settings.organization_unit.clone(),
            country: cert_settings.country.clone(),
            state: cert_settings.state.clone(),
            alt_host_names,
            certificate_duration_days: cert_settings.cert_validity.max(1) * 365,
        };

        let cert_store = CertificateStore::new(&pki_dir);
        cert_store
            .create_and_store_application_instance_cert(&x509_data, true)
            .map_err(|e| format!("OpcuaStartFailure: certificate generation failed: {}", e))?;

        // The store writes fixed internal names; the persistent copies keep
        // the documented filenames next to the PKI directory.
        std::fs::create_dir_all(&base_dir)
            .map_err(|e| format!("OpcuaStartFailure: {}: {}", base_dir.display(), e))?;
        std::fs::copy(pki_dir.join("own").join("cert.der"), &cert_path).map_err(|e| {
            format!(
                "OpcuaStartFailure: failed to store {}: {}",
                cert_path.display(),
                e
            )
        })?;
        std::fs::copy(pki_dir.join("private").join("private.pem"), &key_path).map_err(|e| {
            format!(
                "OpcuaStartFailure: failed to store {}: {}",
                key_path.display(),
                e
            )
        })?;
        tlog!(
            "[OpcUa] Generated self-signed server certificate: {}",
            cert_path.display()
        );
        Ok((pki_dir, cert_path, key_path))
    }

    /// Tear down all namespace-2 nodes in one batch, wait for the server to
    /// settle, rebuild from the new tag set and invoke the callback. Runs on
    /// a background task so the server loop never stalls.
    pub fn reload_tags<F>(&self, tags: Vec<Arc<MappedTag>>, on_done: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let (Some(address_space), Some(router)) = (self.address_space.clone(), self.router.clone())
        else {
            tlog!("[OpcUa] Reload requested while server is not running");
            on_done(false);
            return;
        };
        if !self.running {
            on_done(false);
            return;
        }

        let state = Arc::clone(&self.state);
        let namespace = self.namespace;

        tokio::spawn(async move {
            {
                let mut st = state.lock().unwrap();
                // Quarantine everything while the tree is rebuilt.
                let paths: Vec<String> = st.tag_nodes.keys().cloned().collect();
                st.updating.extend(paths);

                let mut space = address_space.write();
                for meta in st.tag_nodes.values() {
                    space.delete(&meta.node_id, true);
                }
                for folder_id in st.folder_nodes.values() {
                    space.delete(folder_id, true);
                }
                let removed = st.tag_nodes.len() + st.folder_nodes.len();
                st.tag_nodes.clear();
                st.folder_nodes.clear();
                st.element_map.clear();
                tlog!("[OpcUa] Reload: removed {} node(s)", removed);
            }

            tokio::time::sleep(RELOAD_SETTLE).await;

            build_node_tree(&address_space, &state, &router, &tags, namespace);
            state.lock().unwrap().updating.clear();
            tlog!("[OpcUa] Reload: rebuilt {} tag node(s)", tags.len());
            on_done(true);
        });
    }

    /// Stop the server and clear all caches. Idempotent.
    pub async fn stop(&mut self) {
        if !self.running && self.server.is_none() {
            return;
        }
        self.running = false;

        if let Some(server) = self.server.take() {
            server.write().abort();
        }
        if let Some(thread) = self.server_thread.take() {
            let _ = tokio::task::spawn_blocking(move || {
                let _ = thread.join();
            })
            .await;
        }
        self.address_space = None;
        self.router = None;

        let mut st = self.state.lock().unwrap();
        st.tag_nodes.clear();
        st.folder_nodes.clear();
        st.element_map.clear();
        st.updating.clear();
        tlog!("[OpcUa] Server stopped");
    }
}

fn enabled_policy_count(settings: &OpcUaSettings) -> usize {
    let p = &settings.security_policies;
    [
        p.policy_none,
        p.policy_sign_basic256sha256,
        p.policy_encrypt_basic256sha256,
        p.policy_sign_aes128,
        p.policy_encrypt_aes128,
        p.policy_sign_aes256,
        p.policy_encrypt_aes256,
    ]
    .iter()
    .filter(|enabled| **enabled)
    .count()
}

// ============================================================================
// Node tree
// ============================================================================

fn build_node_tree(
    address_space: &Arc<OpcRwLock<AddressSpace>>,
    state: &Arc<Mutex<NodeState>>,
    router: &Arc<WriteRouter>,
    tags: &[Arc<MappedTag>],
    namespace: u16,
) {
    let mut space = address_space.write();
    let mut st = state.lock().unwrap();
    let objects = NodeId::objects_folder_id();

    for tag in tags {
        let segments: Vec<&str> = tag.tree_path.split('.').collect();
        if segments.is_empty() {
            continue;
        }

        // Folder per path prefix (channel, device, groups), created lazily
        // and cached under the full prefix.
        let mut parent = objects.clone();
        let mut prefix = String::new();
        for segment in &segments[..segments.len() - 1] {
            if prefix.is_empty() {
                prefix.push_str(segment);
            } else {
                prefix = format!("{}.{}", prefix, segment);
            }
            parent = get_or_create_folder(&mut space, &mut st, &prefix, segment, &parent, namespace);
        }

        let node_id = NodeId::new(namespace, tag.tree_path.clone());
        let kind = kind_for_tag(tag);
        let display_name = if tag.name.is_empty() {
            segments[segments.len() - 1].to_string()
        } else {
            tag.name.clone()
        };

        // Drop any leftover node with the same id before recreating.
        if space.find_node(&node_id).is_some() {
            space.delete(&node_id, true);
        }

        let initial_value = match tag.array_len {
            Some(n) => kind.array_variant(&vec![TagValue::Null; n]),
            None => kind.zero(),
        };

        let mut builder = VariableBuilder::new(&node_id, display_name.as_str(), display_name.as_str())
            .organized_by(&parent)
            .data_type(kind.data_type_id())
            .value(initial_value);
        if !tag.description.is_empty() {
            builder = builder.description(tag.description.as_str());
        }
        if tag.access == Access::ReadWrite {
            builder = builder.writable();
        }
        if tag.array_len.is_some() {
            builder = builder.value_rank(1);
        }
        builder.insert(&mut *space);

        if let Some(variable) = space.find_variable_mut(&node_id) {
            if let Some(n) = tag.array_len {
                variable.set_array_dimensions(&[n as u32]);
            }
            if tag.access == Access::ReadWrite {
                install_write_interceptor(variable, tag, state, router);
            }
        }

        st.tag_nodes.insert(
            tag.tree_path.clone(),
            NodeMeta {
                node_id,
                kind,
                array_len: tag.array_len,
            },
        );
        if let Some(n) = tag.array_len {
            for i in 0..n {
                st.element_map.insert(
                    format!("{} [{}]", tag.tree_path, i),
                    (tag.tree_path.clone(), i),
                );
            }
        }
    }
}

fn get_or_create_folder(
    space: &mut AddressSpace,
    st: &mut NodeState,
    full_path: &str,
    display_name: &str,
    parent: &NodeId,
    namespace: u16,
) -> NodeId {
    if let Some(cached) = st.folder_nodes.get(full_path) {
        // A reload may have deleted the node underneath the cache.
        if space.find_node(cached).is_some() {
            return cached.clone();
        }
    }

    let folder_id = NodeId::new(namespace, full_path.to_string());
    if space.find_node(&folder_id).is_none() {
        let _ = space.add_folder_with_id(&folder_id, display_name, display_name, parent);
    }
    st.folder_nodes
        .insert(full_path.to_string(), folder_id.clone());
    folder_id
}

/// Attach a value setter that forwards client writes to the write router.
fn install_write_interceptor(
    variable: &mut Variable,
    tag: &Arc<MappedTag>,
    state: &Arc<Mutex<NodeState>>,
    router: &Arc<WriteRouter>,
) {
    let tag_path = tag.tree_path.clone();
    let state = Arc::clone(state);
    let router = Arc::clone(router);

    let setter = AttrFnSetter::new(
        move |_node_id: &NodeId,
              _attribute_id: AttributeId,
              index_range: NumericRange,
              data_value: DataValue|
              -> Result<(), StatusCode> {
            handle_client_write(&tag_path, index_range, data_value, &state, &router)
        },
    );
    variable.set_value_setter(Arc::new(opcua::sync::Mutex::new(setter)));
}

fn handle_client_write(
    tag_path: &str,
    index_range: NumericRange,
    data_value: DataValue,
    state: &Arc<Mutex<NodeState>>,
    router: &Arc<WriteRouter>,
) -> Result<(), StatusCode> {
    // Writes issued while the tree is being rebuilt are dropped quietly.
    {
        let st = state.lock().unwrap();
        if st.updating.contains(tag_path) {
            return Ok(());
        }
    }

    // Tag path plus an optional element index: a trailing " [i]" in the
    // identifier, or an index range on the write itself.
    let (base_path, mut array_index) = split_element_suffix(tag_path);
    if array_index.is_none() {
        if let NumericRange::Index(i) = index_range {
            array_index = Some(i as usize);
        }
    }

    let Some(variant) = data_value.value else {
        return Err(StatusCode::BadTypeMismatch);
    };
    let value = variant_to_tag_value(&variant);
    if value.is_null() {
        return Err(StatusCode::BadTypeMismatch);
    }

    tlog!(
        "[OpcUa] Client write: {}{} = {:?}",
        base_path,
        array_index
            .map(|i| format!(" [{}]", i))
            .unwrap_or_default(),
        value
    );

    // The router re-checks permission, reverses scaling, picks the function
    // code, enqueues and records the immediate read-back in the buffer; a
    // false return means the write was rejected.
    if router.route(&base_path, array_index, value) {
        Ok(())
    } else {
        Err(StatusCode::BadNotWritable)
    }
}

fn split_element_suffix(path: &str) -> (String, Option<usize>) {
    let trimmed = path.trim_end();
    if let Some(open) = trimmed.rfind(" [") {
        if let Some(stripped) = trimmed[open + 2..].strip_suffix(']') {
            if let Ok(index) = stripped.trim().parse::<usize>() {
                return (trimmed[..open].to_string(), Some(index));
            }
        }
    }
    (trimmed.to_string(), None)
}

// ============================================================================
// Periodic push
// ============================================================================

/// Push one buffer snapshot into the address space. Element paths aggregate
/// into whole-array writes with missing indices zero-filled; individual
/// failures are skipped, never fatal.
fn push_buffer_to_nodes(
    buffer: &DataBuffer,
    address_space: &Arc<OpcRwLock<AddressSpace>>,
    state: &Arc<Mutex<NodeState>>,
) {
    let snapshot = buffer.snapshot();
    if snapshot.is_empty() {
        return;
    }

    let st = state.lock().unwrap();
    if st.tag_nodes.is_empty() {
        return;
    }
    let now = DateTime::now();
    let mut space = address_space.write();
    let mut pending_arrays: HashMap<String, BTreeMap<usize, TagValue>> = HashMap::new();

    for (path, entry) in &snapshot {
        if let Some((base, index)) = st.element_map.get(path) {
            pending_arrays
                .entry(base.clone())
                .or_default()
                .insert(*index, entry.value.clone());
            continue;
        }

        let Some(meta) = st.tag_nodes.get(path) else {
            continue;
        };
        if entry.value.is_null() {
            continue;
        }
        let variant = meta.kind.scalar_variant(&entry.value);
        if let Some(variable) = space.find_variable_mut(&meta.node_id) {
            let _ = variable.set_value_direct(variant, StatusCode::Good, &now, &now);
        }
    }

    for (base, values) in pending_arrays {
        let Some(meta) = st.tag_nodes.get(&base) else {
            continue;
        };
        let length = meta
            .array_len
            .or_else(|| values.keys().max().map(|m| m + 1))
            .unwrap_or(0);
        if length == 0 {
            continue;
        }
        let full: Vec<TagValue> = (0..length)
            .map(|i| values.get(&i).cloned().unwrap_or(TagValue::Null))
            .collect();
        let variant = meta.kind.array_variant(&full);
        if let Some(variable) = space.find_variable_mut(&meta.node_id) {
            let _ = variable.set_value_direct(variant, StatusCode::Good, &now, &now);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_element_suffix() {
        assert_eq!(
            split_element_suffix("Channel1.Device1.Tag [3]"),
            ("Channel1.Device1.Tag".to_string(), Some(3))
        );
        assert_eq!(
            split_element_suffix("Channel1.Device1.Tag"),
            ("Channel1.Device1.Tag".to_string(), None)
        );
        // A bracketed segment that is not an index stays part of the path
        assert_eq!(
            split_element_suffix("Channel1.Device1.Tag [x]"),
            ("Channel1.Device1.Tag [x]".to_string(), None)
        );
    }

    #[test]
    fn test_element_map_bijection() {
        let mut state = NodeState::default();
        let base = "Channel1.Device1.Block";
        for i in 0..5usize {
            state
                .element_map
                .insert(format!("{} [{}]", base, i), (base.to_string(), i));
        }
        assert_eq!(state.element_map.len(), 5);
        for i in 0..5usize {
            let path = format!("{} [{}]", base, i);
            let (mapped_base, mapped_index) = state.element_map.get(&path).unwrap();
            assert_eq!(mapped_base, base);
            assert_eq!(*mapped_index, i);
            // And the reverse direction reconstructs the element path
            assert_eq!(format!("{} [{}]", mapped_base, mapped_index), path);
        }
    }

    #[test]
    fn test_post_stop_cleanup_delay_is_bounded() {
        let delay = post_stop_cleanup_delay();
        assert!(delay >= Duration::from_millis(100));
        assert!(delay <= Duration::from_secs(2));
    }

    #[test]
    fn test_enabled_policy_count() {
        let mut settings = OpcUaSettings::default();
        assert_eq!(enabled_policy_count(&settings), 1);
        settings.security_policies.policy_sign_basic256sha256 = true;
        settings.security_policies.policy_encrypt_aes256 = true;
        assert_eq!(enabled_policy_count(&settings), 3);
    }
}
