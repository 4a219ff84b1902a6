// src/lib.rs
//
// modgate: industrial Modbus to OPC UA gateway.
//
// The runtime polls a fleet of Modbus slave devices (TCP, RTU serial and
// RTU-over-TCP) on per-tag schedules, decodes registers into engineering
// values, caches them in a shared buffer and republishes them through an
// OPC UA server that also accepts writes back to the devices.

#[macro_use]
mod logging;

pub mod buffer;
pub mod diagnostics;
pub mod gateway;
pub mod io;
pub mod opcua;
pub mod project;

pub use buffer::{BufferEntry, DataBuffer};
pub use gateway::Gateway;
pub use project::Project;

use std::path::Path;

/// Load the project document and run the gateway until Ctrl-C.
pub fn run(project_path: &str) -> Result<(), String> {
    let project = Project::from_file(Path::new(project_path))?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start async runtime: {}", e))?;

    runtime.block_on(async move {
        if let Some(data_dir) = dirs::data_dir() {
            let _ = logging::init_file_logging(&data_dir.join("modgate").join("logs"));
        }

        let mut gateway = Gateway::new(project);
        gateway.start().await?;
        tlog!("[modgate] Gateway running; press Ctrl-C to stop");

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| format!("Failed to wait for shutdown signal: {}", e))?;
        tlog!("[modgate] Shutting down");
        gateway.stop().await;
        logging::stop_file_logging();
        Ok(())
    })
}
