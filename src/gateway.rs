// src/gateway.rs
//
// Runtime assembly: one data buffer shared by the Modbus runtime monitor and
// the OPC UA bridge, wired so worker polls land in the buffer, the bridge
// pushes the buffer outward, and client writes route back through the
// monitor into the device write queues.

use crate::buffer::DataBuffer;
use crate::io::monitor::RuntimeMonitor;
use crate::opcua::OpcUaBridge;
use crate::project::Project;

pub struct Gateway {
    project: Project,
    buffer: DataBuffer,
    monitor: RuntimeMonitor,
    bridge: OpcUaBridge,
}

impl Gateway {
    pub fn new(project: Project) -> Self {
        let buffer = DataBuffer::new();
        let monitor = RuntimeMonitor::new(buffer.clone());
        let bridge = OpcUaBridge::new(project.opcua_settings.clone(), buffer.clone());
        Self {
            project,
            buffer,
            monitor,
            bridge,
        }
    }

    pub fn buffer(&self) -> DataBuffer {
        self.buffer.clone()
    }

    pub fn is_running(&self) -> bool {
        self.monitor.is_running()
    }

    /// Start the Modbus runtime, then the OPC UA server. If the server
    /// cannot start (port in use, bad certificate, no policies), the Modbus
    /// side is torn down again and the error surfaces to the caller.
    pub async fn start(&mut self) -> Result<(), String> {
        self.monitor.start(&self.project).await?;

        let tags = self.monitor.mapped_tags();
        let router = self.monitor.write_router();
        if let Err(e) = self.bridge.start(tags, router).await {
            self.monitor.stop().await;
            return Err(e);
        }

        // Keep a working copy around so an unclean shutdown can recover the
        // active project.
        self.project.save_working_copy();
        Ok(())
    }

    /// Swap in a new project without restarting the OPC UA server: restart
    /// the Modbus runtime, then rebuild the namespace-2 node tree in place.
    pub async fn reload_project(&mut self, project: Project) -> Result<(), String> {
        self.monitor.stop().await;
        self.project = project;
        self.monitor.start(&self.project).await?;
        self.project.save_working_copy();

        let tags = self.monitor.mapped_tags();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        self.bridge.reload_tags(tags, move |success| {
            let _ = done_tx.send(success);
        });
        match done_rx.await {
            Ok(true) => Ok(()),
            _ => Err("OPC UA tag reload failed".to_string()),
        }
    }

    /// Stop both halves. The bridge goes down first so clients stop writing
    /// into a draining runtime; both stops are independent, so they run
    /// concurrently.
    pub async fn stop(&mut self) {
        futures::join!(self.bridge.stop(), self.monitor.stop());
    }
}
