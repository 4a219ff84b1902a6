// src/opcua/mod.rs
//
// OPC UA bridge: builds the namespace-2 node tree from the project's
// canonical tags, pushes buffered values on a timer, and intercepts client
// writes to route them back into the Modbus runtime.

mod server;
pub mod types;

pub use server::OpcUaBridge;
