// src/io/client.rs
//
// Thin async wrapper around tokio-modbus for the three channel transports:
// Modbus TCP, RTU over a serial line, and RTU framing over a TCP socket
// (checksummed RTU ADUs on a stream socket — semantically distinct from
// plain Modbus TCP).
//
// Addresses arriving here are already zero-based protocol offsets; all
// 6-digit arithmetic happened in the mapper. Connect/read/write honour the
// device timing settings (attempts and per-request timeouts). Each exchange
// is mirrored to the diagnostics sink as a synthesised TX/RX ADU pair, since
// tokio-modbus does not expose the raw wire bytes.

use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_modbus::client::Context;
use tokio_modbus::prelude::*;

use crate::diagnostics::{self, DiagContext};
use crate::io::codec;
use crate::io::mapping::AddressType;
use crate::io::write_queue::WriteRequest;
use crate::io::TagValue;
use crate::io::mapping::Timing;

// ============================================================================
// Transport configuration
// ============================================================================

#[derive(Clone, Debug)]
pub enum TransportConfig {
    /// Modbus TCP/IP Ethernet (MBAP framing).
    Tcp { host: String, port: u16 },
    /// RTU ADUs (with CRC) carried over a TCP socket.
    RtuOverTcp { host: String, port: u16 },
    /// RTU over a serial line.
    RtuSerial {
        port: String,
        baud: u32,
        data_bits: u8,
        parity: String,
        stop_bits: u8,
    },
}

impl TransportConfig {
    pub fn describe(&self) -> String {
        match self {
            TransportConfig::Tcp { host, port } => format!("{}:{}", host, port),
            TransportConfig::RtuOverTcp { host, port } => format!("{}:{} (RTU)", host, port),
            TransportConfig::RtuSerial { port, baud, .. } => format!("{}@{}", port, baud),
        }
    }

    fn uses_rtu_framing(&self) -> bool {
        matches!(
            self,
            TransportConfig::RtuOverTcp { .. } | TransportConfig::RtuSerial { .. }
        )
    }

    fn host_port(&self) -> Option<(&str, u16)> {
        match self {
            TransportConfig::Tcp { host, port } | TransportConfig::RtuOverTcp { host, port } => {
                Some((host.as_str(), *port))
            }
            TransportConfig::RtuSerial { .. } => None,
        }
    }

    fn transport_id(&self) -> &'static str {
        match self {
            TransportConfig::Tcp { .. } => "tcp",
            TransportConfig::RtuOverTcp { .. } => "rtu_over_tcp",
            TransportConfig::RtuSerial { .. } => "rtu",
        }
    }
}

/// Payload of one batch read.
#[derive(Clone, Debug)]
pub enum ReadPayload {
    /// Coil / discrete-input bits.
    Bits(Vec<bool>),
    /// Register data as big-endian bytes, 2 per register.
    Registers(Vec<u8>),
}

/// Convert register values to bytes in big-endian order (MSB first per
/// register, standard Modbus byte order).
pub fn registers_to_bytes(registers: &[u16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(registers.len() * 2);
    for &reg in registers {
        bytes.push((reg >> 8) as u8);
        bytes.push((reg & 0xFF) as u8);
    }
    bytes
}

/// Pack coil values to bytes, 8 coils per byte, LSB first within each byte
/// (Modbus convention). Used for the synthesised response ADUs.
fn coils_to_bytes(coils: &[bool]) -> Vec<u8> {
    let byte_count = (coils.len() + 7) / 8;
    let mut bytes = vec![0u8; byte_count];
    for (i, &coil) in coils.iter().enumerate() {
        if coil {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

/// CRC-16/Modbus (poly 0x8005 reflected, init 0xFFFF).
fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

// ============================================================================
// Modbus client
// ============================================================================

pub struct ModbusClient {
    config_id: String,
    transport: TransportConfig,
    unit: u8,
    timing: Timing,
    ctx: Option<Context>,
    /// MBAP transaction id for synthesised trace frames.
    transaction_id: u16,
}

impl ModbusClient {
    pub fn new(config_id: &str, transport: TransportConfig, unit: u8, timing: Timing) -> Self {
        Self {
            config_id: config_id.to_string(),
            transport,
            unit,
            timing,
            ctx: None,
            transaction_id: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    /// Connect with up to `connect_attempts` tries, each bounded by the
    /// connect timeout.
    pub async fn connect(&mut self) -> Result<(), String> {
        if self.ctx.is_some() {
            return Ok(());
        }

        let attempts = self.timing.connect_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.connect_once().await {
                Ok(ctx) => {
                    self.ctx = Some(ctx);
                    tlog!(
                        "[ModbusClient:{}] Connected to {} (attempt {}/{})",
                        self.config_id,
                        self.transport.describe(),
                        attempt,
                        attempts
                    );
                    self.emit_diag(format!(
                        "CONNECTED: {} (attempt {}/{})",
                        self.transport.describe(),
                        attempt,
                        attempts
                    ));
                    return Ok(());
                }
                Err(e) => {
                    last_error = e;
                    if attempt < attempts {
                        self.emit_diag(format!(
                            "CONNECTION_RETRY: attempt {}/{} failed, retrying...",
                            attempt, attempts
                        ));
                        sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }

        self.emit_diag(format!(
            "CONNECTION_FAILED: {} after {} attempts",
            self.transport.describe(),
            attempts
        ));
        Err(format!(
            "ConnectFailed: {} after {} attempts: {}",
            self.transport.describe(),
            attempts,
            last_error
        ))
    }

    async fn connect_once(&mut self) -> Result<Context, String> {
        let slave = Slave(self.unit);
        let connect_timeout = self.timing.connect_timeout;

        match &self.transport {
            TransportConfig::Tcp { host, port } => {
                let addr = resolve(host, *port).await?;
                let connect = tokio_modbus::client::tcp::connect_slave(addr, slave);
                match timeout(connect_timeout, connect).await {
                    Ok(Ok(ctx)) => Ok(ctx),
                    Ok(Err(e)) => Err(format!("{}", e)),
                    Err(_) => Err(format!("connect timed out after {:?}", connect_timeout)),
                }
            }
            TransportConfig::RtuOverTcp { host, port } => {
                let addr = resolve(host, *port).await?;
                // RTU framer over the TCP socket; plain tcp::connect would
                // speak MBAP and the device could not parse it.
                let connect = async {
                    let stream = tokio::net::TcpStream::connect(addr).await?;
                    Ok::<_, std::io::Error>(tokio_modbus::client::rtu::attach_slave(stream, slave))
                };
                match timeout(connect_timeout, connect).await {
                    Ok(Ok(ctx)) => Ok(ctx),
                    Ok(Err(e)) => Err(format!("{}", e)),
                    Err(_) => Err(format!("connect timed out after {:?}", connect_timeout)),
                }
            }
            TransportConfig::RtuSerial {
                port,
                baud,
                data_bits,
                parity,
                stop_bits,
            } => {
                let builder = tokio_serial::new(port.clone(), *baud)
                    .data_bits(match data_bits {
                        5 => tokio_serial::DataBits::Five,
                        6 => tokio_serial::DataBits::Six,
                        7 => tokio_serial::DataBits::Seven,
                        _ => tokio_serial::DataBits::Eight,
                    })
                    .parity(match parity.to_ascii_lowercase().as_str() {
                        "even" | "e" => tokio_serial::Parity::Even,
                        "odd" | "o" => tokio_serial::Parity::Odd,
                        _ => tokio_serial::Parity::None,
                    })
                    .stop_bits(match stop_bits {
                        2 => tokio_serial::StopBits::Two,
                        _ => tokio_serial::StopBits::One,
                    })
                    .timeout(connect_timeout);
                let stream = tokio_serial::SerialStream::open(&builder)
                    .map_err(|e| format!("failed to open {}: {}", port, e))?;
                Ok(tokio_modbus::client::rtu::attach_slave(stream, slave))
            }
        }
    }

    /// Close the connection. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            let _ = ctx.disconnect().await;
            tlog!("[ModbusClient:{}] Disconnected", self.config_id);
        }
    }

    /// Read a block from one address space. Coil spaces return a bit vector,
    /// register spaces a big-endian byte sequence. Retries up to
    /// `attempts_before_timeout`, each attempt bounded by the request
    /// timeout.
    pub async fn read(
        &mut self,
        address_type: AddressType,
        start: u16,
        count: u16,
    ) -> Result<ReadPayload, String> {
        self.connect().await?;

        let fc = address_type.read_function_code();
        self.trace_request(fc, &read_request_pdu(fc, start, count));

        let attempts = self.timing.attempts_before_timeout.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let request_timeout = self.timing.request_timeout;
            let ctx = self.ctx.as_mut().ok_or("not connected")?;

            let result: Result<ReadPayload, (String, bool)> = match address_type {
                AddressType::Coil => {
                    match timeout(request_timeout, ctx.read_coils(start, count)).await {
                        Ok(Ok(Ok(bits))) => Ok(ReadPayload::Bits(bits)),
                        Ok(Ok(Err(exc))) => Err((format!("Modbus exception: {}", exc), false)),
                        Ok(Err(e)) => Err((format!("IO error: {}", e), true)),
                        Err(_) => Err(("request timed out".to_string(), true)),
                    }
                }
                AddressType::DiscreteInput => {
                    match timeout(request_timeout, ctx.read_discrete_inputs(start, count)).await {
                        Ok(Ok(Ok(bits))) => Ok(ReadPayload::Bits(bits)),
                        Ok(Ok(Err(exc))) => Err((format!("Modbus exception: {}", exc), false)),
                        Ok(Err(e)) => Err((format!("IO error: {}", e), true)),
                        Err(_) => Err(("request timed out".to_string(), true)),
                    }
                }
                AddressType::HoldingRegister => {
                    match timeout(request_timeout, ctx.read_holding_registers(start, count)).await {
                        Ok(Ok(Ok(regs))) => Ok(ReadPayload::Registers(registers_to_bytes(&regs))),
                        Ok(Ok(Err(exc))) => Err((format!("Modbus exception: {}", exc), false)),
                        Ok(Err(e)) => Err((format!("IO error: {}", e), true)),
                        Err(_) => Err(("request timed out".to_string(), true)),
                    }
                }
                AddressType::InputRegister => {
                    match timeout(request_timeout, ctx.read_input_registers(start, count)).await {
                        Ok(Ok(Ok(regs))) => Ok(ReadPayload::Registers(registers_to_bytes(&regs))),
                        Ok(Ok(Err(exc))) => Err((format!("Modbus exception: {}", exc), false)),
                        Ok(Err(e)) => Err((format!("IO error: {}", e), true)),
                        Err(_) => Err(("request timed out".to_string(), true)),
                    }
                }
            };

            match result {
                Ok(payload) => {
                    self.trace_response(fc, &read_response_pdu(fc, &payload));
                    return Ok(payload);
                }
                Err((e, connection_lost)) => {
                    last_error = e;
                    if connection_lost {
                        // Drop the transport so the next attempt reconnects.
                        self.close().await;
                        if attempt < attempts {
                            sleep(Duration::from_millis(100)).await;
                            if self.connect().await.is_err() {
                                break;
                            }
                        }
                    } else if attempt < attempts {
                        sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }

        Err(format!(
            "ReadFailed: fc={} start={} count={}: {}",
            fc, start, count, last_error
        ))
    }

    /// Execute one queued write with the tag's encoding snapshot. Retries
    /// with the same discipline as reads.
    pub async fn write(&mut self, request: &WriteRequest) -> Result<(), String> {
        self.connect().await?;

        let fc = request.function_code;
        let address = request.address;
        let info = &request.tag_info;

        // Encode outside the retry loop; an encoding error is permanent.
        enum Prepared {
            Coil(bool),
            Coils(Vec<bool>),
            Register(u16),
            Registers(Vec<u16>),
        }

        let prepared = match fc {
            5 => {
                let b = request
                    .value
                    .as_bool()
                    .ok_or_else(|| format!("WriteFailed: {:?} is not a boolean", request.value))?;
                Prepared::Coil(b)
            }
            15 => {
                let bits = match &request.value {
                    TagValue::Array(items) => items
                        .iter()
                        .map(|v| v.as_bool().ok_or_else(|| "non-boolean array element".to_string()))
                        .collect::<Result<Vec<bool>, String>>()
                        .map_err(|e| format!("WriteFailed: {}", e))?,
                    scalar => vec![scalar
                        .as_bool()
                        .ok_or_else(|| format!("WriteFailed: {:?} is not a boolean", scalar))?],
                };
                Prepared::Coils(bits)
            }
            6 => {
                let regs = codec::encode_registers(&request.value, info.data_type, &info.encoding)
                    .map_err(|e| format!("WriteFailed: {}", e))?;
                if regs.len() > 1 {
                    self.emit_diag(format!(
                        "WARNING_FC6_MULTIREG: addr={} {} registers encoded, only the first is written; use FC16 for full precision",
                        address,
                        regs.len()
                    ));
                }
                Prepared::Register(*regs.first().ok_or("WriteFailed: empty encoding")?)
            }
            16 => {
                let regs = codec::encode_registers(&request.value, info.data_type, &info.encoding)
                    .map_err(|e| format!("WriteFailed: {}", e))?;
                if regs.is_empty() {
                    return Err("WriteFailed: empty encoding".to_string());
                }
                Prepared::Registers(regs)
            }
            other => return Err(format!("WriteFailed: unsupported function code {}", other)),
        };

        let request_pdu = match &prepared {
            Prepared::Coil(b) => write_coil_pdu(address, *b),
            Prepared::Coils(bits) => write_coils_pdu(address, bits),
            Prepared::Register(reg) => write_register_pdu(address, *reg),
            Prepared::Registers(regs) => write_registers_pdu(address, regs),
        };
        self.trace_request(fc, &request_pdu);

        let attempts = self.timing.attempts_before_timeout.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let request_timeout = self.timing.request_timeout;
            let ctx = self.ctx.as_mut().ok_or("not connected")?;

            let result: Result<(), (String, bool)> = match &prepared {
                Prepared::Coil(b) => {
                    match timeout(request_timeout, ctx.write_single_coil(address, *b)).await {
                        Ok(Ok(Ok(()))) => Ok(()),
                        Ok(Ok(Err(exc))) => Err((format!("Modbus exception: {}", exc), false)),
                        Ok(Err(e)) => Err((format!("IO error: {}", e), true)),
                        Err(_) => Err(("request timed out".to_string(), true)),
                    }
                }
                Prepared::Coils(bits) => {
                    match timeout(request_timeout, ctx.write_multiple_coils(address, bits)).await {
                        Ok(Ok(Ok(()))) => Ok(()),
                        Ok(Ok(Err(exc))) => Err((format!("Modbus exception: {}", exc), false)),
                        Ok(Err(e)) => Err((format!("IO error: {}", e), true)),
                        Err(_) => Err(("request timed out".to_string(), true)),
                    }
                }
                Prepared::Register(reg) => {
                    match timeout(request_timeout, ctx.write_single_register(address, *reg)).await {
                        Ok(Ok(Ok(()))) => Ok(()),
                        Ok(Ok(Err(exc))) => Err((format!("Modbus exception: {}", exc), false)),
                        Ok(Err(e)) => Err((format!("IO error: {}", e), true)),
                        Err(_) => Err(("request timed out".to_string(), true)),
                    }
                }
                Prepared::Registers(regs) => {
                    match timeout(request_timeout, ctx.write_multiple_registers(address, regs)).await
                    {
                        Ok(Ok(Ok(()))) => Ok(()),
                        Ok(Ok(Err(exc))) => Err((format!("Modbus exception: {}", exc), false)),
                        Ok(Err(e)) => Err((format!("IO error: {}", e), true)),
                        Err(_) => Err(("request timed out".to_string(), true)),
                    }
                }
            };

            match result {
                Ok(()) => {
                    self.trace_response(fc, &write_response_pdu(fc, &request_pdu));
                    return Ok(());
                }
                Err((e, connection_lost)) => {
                    last_error = e;
                    if connection_lost {
                        self.close().await;
                        if attempt < attempts {
                            sleep(Duration::from_millis(100)).await;
                            if self.connect().await.is_err() {
                                break;
                            }
                        }
                    } else if attempt < attempts {
                        sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }

        Err(format!(
            "WriteFailed: fc={} addr={}: {}",
            fc, address, last_error
        ))
    }

    // ------------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------------

    fn emit_diag(&self, text: String) {
        if diagnostics::listener_count() == 0 {
            return;
        }
        let (host, port) = match self.transport.host_port() {
            Some((h, p)) => (Some(h.to_string()), Some(p)),
            None => (None, None),
        };
        diagnostics::emit(
            text,
            DiagContext {
                config_id: self.config_id.clone(),
                unit: Some(self.unit),
                host,
                port,
                transport: Some(self.transport.transport_id().to_string()),
                ..Default::default()
            },
        );
    }

    fn trace_request(&mut self, fc: u8, pdu: &[u8]) {
        self.transaction_id = self.transaction_id.wrapping_add(1);
        self.trace_adu("TX", fc, pdu);
    }

    fn trace_response(&mut self, fc: u8, pdu: &[u8]) {
        self.trace_adu("RX", fc, pdu);
    }

    fn trace_adu(&self, direction: &str, fc: u8, pdu: &[u8]) {
        if diagnostics::listener_count() == 0 {
            return;
        }
        let adu = if self.transport.uses_rtu_framing() {
            frame_rtu(self.unit, pdu)
        } else {
            frame_mbap(self.transaction_id, self.unit, pdu)
        };
        let hex = diagnostics::hex_string(&adu);
        let (host, port) = match self.transport.host_port() {
            Some((h, p)) => (Some(h.to_string()), Some(p)),
            None => (None, None),
        };
        diagnostics::emit(
            format!("[ADU] {}: | {} |", direction, hex),
            DiagContext {
                config_id: self.config_id.clone(),
                direction: Some(direction.to_string()),
                fc: Some(fc),
                unit: Some(self.unit),
                length: Some(adu.len()),
                hex: Some(hex),
                host,
                port,
                transport: Some(self.transport.transport_id().to_string()),
            },
        );
    }
}

async fn resolve(host: &str, port: u16) -> Result<std::net::SocketAddr, String> {
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| format!("failed to resolve {}:{}: {}", host, port, e))?
        .next()
        .ok_or_else(|| format!("no address for {}:{}", host, port))
}

// ============================================================================
// ADU synthesis for the diagnostics trace
// ============================================================================

fn read_request_pdu(fc: u8, start: u16, count: u16) -> Vec<u8> {
    let mut pdu = vec![fc];
    pdu.extend_from_slice(&start.to_be_bytes());
    pdu.extend_from_slice(&count.to_be_bytes());
    pdu
}

fn read_response_pdu(fc: u8, payload: &ReadPayload) -> Vec<u8> {
    let data = match payload {
        ReadPayload::Bits(bits) => coils_to_bytes(bits),
        ReadPayload::Registers(bytes) => bytes.clone(),
    };
    let mut pdu = vec![fc, data.len() as u8];
    pdu.extend_from_slice(&data);
    pdu
}

fn write_coil_pdu(address: u16, value: bool) -> Vec<u8> {
    let mut pdu = vec![0x05];
    pdu.extend_from_slice(&address.to_be_bytes());
    pdu.extend_from_slice(if value { &[0xFF, 0x00] } else { &[0x00, 0x00] });
    pdu
}

fn write_register_pdu(address: u16, value: u16) -> Vec<u8> {
    let mut pdu = vec![0x06];
    pdu.extend_from_slice(&address.to_be_bytes());
    pdu.extend_from_slice(&value.to_be_bytes());
    pdu
}

fn write_coils_pdu(address: u16, bits: &[bool]) -> Vec<u8> {
    let data = coils_to_bytes(bits);
    let mut pdu = vec![0x0F];
    pdu.extend_from_slice(&address.to_be_bytes());
    pdu.extend_from_slice(&(bits.len() as u16).to_be_bytes());
    pdu.push(data.len() as u8);
    pdu.extend_from_slice(&data);
    pdu
}

fn write_registers_pdu(address: u16, regs: &[u16]) -> Vec<u8> {
    let mut pdu = vec![0x10];
    pdu.extend_from_slice(&address.to_be_bytes());
    pdu.extend_from_slice(&(regs.len() as u16).to_be_bytes());
    pdu.push((regs.len() * 2) as u8);
    pdu.extend_from_slice(&registers_to_bytes(regs));
    pdu
}

/// Echo responses for the write function codes: FC5/FC6 echo the request,
/// FC15/FC16 echo address and quantity.
fn write_response_pdu(fc: u8, request_pdu: &[u8]) -> Vec<u8> {
    match fc {
        5 | 6 => request_pdu.to_vec(),
        15 | 16 => request_pdu[..5.min(request_pdu.len())].to_vec(),
        _ => request_pdu.to_vec(),
    }
}

fn frame_mbap(transaction_id: u16, unit: u8, pdu: &[u8]) -> Vec<u8> {
    let mut adu = Vec::with_capacity(7 + pdu.len());
    adu.extend_from_slice(&transaction_id.to_be_bytes());
    adu.extend_from_slice(&[0x00, 0x00]);
    adu.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
    adu.push(unit);
    adu.extend_from_slice(pdu);
    adu
}

fn frame_rtu(unit: u8, pdu: &[u8]) -> Vec<u8> {
    let mut adu = Vec::with_capacity(3 + pdu.len());
    adu.push(unit);
    adu.extend_from_slice(pdu);
    let crc = crc16_modbus(&adu);
    // CRC is transmitted low byte first
    adu.push((crc & 0xFF) as u8);
    adu.push((crc >> 8) as u8);
    adu
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_modbus_test_vector() {
        assert_eq!(crc16_modbus(b"123456789"), 0x4B37);
        assert_eq!(crc16_modbus(&[]), 0xFFFF);
    }

    #[test]
    fn test_registers_to_bytes_big_endian() {
        assert_eq!(registers_to_bytes(&[0x0102, 0xA0B0]), vec![0x01, 0x02, 0xA0, 0xB0]);
    }

    #[test]
    fn test_coils_to_bytes_lsb_first() {
        // Bits 0 and 2 set -> 0b0000_0101
        assert_eq!(coils_to_bytes(&[true, false, true]), vec![0x05]);
        // Ninth coil lands in the second byte
        let mut bits = vec![false; 9];
        bits[8] = true;
        assert_eq!(coils_to_bytes(&bits), vec![0x00, 0x01]);
    }

    #[test]
    fn test_read_request_pdu_layout() {
        assert_eq!(
            read_request_pdu(3, 0x0010, 0x0002),
            vec![0x03, 0x00, 0x10, 0x00, 0x02]
        );
    }

    #[test]
    fn test_rtu_frame_carries_crc_low_byte_first() {
        let adu = frame_rtu(1, &[0x03, 0x00, 0x00, 0x00, 0x02]);
        assert_eq!(adu[0], 0x01);
        let body = &adu[..adu.len() - 2];
        let crc = crc16_modbus(body);
        assert_eq!(adu[adu.len() - 2], (crc & 0xFF) as u8);
        assert_eq!(adu[adu.len() - 1], (crc >> 8) as u8);
    }

    #[test]
    fn test_mbap_frame_layout() {
        let adu = frame_mbap(7, 1, &[0x03, 0x00, 0x00, 0x00, 0x02]);
        // Transaction id, protocol id 0, length = pdu + unit, unit
        assert_eq!(&adu[..7], &[0x00, 0x07, 0x00, 0x00, 0x00, 0x06, 0x01]);
        assert_eq!(adu[7], 0x03);
    }

    #[test]
    fn test_write_registers_pdu_layout() {
        let pdu = write_registers_pdu(9, &[0x4248, 0x0000]);
        assert_eq!(pdu[0], 0x10);
        assert_eq!(&pdu[1..3], &[0x00, 0x09]);
        assert_eq!(&pdu[3..5], &[0x00, 0x02]);
        assert_eq!(pdu[5], 4);
        assert_eq!(&pdu[6..], &[0x42, 0x48, 0x00, 0x00]);
    }
}
