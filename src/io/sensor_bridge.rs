//! Serial sensor bridge
//!
//! A microcontroller owns the ultrasonic sensor, the IR inputs, the gate servo
//! PWM and the LCD; the controller talks to it over a serial link.
//!
//! Protocol:
//! - Command frame: [0x7E][seq][cmd][len][data...][checksum]
//! - Response frame: [0x7F][seq][cmd][len][data...][checksum]
//! - Checksum: sum all preceding bytes, bitwise NOT
//! - Responses echo the command's seq and cmd; anything else is stale

use crate::domain::types::SlotIndex;
use crate::infra::config::Config;
use crate::io::display::{fit_line, Display, DisplayError, LINE_WIDTH};
use crate::io::hardware::{distance_from_echo_us, presence_from_level, BayHardware, SensorError};
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, trace, warn};

// Protocol constants
const START_BYTE_COMMAND: u8 = 0x7E;
const START_BYTE_RESPONSE: u8 = 0x7F;
const CMD_ECHO: u8 = 0x11;
const CMD_PRESENCE: u8 = 0x12;
const CMD_SERVO: u8 = 0x20;
const CMD_LCD: u8 = 0x30;
const HEADER_LEN: usize = 4;
const MAX_DATA_LEN: usize = 32;

/// ECHO reply status byte: sensor saw no echo within its own window
const ECHO_STATUS_TIMEOUT: u8 = 0x01;

/// Checksum: sum all bytes, bitwise NOT
fn checksum(bytes: &[u8]) -> u8 {
    !bytes.iter().fold(0u8, |acc, &x| acc.wrapping_add(x))
}

/// Build a host->bridge command frame
pub fn build_command(seq: u8, cmd: u8, data: &[u8]) -> Vec<u8> {
    debug_assert!(data.len() <= MAX_DATA_LEN);
    let mut frame = Vec::with_capacity(HEADER_LEN + data.len() + 1);
    frame.push(START_BYTE_COMMAND);
    frame.push(seq);
    frame.push(cmd);
    frame.push(data.len() as u8);
    frame.extend_from_slice(data);
    frame.push(checksum(&frame));
    frame
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub seq: u8,
    pub cmd: u8,
    pub data: Vec<u8>,
}

/// Serial link plus the persistent read buffer.
///
/// Replies can arrive in chunks, so partial data is kept for the next read.
struct BridgeLink<S> {
    port: S,
    seq: u8,
    read_buffer: Vec<u8>,
    timeout: Duration,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> BridgeLink<S> {
    fn new(port: S, timeout: Duration) -> Self {
        Self { port, seq: 0, read_buffer: Vec::with_capacity(64), timeout }
    }

    /// Discard any bytes before the next response start byte
    fn synchronize_buffer(&mut self) {
        match self.read_buffer.iter().position(|&b| b == START_BYTE_RESPONSE) {
            Some(0) => {}
            Some(start_idx) => {
                debug!(discarded = start_idx, "bridge_sync_discarded_bytes");
                self.read_buffer.drain(..start_idx);
            }
            None => {
                if !self.read_buffer.is_empty() {
                    debug!(discarded = self.read_buffer.len(), "bridge_sync_no_start_byte");
                    self.read_buffer.clear();
                }
            }
        }
    }

    /// Extract the next complete, valid frame from the buffer, if any.
    /// Corrupt frames are skipped one byte at a time.
    fn take_frame(&mut self) -> Option<ResponseFrame> {
        loop {
            self.synchronize_buffer();
            if self.read_buffer.len() < HEADER_LEN {
                return None;
            }

            let data_len = self.read_buffer[3] as usize;
            if data_len > MAX_DATA_LEN {
                warn!(len = data_len, "bridge_invalid_length");
                self.read_buffer.drain(..1);
                continue;
            }

            let total_len = HEADER_LEN + data_len + 1;
            if self.read_buffer.len() < total_len {
                return None;
            }

            let frame = &self.read_buffer[..total_len];
            let sum: u8 = frame.iter().fold(0u8, |acc, &x| acc.wrapping_add(x));
            if sum.wrapping_add(1) != 0 {
                warn!(
                    checksum_error = true,
                    raw_bytes = %hex::encode(frame),
                    "bridge_checksum_failed"
                );
                self.read_buffer.drain(..1);
                continue;
            }

            let response = ResponseFrame {
                seq: frame[1],
                cmd: frame[2],
                data: frame[HEADER_LEN..HEADER_LEN + data_len].to_vec(),
            };
            self.read_buffer.drain(..total_len);
            return Some(response);
        }
    }

    /// Send one command and wait for its matching reply
    async fn request(&mut self, cmd: u8, data: &[u8]) -> Result<Vec<u8>, SensorError> {
        self.seq = self.seq.wrapping_add(1);
        let seq = self.seq;
        let frame = build_command(seq, cmd, data);
        let timeout = self.timeout;

        let exchange = async {
            self.port.write_all(&frame).await?;
            let mut temp_buf = [0u8; 64];
            loop {
                while let Some(response) = self.take_frame() {
                    if response.seq == seq && response.cmd == cmd {
                        return Ok(response.data);
                    }
                    debug!(seq = response.seq, cmd = response.cmd, "bridge_stale_response");
                }
                let n = self.port.read(&mut temp_buf).await?;
                if n == 0 {
                    return Err(SensorError::Io(std::io::ErrorKind::UnexpectedEof.into()));
                }
                self.read_buffer.extend_from_slice(&temp_buf[..n]);
            }
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                trace!(cmd = cmd, seq = seq, "bridge_request_timeout");
                Err(SensorError::Timeout)
            }
        }
    }
}

/// Bay hardware backed by the serial sensor bridge
pub struct SensorBridge<S = SerialStream> {
    link: Arc<Mutex<BridgeLink<S>>>,
    slot_count: usize,
    active_low: bool,
    open_duty: u8,
    closed_duty: u8,
}

impl SensorBridge<SerialStream> {
    /// Open the configured serial port. Failure is a fatal startup error.
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        let port = tokio_serial::new(config.serial_device(), config.serial_baud())
            .timeout(Duration::from_millis(config.hardware_timeout_ms()))
            .open_native_async()
            .with_context(|| {
                format!("Failed to open sensor bridge on {}", config.serial_device())
            })?;

        info!(
            device = %config.serial_device(),
            baud = %config.serial_baud(),
            "bridge_port_opened"
        );
        Ok(Self::with_port(port, config))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> SensorBridge<S> {
    pub fn with_port(port: S, config: &Config) -> Self {
        let timeout = Duration::from_millis(config.hardware_timeout_ms());
        Self {
            link: Arc::new(Mutex::new(BridgeLink::new(port, timeout))),
            slot_count: config.slot_count(),
            active_low: config.ir_active_low(),
            open_duty: config.gate_open_duty(),
            closed_duty: config.gate_closed_duty(),
        }
    }

    /// LCD driven over the same link
    pub fn display(&self) -> BridgeDisplay<S> {
        BridgeDisplay { link: self.link.clone() }
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Unpin + Send> BayHardware for SensorBridge<S> {
    async fn read_distance_cm(&mut self) -> Result<f64, SensorError> {
        let data = self.link.lock().await.request(CMD_ECHO, &[]).await?;
        let [lo, hi, status] = data[..] else {
            return Err(SensorError::Protocol(format!("echo reply of {} bytes", data.len())));
        };
        if status == ECHO_STATUS_TIMEOUT {
            return Err(SensorError::Timeout);
        }
        distance_from_echo_us(u16::from_le_bytes([lo, hi])).ok_or(SensorError::Timeout)
    }

    async fn read_presence(&mut self, slot: SlotIndex) -> Result<bool, SensorError> {
        if slot.0 >= self.slot_count {
            return Err(SensorError::NoSuchSlot(slot));
        }
        let data = self.link.lock().await.request(CMD_PRESENCE, &[slot.0 as u8]).await?;
        let [level] = data[..] else {
            return Err(SensorError::Protocol(format!("presence reply of {} bytes", data.len())));
        };
        Ok(presence_from_level(level != 0, self.active_low))
    }

    async fn set_gate(&mut self, open: bool) -> Result<(), SensorError> {
        let duty = if open { self.open_duty } else { self.closed_duty };
        let data = self.link.lock().await.request(CMD_SERVO, &[duty]).await?;
        if data[..] != [duty] {
            return Err(SensorError::Protocol(format!("servo ack {:?} for duty {duty}", data)));
        }
        Ok(())
    }
}

/// The bridge's 16x2 LCD
pub struct BridgeDisplay<S = SerialStream> {
    link: Arc<Mutex<BridgeLink<S>>>,
}

/// Two space-padded ASCII lines, non-ASCII replaced with '?'
fn lcd_payload(line1: &str, line2: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(LINE_WIDTH * 2);
    for line in [line1, line2] {
        let mut bytes: Vec<u8> =
            fit_line(line).chars().map(|c| if c.is_ascii() { c as u8 } else { b'?' }).collect();
        bytes.resize(LINE_WIDTH, b' ');
        payload.extend_from_slice(&bytes);
    }
    payload
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Unpin + Send> Display for BridgeDisplay<S> {
    async fn show(&mut self, line1: &str, line2: &str) -> Result<(), DisplayError> {
        let payload = lcd_payload(line1, line2);
        match self.link.lock().await.request(CMD_LCD, &payload).await {
            Ok(_) => Ok(()),
            Err(SensorError::Timeout) => Err(DisplayError::Timeout),
            Err(e) => Err(DisplayError::Link(e.to_string())),
        }
    }
}
