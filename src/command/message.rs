//! Control message framing
//!
//! Every control message, request or response, uses the same fixed framing:
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       2     Header   5A A5
//! 2       2     Command code (little-endian)
//! 4       2     Length of payload (requests) / status (responses)
//! 6       N     Payload
//! 6+N     2     Footer   AA EE
//! ```

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::CommandCode;
use crate::{CaptureError, Result};

pub const CONFIG_HEADER: [u8; 2] = [0x5A, 0xA5];
pub const CONFIG_FOOTER: [u8; 2] = [0xAA, 0xEE];

/// Header, code, length/status and footer.
pub const FRAMING_LEN: usize = 8;

/// Assemble `HEADER || code || length || payload || FOOTER`.
pub fn encode(code: [u8; 2], length: [u8; 2], payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(FRAMING_LEN + payload.len());
    message.extend_from_slice(&CONFIG_HEADER);
    message.extend_from_slice(&code);
    message.extend_from_slice(&length);
    message.extend_from_slice(payload);
    message.extend_from_slice(&CONFIG_FOOTER);
    message
}

/// Encode from hex literals exactly as the board documentation writes them.
///
/// `encode_hex("0900", "0000", "")` yields `5A A5 09 00 00 00 AA EE`.
pub fn encode_hex(code_hex: &str, length_hex: &str, payload_hex: &str) -> Result<Vec<u8>> {
    let code = decode_field("command code", code_hex)?;
    let length = decode_field("length", length_hex)?;
    let payload = hex::decode(payload_hex)
        .map_err(|e| CaptureError::protocol("payload hex", format!("'{}': {}", payload_hex, e)))?;
    Ok(encode(code, length, &payload))
}

fn decode_field(name: &str, field_hex: &str) -> Result<[u8; 2]> {
    let bytes = hex::decode(field_hex)
        .map_err(|e| {
            CaptureError::protocol(format!("{} hex", name), format!("'{}': {}", field_hex, e))
        })?;
    <[u8; 2]>::try_from(bytes.as_slice()).map_err(|_| {
        CaptureError::protocol(
            format!("{} hex", name),
            format!("'{}' must encode exactly 2 bytes, got {}", field_hex, bytes.len()),
        )
    })
}

/// A request for the control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub code: CommandCode,
    pub payload: Vec<u8>,
}

impl Command {
    pub fn new(code: CommandCode, payload: Vec<u8>) -> Self {
        Self { code, payload }
    }

    /// A command without payload (length field `00 00`).
    pub fn bare(code: CommandCode) -> Self {
        Self { code, payload: Vec::new() }
    }

    pub fn configure_fpga(config: &FpgaConfig) -> Self {
        Self::new(CommandCode::ConfigFpgaGen, config.to_payload().to_vec())
    }

    pub fn configure_packets(config: &PacketTimingConfig) -> Self {
        Self::new(CommandCode::ConfigPacketData, config.to_payload().to_vec())
    }

    /// Wire bytes with the length field derived from the payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let length = u16::try_from(self.payload.len()).map_err(|_| {
            CaptureError::protocol(
                "command encoding",
                format!("payload of {} bytes exceeds the 16-bit length field", self.payload.len()),
            )
        })?;
        Ok(encode(self.code.to_le_bytes(), length.to_le_bytes(), &self.payload))
    }
}

/// Reply received on the control channel.
///
/// The board echoes the command code and replaces the length field with a
/// status word. Replies that do not follow the framing are kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    raw: Vec<u8>,
    framed: Option<FramedResponse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FramedResponse {
    code: u16,
    status: u16,
}

impl CommandResponse {
    pub fn parse(raw: Vec<u8>) -> Self {
        let framed = if raw.len() >= FRAMING_LEN
            && raw[..2] == CONFIG_HEADER
            && raw[raw.len() - 2..] == CONFIG_FOOTER
        {
            Some(FramedResponse {
                code: u16::from_le_bytes([raw[2], raw[3]]),
                status: u16::from_le_bytes([raw[4], raw[5]]),
            })
        } else {
            trace!("Control reply without standard framing ({} bytes)", raw.len());
            None
        };
        Self { raw, framed }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn is_framed(&self) -> bool {
        self.framed.is_some()
    }

    /// Echoed command code, if the reply was framed and the code is known.
    pub fn command(&self) -> Option<CommandCode> {
        self.framed.and_then(|f| CommandCode::from_value(f.code))
    }

    /// Status word (0 means success for most commands).
    pub fn status(&self) -> Option<u16> {
        self.framed.map(|f| f.status)
    }

    pub fn is_success(&self) -> bool {
        self.status() == Some(0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.raw)
    }

    /// Fail unless this is a framed success reply to `expected`.
    pub fn ensure_success(&self, expected: CommandCode) -> Result<()> {
        match self.framed {
            Some(framed) if framed.code == expected.value() && framed.status == 0 => Ok(()),
            Some(framed) => Err(CaptureError::protocol(
                format!("{} reply", expected),
                format!("code {:#06x}, status {:#06x}", framed.code, framed.status),
            )),
            None => Err(CaptureError::protocol(
                format!("{} reply", expected),
                format!("unframed reply {}", self.to_hex()),
            )),
        }
    }
}

/// FPGA version reported in the status word of `READ_FPGA_VERSION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct FpgaVersion {
    pub major: u16,
    pub minor: u16,
    pub playback_mode: bool,
}

impl FpgaVersion {
    pub fn from_status(status: u16) -> Self {
        Self {
            major: status & 0x7F,
            minor: (status >> 7) & 0x7F,
            playback_mode: status & 0x4000 != 0,
        }
    }
}

/// Payload of `CONFIG_FPGA_GEN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(default)]
pub struct FpgaConfig {
    /// 1 = raw, 2 = multi-mode.
    pub logging_mode: u8,
    /// 1 = four LVDS lanes, 2 = two lanes.
    pub lvds_mode: u8,
    /// 1 = LVDS capture, 2 = playback.
    pub transfer_mode: u8,
    /// 1 = SD card, 2 = ethernet streaming.
    pub capture_mode: u8,
    /// 1 = 12 bit, 2 = 14 bit, 3 = 16 bit.
    pub data_format: u8,
    /// Seconds the board waits for LVDS data.
    pub timer: u8,
}

impl Default for FpgaConfig {
    fn default() -> Self {
        Self {
            logging_mode: 1,
            lvds_mode: 2,
            transfer_mode: 1,
            capture_mode: 2,
            data_format: 3,
            timer: 30,
        }
    }
}

impl FpgaConfig {
    pub fn to_payload(&self) -> [u8; 6] {
        [
            self.logging_mode,
            self.lvds_mode,
            self.transfer_mode,
            self.capture_mode,
            self.data_format,
            self.timer,
        ]
    }
}

/// Payload of `CONFIG_PACKET_DATA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(default)]
pub struct PacketTimingConfig {
    /// Ethernet packet size the board emits.
    pub packet_size: u16,
    /// Inter-packet delay in 8 ns ticks.
    pub packet_delay_ticks: u16,
}

impl Default for PacketTimingConfig {
    fn default() -> Self {
        Self { packet_size: 1470, packet_delay_ticks: 3125 }
    }
}

impl PacketTimingConfig {
    /// Convert a delay in microseconds to board ticks, saturating at the field width.
    pub fn with_delay_us(packet_size: u16, delay_us: u32) -> Self {
        let ticks = delay_us.saturating_mul(125).min(u32::from(u16::MAX));
        Self { packet_size, packet_delay_ticks: ticks as u16 }
    }

    pub fn to_payload(&self) -> [u8; 6] {
        let size = self.packet_size.to_le_bytes();
        let delay = self.packet_delay_ticks.to_le_bytes();
        [size[0], size[1], delay[0], delay[1], 0x00, 0x00]
    }
}
