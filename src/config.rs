//! Capture session configuration.
//!
//! Every field has a default matching the board's factory network setup and
//! a common radar profile, so an empty document is a valid configuration:
//!
//! ```yaml
//! network:
//!   host_ip: 192.168.33.30
//!   device_ip: 192.168.33.180
//!   config_port: 4096
//!   data_port: 4098
//! frame:
//!   chirps: 128
//!   rx_channels: 4
//!   tx_channels: 3
//!   samples_per_chirp: 128
//! packet:
//!   max_datagram_size: 4096
//!   bytes_per_packet: 1456
//! timeouts:
//!   command_ms: 1000
//!   read_ms: 1000
//! ```

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::command::{FpgaConfig, PacketTimingConfig};
use crate::reassembly::DEFAULT_LOSS_HISTORY;
use crate::types::{DATA_HEADER_LEN, FrameGeometry, FrameLayout, PacketGeometry};
use crate::{CaptureError, Result};

/// Addresses and ports of the host and the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// Static address of the host NIC facing the board.
    pub host_ip: IpAddr,
    pub device_ip: IpAddr,
    /// Control port, used on both ends.
    pub config_port: u16,
    /// Host port the board streams data to.
    pub data_port: u16,
    /// Kernel receive buffer requested for the data socket.
    pub recv_buffer_size: Option<usize>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 33, 30)),
            device_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 33, 180)),
            config_port: 4096,
            data_port: 4098,
            recv_buffer_size: Some(8 * 1024 * 1024),
        }
    }
}

impl NetworkConfig {
    pub fn host_control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host_ip, self.config_port)
    }

    pub fn host_data_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host_ip, self.data_port)
    }

    pub fn device_control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.device_ip, self.config_port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Bound on one control exchange.
    pub command_ms: u64,
    /// Bound on one frame pull.
    pub read_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { command_ms: 1000, read_ms: 1000 }
    }
}

impl TimeoutConfig {
    pub fn command(&self) -> Duration {
        Duration::from_millis(self.command_ms)
    }

    pub fn read(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }
}

/// Everything needed to open a capture session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    pub network: NetworkConfig,
    pub frame: FrameGeometry,
    pub packet: PacketGeometry,
    pub timeouts: TimeoutConfig,
    pub fpga: FpgaConfig,
    pub packet_timing: PacketTimingConfig,
    pub loss_history: LossHistory,
}

/// Number of loss positions kept per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LossHistory(pub usize);

impl Default for LossHistory {
    fn default() -> Self {
        Self(DEFAULT_LOSS_HISTORY)
    }
}

impl CaptureConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)
            .map_err(|e| CaptureError::config(format!("YAML parse failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| CaptureError::File { path: path.to_path_buf(), source: e })?;
        debug!("Loaded capture configuration from {}", path.display());
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml_ng::to_string(self)
            .map_err(|e| CaptureError::config(format!("YAML encode failed: {}", e)))
    }

    /// Check the configuration is usable, returning the resolved frame layout.
    pub fn validate(&self) -> Result<FrameLayout> {
        let layout = FrameLayout::new(&self.frame, &self.packet)?;

        if self.timeouts.command_ms == 0 || self.timeouts.read_ms == 0 {
            return Err(CaptureError::config("timeouts must be greater than zero"));
        }
        if self.network.config_port == 0 || self.network.data_port == 0 {
            return Err(CaptureError::config("ports must be non-zero"));
        }
        if self.network.config_port == self.network.data_port {
            return Err(CaptureError::config(format!(
                "config_port and data_port must differ (both {})",
                self.network.config_port
            )));
        }

        let datagram = usize::from(self.packet_timing.packet_size);
        if self.packet.bytes_per_packet + DATA_HEADER_LEN > datagram {
            warn!(
                "bytes_per_packet {} plus the {}-byte header exceeds the board packet size {}",
                self.packet.bytes_per_packet, DATA_HEADER_LEN, datagram
            );
        }
        Ok(layout)
    }

    pub fn layout(&self) -> Result<FrameLayout> {
        FrameLayout::new(&self.frame, &self.packet)
    }
}
