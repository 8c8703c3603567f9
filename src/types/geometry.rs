//! Frame and packet geometry

use serde::{Deserialize, Serialize};

use crate::{CaptureError, Result};

/// Size in bytes of the data packet header (sequence number + byte count).
pub const DATA_HEADER_LEN: usize = 10;

/// Radar frame geometry as configured on the front end.
///
/// One frame holds `chirps` chirp loops, each loop firing every transmit
/// antenna once, sampled on every receive channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct FrameGeometry {
    pub chirps: u32,
    pub rx_channels: u32,
    pub tx_channels: u32,
    pub samples_per_chirp: u32,
    #[serde(default = "default_iq_components")]
    pub iq_components: u32,
    #[serde(default = "default_bytes_per_sample")]
    pub bytes_per_sample: u32,
}

fn default_iq_components() -> u32 {
    2
}

fn default_bytes_per_sample() -> u32 {
    2
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self {
            chirps: 128,
            rx_channels: 4,
            tx_channels: 3,
            samples_per_chirp: 128,
            iq_components: 2,
            bytes_per_sample: 2,
        }
    }
}

impl FrameGeometry {
    /// Create a complex 16-bit geometry, validating every dimension.
    pub fn new(
        chirps: u32,
        rx_channels: u32,
        tx_channels: u32,
        samples_per_chirp: u32,
    ) -> Result<Self> {
        let geometry = Self {
            chirps,
            rx_channels,
            tx_channels,
            samples_per_chirp,
            iq_components: 2,
            bytes_per_sample: 2,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Check all dimensions are non-zero and the frame size fits in 64 bits.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("chirps", self.chirps),
            ("rx_channels", self.rx_channels),
            ("tx_channels", self.tx_channels),
            ("samples_per_chirp", self.samples_per_chirp),
            ("iq_components", self.iq_components),
            ("bytes_per_sample", self.bytes_per_sample),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(CaptureError::invalid_geometry(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        self.checked_bytes_per_frame()
            .map(|_| ())
            .ok_or_else(|| CaptureError::invalid_geometry("bytes per frame overflows 64 bits"))
    }

    fn checked_bytes_per_frame(&self) -> Option<u64> {
        [
            self.rx_channels,
            self.tx_channels,
            self.iq_components,
            self.samples_per_chirp,
            self.bytes_per_sample,
        ]
            .into_iter()
            .try_fold(u64::from(self.chirps), |acc, dim| acc.checked_mul(u64::from(dim)))
    }

    /// Total frame size in bytes: `chirps * rx * tx * iq * samples * bytes`.
    pub fn bytes_per_frame(&self) -> u64 {
        self.checked_bytes_per_frame().unwrap_or(u64::MAX)
    }

    /// Number of raw integer samples (I and Q counted separately) in a frame.
    pub fn raw_samples_per_frame(&self) -> u64 {
        self.bytes_per_frame() / u64::from(self.bytes_per_sample)
    }

    /// Number of complex samples in a frame.
    pub fn complex_samples_per_frame(&self) -> u64 {
        self.raw_samples_per_frame() / u64::from(self.iq_components)
    }

    /// Physical chirps per frame, counting each transmit antenna separately.
    pub fn physical_chirps(&self) -> usize {
        self.chirps as usize * self.tx_channels as usize
    }

    /// Receive x transmit virtual channels.
    pub fn virtual_channels(&self) -> usize {
        self.rx_channels as usize * self.tx_channels as usize
    }
}

/// Datagram sizing of the data channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct PacketGeometry {
    /// Receive buffer size for one datagram.
    pub max_datagram_size: usize,
    /// Payload bytes the board puts in every full packet.
    pub bytes_per_packet: usize,
}

impl Default for PacketGeometry {
    fn default() -> Self {
        Self { max_datagram_size: 4096, bytes_per_packet: 1456 }
    }
}

impl PacketGeometry {
    pub fn validate(&self) -> Result<()> {
        if self.bytes_per_packet == 0 {
            return Err(CaptureError::invalid_geometry(
                "bytes_per_packet must be greater than zero",
            ));
        }
        if self.max_datagram_size < DATA_HEADER_LEN + self.bytes_per_packet {
            return Err(CaptureError::invalid_geometry(format!(
                "max_datagram_size {} cannot hold a {}-byte header plus {} payload bytes",
                self.max_datagram_size, DATA_HEADER_LEN, self.bytes_per_packet
            )));
        }
        Ok(())
    }
}

/// How packet payloads map onto frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum ReassemblyMode {
    /// Frame size is a whole number of packets.
    Clipped,
    /// A packet payload may straddle two frames.
    Spanning,
}

/// Frame and packet geometry resolved against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    bytes_per_frame: usize,
    bytes_per_packet: usize,
    packets_per_frame_floor: usize,
    frame_remainder_bytes: usize,
}

impl FrameLayout {
    pub fn new(frame: &FrameGeometry, packet: &PacketGeometry) -> Result<Self> {
        frame.validate()?;
        packet.validate()?;

        let bytes_per_frame = usize::try_from(frame.bytes_per_frame()).map_err(|_| {
            CaptureError::invalid_geometry(format!(
                "{} bytes per frame does not fit in memory on this platform",
                frame.bytes_per_frame()
            ))
        })?;
        let bytes_per_packet = packet.bytes_per_packet;

        let packets_per_frame_floor = bytes_per_frame / bytes_per_packet;
        if packets_per_frame_floor == 0 {
            return Err(CaptureError::invalid_geometry(format!(
                "packet payload ({} bytes) is larger than a frame ({} bytes)",
                bytes_per_packet, bytes_per_frame
            )));
        }

        Ok(Self {
            bytes_per_frame,
            bytes_per_packet,
            packets_per_frame_floor,
            frame_remainder_bytes: bytes_per_frame % bytes_per_packet,
        })
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_frame
    }

    pub fn bytes_per_packet(&self) -> usize {
        self.bytes_per_packet
    }

    /// Whole packets per frame (`bytes_per_frame / bytes_per_packet`).
    pub fn packets_per_frame_floor(&self) -> usize {
        self.packets_per_frame_floor
    }

    pub fn frame_remainder_bytes(&self) -> usize {
        self.frame_remainder_bytes
    }

    /// Frame size rounded down to a whole number of packets.
    pub fn bytes_per_frame_aligned(&self) -> usize {
        self.packets_per_frame_floor * self.bytes_per_packet
    }

    pub fn mode(&self) -> ReassemblyMode {
        if self.frame_remainder_bytes == 0 {
            ReassemblyMode::Clipped
        } else {
            ReassemblyMode::Spanning
        }
    }
}
