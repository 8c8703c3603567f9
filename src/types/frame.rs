//! Completed frame type

use serde::{Deserialize, Serialize};

use super::FrameGeometry;
use crate::Result;
use crate::organize::{OrganizedFrame, organize_frame};

/// A frame handed out by the reassembler.
///
/// The buffer is moved out of the reassembler on completion; nothing else
/// holds a reference to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    /// Raw ADC bytes, `bytes_per_frame` long. Slots of lost packets are zero.
    pub data: Vec<u8>,

    /// Position of this frame in the session, starting at 0.
    pub frame_number: u64,

    /// Sequence number of the packet that opened the frame.
    pub start_sequence: u32,

    /// Stream position of the frame's first byte.
    pub start_byte_count: u64,

    /// Packets that contributed to the frame.
    pub packets_received: u32,

    /// Estimated number of packets missing from the frame.
    pub lost_packets: u32,
}

impl CapturedFrame {
    /// Whether every expected packet arrived.
    pub fn is_complete(&self) -> bool {
        self.lost_packets == 0
    }

    /// Decode the buffer as little-endian signed 16-bit samples.
    pub fn samples(&self) -> Vec<i16> {
        self.data.chunks_exact(2).map(|pair| i16::from_le_bytes([pair[0], pair[1]])).collect()
    }

    /// Loss metadata without the sample buffer.
    pub fn loss_report(&self) -> LossReport {
        LossReport {
            frame_number: self.frame_number,
            start_sequence: self.start_sequence,
            packets_received: self.packets_received,
            lost_packets: self.lost_packets,
        }
    }

    /// Deinterleave and regroup into virtual channels.
    pub fn organize(&self, geometry: &FrameGeometry) -> Result<OrganizedFrame> {
        organize_frame(self, geometry)
    }
}

/// Per-frame loss summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct LossReport {
    pub frame_number: u64,
    pub start_sequence: u32,
    pub packets_received: u32,
    pub lost_packets: u32,
}
