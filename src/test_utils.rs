//! Synthetic capture traffic for tests and benchmarks.
//!
//! [`SyntheticStream`] emits packets the way the board does: sequence numbers
//! from 1, a byte counter starting at 0, and payload bytes derived from their
//! stream position so any reassembled frame can be checked with
//! [`expected_frame`].

#![cfg(any(test, feature = "benchmark"))]

use crate::packet::{ReplaySource, encode_datagram};
use crate::types::DataPacket;

/// Payload byte at an absolute stream position.
pub fn pattern_byte(position: u64) -> u8 {
    (position % 251) as u8
}

/// Bytes the board streams for frame `frame_index` of `bytes_per_frame` bytes.
pub fn expected_frame(bytes_per_frame: usize, frame_index: u64) -> Vec<u8> {
    let start = frame_index * bytes_per_frame as u64;
    (start..start + bytes_per_frame as u64).map(pattern_byte).collect()
}

/// Generator of well-formed data packets.
#[derive(Debug, Clone)]
pub struct SyntheticStream {
    bytes_per_packet: usize,
    next_sequence: u32,
    next_byte_count: u64,
}

impl SyntheticStream {
    pub fn new(bytes_per_packet: usize) -> Self {
        Self::starting_at(bytes_per_packet, 1, 0)
    }

    pub fn starting_at(bytes_per_packet: usize, sequence_number: u32, byte_count: u64) -> Self {
        Self { bytes_per_packet, next_sequence: sequence_number, next_byte_count: byte_count }
    }

    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    pub fn next_byte_count(&self) -> u64 {
        self.next_byte_count
    }

    pub fn next_packet(&mut self) -> DataPacket {
        let start = self.next_byte_count;
        let payload = (start..start + self.bytes_per_packet as u64).map(pattern_byte).collect();
        let packet = DataPacket::new(self.next_sequence, start, payload);
        self.skip(1);
        packet
    }

    pub fn packets(&mut self, count: usize) -> Vec<DataPacket> {
        (0..count).map(|_| self.next_packet()).collect()
    }

    /// Advance past `count` packets without producing them.
    pub fn skip(&mut self, count: usize) {
        self.next_sequence = self.next_sequence.wrapping_add(count as u32);
        self.next_byte_count += (count * self.bytes_per_packet) as u64;
    }

    /// Encoded datagrams for the next `count` packets.
    pub fn datagrams(&mut self, count: usize) -> Vec<Vec<u8>> {
        self.packets(count).iter().map(to_datagram).collect()
    }
}

pub fn to_datagram(packet: &DataPacket) -> Vec<u8> {
    encode_datagram(packet.sequence_number, packet.byte_count, &packet.payload)
}

/// Replay source yielding `packets` in order.
pub fn replay_source<I: IntoIterator<Item = DataPacket>>(packets: I) -> ReplaySource {
    packets.into_iter().map(|packet| to_datagram(&packet)).collect()
}

/// Raw samples `0, 1, 2, ...` wrapping at `i16::MAX`.
pub fn ramp_samples(count: usize) -> Vec<i16> {
    (0..count).map(|i| (i % i16::MAX as usize) as i16).collect()
}

/// Little-endian byte encoding of `samples`.
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
