//! Reassembly session state

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of loss positions kept in [`LossStats`].
pub const DEFAULT_LOSS_HISTORY: usize = 1024;

/// Where the state machine is within the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum Phase {
    /// Discarding packets until one opens a frame.
    AwaitingFrameStart,
    /// Placing packets into the current frame buffer.
    FillingFrame,
}

/// Session-wide loss accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LossStats {
    /// Estimated packets lost across all emitted frames.
    pub lost_packet_count: u64,
    /// Stream byte positions at which a lossy frame was closed, oldest first.
    pub lost_byte_positions: VecDeque<u64>,
    history_limit: usize,
}

impl Default for LossStats {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_LOSS_HISTORY)
    }
}

impl LossStats {
    pub fn with_history_limit(history_limit: usize) -> Self {
        Self { lost_packet_count: 0, lost_byte_positions: VecDeque::new(), history_limit }
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    pub(crate) fn record(&mut self, lost_packets: u32, byte_position: u64) {
        if lost_packets == 0 {
            return;
        }
        self.lost_packet_count += u64::from(lost_packets);
        if self.history_limit == 0 {
            return;
        }
        if self.lost_byte_positions.len() == self.history_limit {
            self.lost_byte_positions.pop_front();
        }
        self.lost_byte_positions.push_back(byte_position);
    }
}

/// Mutable state of one reassembly session.
///
/// Owned exclusively by a [`FrameReassembler`](super::FrameReassembler);
/// independent sessions never share it.
#[derive(Debug, Clone)]
pub struct ReassemblyState {
    pub phase: Phase,
    pub current_buffer: Vec<u8>,
    /// Next frame's buffer; receives bytes that overflow the current frame.
    pub spillover_buffer: Vec<u8>,
    /// Valid bytes at the start of `spillover_buffer`.
    pub spillover_len: usize,
    pub packets_seen_since_frame_start: u32,
    /// Sequence number of the first packet placed in the current frame.
    pub frame_start_sequence: Option<u32>,
    /// Stream position of the current frame's first byte.
    pub frame_start_byte_count: u64,
    /// Stream frame index of the current frame (byte counter / frame size).
    pub frame_index: u64,
    /// Payload bytes placed in the current frame.
    pub bytes_filled: usize,
    pub loss: LossStats,
}

impl ReassemblyState {
    pub fn new(bytes_per_frame: usize, loss_history_limit: usize) -> Self {
        Self {
            phase: Phase::AwaitingFrameStart,
            current_buffer: vec![0; bytes_per_frame],
            spillover_buffer: vec![0; bytes_per_frame],
            spillover_len: 0,
            packets_seen_since_frame_start: 0,
            frame_start_sequence: None,
            frame_start_byte_count: 0,
            frame_index: 0,
            bytes_filled: 0,
            loss: LossStats::with_history_limit(loss_history_limit),
        }
    }

    /// Zero the current buffer and open a frame at `start_byte_count`.
    pub(crate) fn begin_frame(&mut self, frame_index: u64, start_byte_count: u64) {
        self.current_buffer.fill(0);
        self.phase = Phase::FillingFrame;
        self.packets_seen_since_frame_start = 0;
        self.frame_start_sequence = None;
        self.frame_start_byte_count = start_byte_count;
        self.frame_index = frame_index;
        self.bytes_filled = 0;
    }

    /// Promote the spillover buffer to the current frame.
    ///
    /// `carried_sequence` is the packet whose tail spilled over, if any.
    pub(crate) fn advance_to_spillover(
        &mut self,
        bytes_per_frame: usize,
        carried_sequence: Option<u32>,
    ) {
        std::mem::swap(&mut self.current_buffer, &mut self.spillover_buffer);
        self.spillover_buffer.fill(0);
        self.phase = Phase::FillingFrame;
        self.frame_index += 1;
        self.frame_start_byte_count = self.frame_index * bytes_per_frame as u64;
        self.bytes_filled = self.spillover_len;
        self.packets_seen_since_frame_start = u32::from(self.spillover_len > 0);
        self.frame_start_sequence = if self.spillover_len > 0 { carried_sequence } else { None };
        self.spillover_len = 0;
    }

    /// Count a packet placed in the current frame.
    pub(crate) fn note_packet(&mut self, sequence_number: u32) {
        if self.frame_start_sequence.is_none() {
            self.frame_start_sequence = Some(sequence_number);
        }
        self.packets_seen_since_frame_start = self.packets_seen_since_frame_start.saturating_add(1);
    }

    /// Drop the current frame and any spilled bytes.
    pub(crate) fn clear(&mut self) {
        self.phase = Phase::AwaitingFrameStart;
        self.current_buffer.fill(0);
        self.spillover_buffer.fill(0);
        self.spillover_len = 0;
        self.packets_seen_since_frame_start = 0;
        self.frame_start_sequence = None;
        self.frame_start_byte_count = 0;
        self.frame_index = 0;
        self.bytes_filled = 0;
    }
}

/// Counter snapshot of a reassembly session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct ReassemblyStats {
    pub packets_received: u64,
    pub malformed_packets: u64,
    /// Packets thrown away while waiting for a frame to open.
    pub discarded_awaiting_start: u64,
    /// Packets whose bytes fell outside the frame buffer, belonged to a
    /// frame already emitted, or carried a byte counter nothing else agreed with.
    pub dropped_writes: u64,
    pub frames_emitted: u64,
    pub lost_packet_count: u64,
    /// Places where the sequence number did not follow its predecessor.
    pub sequence_gaps: u64,
    /// Times the byte counter jumped and placement restarted on the new stream.
    pub resyncs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_history_evicts_oldest() {
        let mut loss = LossStats::with_history_limit(2);
        loss.record(1, 100);
        loss.record(0, 150);
        loss.record(2, 200);
        loss.record(3, 300);

        assert_eq!(loss.lost_packet_count, 6);
        assert_eq!(loss.lost_byte_positions, VecDeque::from(vec![200, 300]));
    }

    #[test]
    fn zero_history_limit_still_counts() {
        let mut loss = LossStats::with_history_limit(0);
        loss.record(4, 10);
        assert_eq!(loss.lost_packet_count, 4);
        assert!(loss.lost_byte_positions.is_empty());
    }

    #[test]
    fn spillover_promotion_carries_partial_packet() {
        let mut state = ReassemblyState::new(8, DEFAULT_LOSS_HISTORY);
        state.begin_frame(0, 0);
        state.spillover_buffer[..3].copy_from_slice(&[7, 8, 9]);
        state.spillover_len = 3;

        state.advance_to_spillover(8, Some(12));
        assert_eq!(state.frame_index, 1);
        assert_eq!(state.frame_start_byte_count, 8);
        assert_eq!(&state.current_buffer[..4], &[7, 8, 9, 0]);
        assert_eq!(state.bytes_filled, 3);
        assert_eq!(state.packets_seen_since_frame_start, 1);
        assert_eq!(state.frame_start_sequence, Some(12));
        assert!(state.spillover_buffer.iter().all(|&b| b == 0));
    }
}
