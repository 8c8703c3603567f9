//! Frame reassembly state machine

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::state::{DEFAULT_LOSS_HISTORY, LossStats, Phase, ReassemblyState, ReassemblyStats};
use crate::packet::PacketSource;
use crate::types::{CapturedFrame, DataPacket, FrameLayout, ReassemblyMode};
use crate::{CaptureError, Result};

/// Whole frames a spanning packet may skip ahead before its byte counter
/// needs a second packet to confirm it.
const MAX_FRAME_SKIP: u64 = 32;

/// Turns a lossy packet stream into fixed-size frames.
///
/// Packets are pushed one at a time. A frame is handed out when the board's
/// byte counter shows the next frame has begun (or, in spanning mode, when
/// the frame's last byte arrives). Missing packets leave zeroed gaps and are
/// counted, never reported as errors.
#[derive(Debug)]
pub struct FrameReassembler {
    layout: FrameLayout,
    state: ReassemblyState,
    stats: ReassemblyStats,
    last_sequence: Option<u32>,
    /// Spanning packet whose byte counter disagreed with the current frame.
    unplaced: Option<DataPacket>,
    ready: VecDeque<CapturedFrame>,
}

impl FrameReassembler {
    pub fn new(layout: FrameLayout) -> Self {
        Self::with_loss_history(layout, DEFAULT_LOSS_HISTORY)
    }

    pub fn with_loss_history(layout: FrameLayout, loss_history_limit: usize) -> Self {
        debug!(
            "Reassembler ready: {:?} mode, {} bytes/frame, {} bytes/packet, {} whole packets/frame",
            layout.mode(),
            layout.bytes_per_frame(),
            layout.bytes_per_packet(),
            layout.packets_per_frame_floor()
        );
        Self {
            state: ReassemblyState::new(layout.bytes_per_frame(), loss_history_limit),
            layout,
            stats: ReassemblyStats::default(),
            last_sequence: None,
            unplaced: None,
            ready: VecDeque::new(),
        }
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    pub fn mode(&self) -> ReassemblyMode {
        self.layout.mode()
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn state(&self) -> &ReassemblyState {
        &self.state
    }

    pub fn loss(&self) -> &LossStats {
        &self.state.loss
    }

    pub fn stats(&self) -> ReassemblyStats {
        ReassemblyStats {
            lost_packet_count: self.state.loss.lost_packet_count,
            ..self.stats.clone()
        }
    }

    /// Count a datagram that could not be parsed.
    pub fn record_malformed(&mut self) {
        self.stats.malformed_packets += 1;
    }

    /// Feed one packet, returning a frame if one completed.
    ///
    /// In rare cases a single packet completes two frames; the second is kept
    /// and returned by [`take_ready`](Self::take_ready) or the next `push`.
    pub fn push(&mut self, packet: DataPacket) -> Option<CapturedFrame> {
        self.stats.packets_received += 1;
        self.track_sequence(packet.sequence_number);

        match self.layout.mode() {
            ReassemblyMode::Clipped => self.push_clipped(packet),
            ReassemblyMode::Spanning => self.push_spanning(packet),
        }
        self.ready.pop_front()
    }

    /// Next completed frame not yet handed out.
    pub fn take_ready(&mut self) -> Option<CapturedFrame> {
        self.ready.pop_front()
    }

    /// Close the frame in progress, however incomplete.
    ///
    /// Call repeatedly until `None` to drain everything at session end.
    pub fn flush(&mut self) -> Option<CapturedFrame> {
        self.discard_unplaced();
        if self.state.phase == Phase::FillingFrame {
            let closing_position = self.state.frame_start_byte_count + self.frame_span();
            self.emit_current(closing_position);
            self.state.clear();
        }
        self.ready.pop_front()
    }

    /// Discard the frame in progress and wait for the next frame start.
    ///
    /// Counters and loss history are kept.
    pub fn reset(&mut self) {
        debug!("Reassembler reset ({} pending frames dropped)", self.ready.len());
        self.state.clear();
        self.ready.clear();
        self.unplaced = None;
        self.last_sequence = None;
    }

    fn track_sequence(&mut self, sequence_number: u32) {
        if let Some(previous) = self.last_sequence {
            if sequence_number != previous.wrapping_add(1) {
                self.stats.sequence_gaps += 1;
                debug!("Sequence gap: {} followed by {}", previous, sequence_number);
            }
        }
        self.last_sequence = Some(sequence_number);
    }

    fn push_clipped(&mut self, packet: DataPacket) {
        let aligned = self.layout.bytes_per_frame_aligned() as u64;
        let boundary = packet.byte_count % aligned == 0;

        match (self.state.phase, boundary) {
            (Phase::AwaitingFrameStart, false) => {
                self.stats.discarded_awaiting_start += 1;
                trace!("Discarding seq={} while awaiting frame start", packet.sequence_number);
            }
            (phase, true) => {
                if phase == Phase::FillingFrame {
                    self.emit_current(packet.byte_count);
                }
                self.state.begin_frame(packet.byte_count / aligned, packet.byte_count);
                self.write_current(0, &packet.payload);
                self.state.note_packet(packet.sequence_number);
            }
            (Phase::FillingFrame, false) => {
                let floor = self.layout.packets_per_frame_floor() as i64;
                let slot = (i64::from(packet.sequence_number) - 1).rem_euclid(floor) as usize;
                self.write_current(slot * self.layout.bytes_per_packet(), &packet.payload);
                self.state.note_packet(packet.sequence_number);
            }
        }
    }

    fn push_spanning(&mut self, packet: DataPacket) {
        let bytes_per_frame = self.layout.bytes_per_frame();
        let frame_index = packet.byte_count / bytes_per_frame as u64;
        let offset = (packet.byte_count % bytes_per_frame as u64) as usize;

        match self.state.phase {
            Phase::AwaitingFrameStart => {
                if offset == 0 {
                    self.state.begin_frame(frame_index, packet.byte_count);
                    self.place_spanning(&packet, 0);
                } else if packet.end_byte_count() > (frame_index + 1) * bytes_per_frame as u64 {
                    // Only the tail belongs to a frame we can capture whole.
                    let head = bytes_per_frame - offset;
                    let next = frame_index + 1;
                    self.state.begin_frame(next, next * bytes_per_frame as u64);
                    self.place_spanning_tail(&packet, head);
                } else {
                    self.stats.discarded_awaiting_start += 1;
                    trace!("Discarding seq={} while awaiting frame start", packet.sequence_number);
                }
            }
            Phase::FillingFrame => {
                let current = self.state.frame_index;
                if frame_index < current || frame_index > current + 1 + MAX_FRAME_SKIP {
                    self.hold_unplaced(packet);
                    return;
                }
                self.discard_unplaced();
                if frame_index > current {
                    // The packet that would have closed the current frame was lost.
                    self.emit_current((current + 1) * bytes_per_frame as u64);
                    if frame_index > current + 1 {
                        self.record_skipped_frames(current, frame_index - current - 1);
                    }
                    self.state.begin_frame(frame_index, frame_index * bytes_per_frame as u64);
                }
                self.place_spanning(&packet, offset);
            }
        }
    }

    /// Keep a packet that does not fit the current frame.
    ///
    /// A late or corrupt packet is dropped once the next packet agrees with
    /// the current frame. Two contiguous packets that both disagree mean the
    /// board's counter moved (e.g. a new recording), so placement restarts.
    fn hold_unplaced(&mut self, packet: DataPacket) {
        match self.unplaced.take() {
            Some(previous) if previous.end_byte_count() == packet.byte_count => {
                self.resync(previous, packet)
            }
            previous => {
                if let Some(previous) = previous {
                    self.drop_unplaced(&previous);
                }
                trace!(
                    "Holding seq={} at byte {} (filling frame {})",
                    packet.sequence_number, packet.byte_count, self.state.frame_index
                );
                self.unplaced = Some(packet);
            }
        }
    }

    fn discard_unplaced(&mut self) {
        if let Some(packet) = self.unplaced.take() {
            self.drop_unplaced(&packet);
        }
    }

    fn drop_unplaced(&mut self, packet: &DataPacket) {
        self.stats.dropped_writes += 1;
        debug!(
            "Dropping seq={}: byte {} is outside frame {}",
            packet.sequence_number, packet.byte_count, self.state.frame_index
        );
    }

    /// Close the frame in progress and restart placement at `first`.
    fn resync(&mut self, first: DataPacket, second: DataPacket) {
        warn!(
            "Byte counter moved from frame {} to byte {}, resynchronizing",
            self.state.frame_index, first.byte_count
        );
        self.stats.resyncs += 1;
        let filling = self.state.phase == Phase::FillingFrame;
        if filling && self.state.packets_seen_since_frame_start > 0 {
            let closing_position = self.state.frame_start_byte_count + self.frame_span();
            self.emit_current(closing_position);
        }
        self.state.clear();
        self.push_spanning(first);
        self.push_spanning(second);
    }

    /// Write a packet into the current frame at `offset`, spilling the
    /// overflow into the next frame's buffer.
    fn place_spanning(&mut self, packet: &DataPacket, offset: usize) {
        let bytes_per_frame = self.layout.bytes_per_frame();
        let end = offset + packet.payload.len();
        let fits = end.min(bytes_per_frame) - offset;

        self.state.current_buffer[offset..offset + fits].copy_from_slice(&packet.payload[..fits]);
        self.state.bytes_filled += fits;
        self.state.note_packet(packet.sequence_number);

        let overflow = &packet.payload[fits..];
        if !overflow.is_empty() {
            if overflow.len() > bytes_per_frame {
                self.stats.dropped_writes += 1;
                trace!(
                    "Dropping {}-byte overflow of seq={}",
                    overflow.len(),
                    packet.sequence_number
                );
            } else {
                self.state.spillover_buffer[..overflow.len()].copy_from_slice(overflow);
                self.state.spillover_len = overflow.len();
            }
        }

        if end >= bytes_per_frame {
            let closing_position = self.state.frame_start_byte_count + bytes_per_frame as u64;
            self.emit_current(closing_position);
            self.state.advance_to_spillover(bytes_per_frame, Some(packet.sequence_number));
        }
    }

    /// Place the bytes of `packet` after `head` at the start of the current frame.
    fn place_spanning_tail(&mut self, packet: &DataPacket, head: usize) {
        let tail = &packet.payload[head..];
        if self.write_current(0, tail) {
            self.state.bytes_filled = tail.len();
        }
        self.state.note_packet(packet.sequence_number);
    }

    /// Copy `payload` into the current buffer, dropping it if it would not fit.
    fn write_current(&mut self, offset: usize, payload: &[u8]) -> bool {
        let buffer_len = self.state.current_buffer.len();
        match offset.checked_add(payload.len()) {
            Some(end) if end <= buffer_len => {
                self.state.current_buffer[offset..end].copy_from_slice(payload);
                true
            }
            _ => {
                self.stats.dropped_writes += 1;
                trace!(
                    "Dropping {}-byte write at offset {} (buffer {})",
                    payload.len(),
                    offset,
                    buffer_len
                );
                false
            }
        }
    }

    fn frame_span(&self) -> u64 {
        match self.layout.mode() {
            ReassemblyMode::Clipped => self.layout.bytes_per_frame_aligned() as u64,
            ReassemblyMode::Spanning => self.layout.bytes_per_frame() as u64,
        }
    }

    fn estimate_loss(&self) -> u32 {
        let lost = match self.layout.mode() {
            ReassemblyMode::Clipped => {
                let seen = u64::from(self.state.packets_seen_since_frame_start);
                (self.layout.packets_per_frame_floor() as u64).saturating_sub(seen)
            }
            ReassemblyMode::Spanning => {
                let missing = self.layout.bytes_per_frame().saturating_sub(self.state.bytes_filled);
                missing.div_ceil(self.layout.bytes_per_packet()) as u64
            }
        };
        u32::try_from(lost).unwrap_or(u32::MAX)
    }

    /// Account for whole frames after `last_index` that no packet reached.
    fn record_skipped_frames(&mut self, last_index: u64, skipped: u64) {
        let per_frame =
            self.layout.bytes_per_frame().div_ceil(self.layout.bytes_per_packet()) as u64;
        let lost = u32::try_from(skipped.saturating_mul(per_frame)).unwrap_or(u32::MAX);
        let resume_index = last_index + skipped + 1;
        warn!("{} whole frames lost before frame index {}", skipped, resume_index);
        self.state.loss.record(lost, resume_index * self.layout.bytes_per_frame() as u64);
    }

    /// Move the current buffer out as a completed frame.
    ///
    /// Frames no packet reached are counted as lost but not handed out.
    fn emit_current(&mut self, closing_position: u64) {
        let lost_packets = self.estimate_loss();
        self.state.loss.record(lost_packets, closing_position);

        let packets_received = self.state.packets_seen_since_frame_start;
        if packets_received == 0 {
            debug!("Frame at byte {} received no packets", self.state.frame_start_byte_count);
            return;
        }

        let fresh = vec![0; self.layout.bytes_per_frame()];
        let data = std::mem::replace(&mut self.state.current_buffer, fresh);
        let frame = CapturedFrame {
            data,
            frame_number: self.stats.frames_emitted,
            start_sequence: self.state.frame_start_sequence.unwrap_or_default(),
            start_byte_count: self.state.frame_start_byte_count,
            packets_received,
            lost_packets,
        };
        self.stats.frames_emitted += 1;

        if lost_packets > 0 {
            warn!(
                "Frame {} closed at byte {} with ~{} packets missing ({} received)",
                frame.frame_number, closing_position, lost_packets, packets_received
            );
        } else {
            debug!("Frame {} complete ({} packets)", frame.frame_number, packets_received);
        }
        self.ready.push_back(frame);
    }
}

/// Pulls packets from a [`PacketSource`] until a frame completes.
#[derive(Debug)]
pub struct FrameReader<S> {
    source: S,
    reassembler: FrameReassembler,
}

impl<S: PacketSource> FrameReader<S> {
    pub fn new(source: S, layout: FrameLayout) -> Self {
        Self::with_reassembler(source, FrameReassembler::new(layout))
    }

    pub fn with_reassembler(source: S, reassembler: FrameReassembler) -> Self {
        Self { source, reassembler }
    }

    /// Block until the next frame completes or `timeout` elapses.
    ///
    /// `timeout` bounds the whole call, not each packet. On
    /// [`CaptureError::Timeout`] the frame in progress is kept and the next
    /// call resumes it. Malformed datagrams are counted and skipped.
    pub fn next_frame(&mut self, timeout: Duration) -> Result<CapturedFrame> {
        if let Some(frame) = self.reassembler.take_ready() {
            return Ok(frame);
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(CaptureError::Timeout { duration: timeout });
            }

            match self.source.receive_packet(remaining) {
                Ok(packet) => {
                    if let Some(frame) = self.reassembler.push(packet) {
                        return Ok(frame);
                    }
                }
                Err(CaptureError::MalformedPacket { len, needed }) => {
                    self.reassembler.record_malformed();
                    debug!("Skipping malformed datagram ({} bytes, header needs {})", len, needed);
                }
                Err(CaptureError::Timeout { .. }) => {
                    trace!("No frame within {:?} ({:?})", timeout, self.reassembler.phase());
                    return Err(CaptureError::Timeout { duration: timeout });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Close the frame in progress; see [`FrameReassembler::flush`].
    pub fn finish(&mut self) -> Option<CapturedFrame> {
        self.reassembler.flush()
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.reassembler.stats()
    }

    pub fn reassembler(&self) -> &FrameReassembler {
        &self.reassembler
    }

    pub fn reassembler_mut(&mut self) -> &mut FrameReassembler {
        &mut self.reassembler
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_parts(self) -> (S, FrameReassembler) {
        (self.source, self.reassembler)
    }
}
