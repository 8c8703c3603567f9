//! Data channel packet type

/// One datagram received on the data channel.
///
/// Produced once per datagram and consumed immediately by the reassembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    /// Board packet counter, starting at 1 and wrapping at `u32::MAX`.
    pub sequence_number: u32,

    /// Bytes the board streamed before this packet (48-bit counter).
    pub byte_count: u64,

    /// Raw ADC bytes.
    pub payload: Vec<u8>,
}

impl DataPacket {
    pub fn new(sequence_number: u32, byte_count: u64, payload: Vec<u8>) -> Self {
        Self { sequence_number, byte_count, payload }
    }

    /// Stream position one past the last payload byte.
    pub fn end_byte_count(&self) -> u64 {
        self.byte_count + self.payload.len() as u64
    }
}
