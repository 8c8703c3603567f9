//! Data channel datagram format
//!
//! Every datagram on the data port carries a fixed 10-byte header followed by
//! raw ADC bytes:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | Sequence number, little-endian `u32` |
//! | 4 | 6 | Byte count, little-endian 48-bit unsigned |
//! | 10 | N | Payload |
//!
//! The byte count is the number of payload bytes the board streamed before this
//! datagram, so the first packet of a recording carries 0.

use tracing::trace;

use crate::types::{DATA_HEADER_LEN, DataPacket};
use crate::{CaptureError, Result};

const SEQUENCE_LEN: usize = 4;
const BYTE_COUNT_LEN: usize = 6;

/// Largest value the 48-bit byte counter can hold.
pub const MAX_BYTE_COUNT: u64 = (1 << 48) - 1;

/// Parse one datagram into a [`DataPacket`].
pub fn parse_datagram(datagram: &[u8]) -> Result<DataPacket> {
    if datagram.len() < DATA_HEADER_LEN {
        return Err(CaptureError::MalformedPacket { len: datagram.len(), needed: DATA_HEADER_LEN });
    }

    let (sequence, rest) = datagram.split_at(SEQUENCE_LEN);
    let (byte_count, payload) = rest.split_at(BYTE_COUNT_LEN);

    let sequence_number = u32::from_le_bytes([sequence[0], sequence[1], sequence[2], sequence[3]]);
    let byte_count = read_u48_le(byte_count);

    trace!(
        "Parsed packet seq={} byte_count={} payload={}",
        sequence_number,
        byte_count,
        payload.len()
    );
    Ok(DataPacket::new(sequence_number, byte_count, payload.to_vec()))
}

/// Build a datagram from its fields. Counters above 48 bits are truncated.
pub fn encode_datagram(sequence_number: u32, byte_count: u64, payload: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(DATA_HEADER_LEN + payload.len());
    datagram.extend_from_slice(&sequence_number.to_le_bytes());
    datagram.extend_from_slice(&(byte_count & MAX_BYTE_COUNT).to_le_bytes()[..BYTE_COUNT_LEN]);
    datagram.extend_from_slice(payload);
    datagram
}

fn read_u48_le(bytes: &[u8]) -> u64 {
    let mut wide = [0u8; 8];
    wide[..BYTE_COUNT_LEN].copy_from_slice(&bytes[..BYTE_COUNT_LEN]);
    u64::from_le_bytes(wide)
}
