//! Data channel packet sources.
//!
//! [`PacketSource`] is the seam between I/O and the reassembly state machine:
//! [`UdpPacketSource`] reads the live data port, [`ReplaySource`] replays
//! datagrams held in memory.

mod format;
mod source;

pub use format::{MAX_BYTE_COUNT, encode_datagram, parse_datagram};
pub use source::{PacketSource, ReplaySource, UdpPacketSource};
