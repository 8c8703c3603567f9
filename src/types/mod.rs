//! Core types for capture data representation.
//!
//! - [`FrameGeometry`] describes the radar frame as configured on the front end
//! - [`PacketGeometry`] describes datagram sizing on the data channel
//! - [`FrameLayout`] resolves the two and selects the [`ReassemblyMode`]
//! - [`DataPacket`] is one parsed datagram
//! - [`CapturedFrame`] is one reassembled frame plus its loss metadata
//!
//! ## Usage Example
//!
//! ```rust
//! use dca1000::types::{FrameGeometry, FrameLayout, PacketGeometry, ReassemblyMode};
//!
//! let frame = FrameGeometry::new(8, 4, 2, 64).unwrap();
//! let packet = PacketGeometry { max_datagram_size: 4096, bytes_per_packet: 1024 };
//! let layout = FrameLayout::new(&frame, &packet).unwrap();
//!
//! assert_eq!(layout.bytes_per_frame(), 16384);
//! assert_eq!(layout.packets_per_frame_floor(), 16);
//! assert_eq!(layout.mode(), ReassemblyMode::Clipped);
//! ```

mod frame;
mod geometry;
mod packet;

pub use frame::{CapturedFrame, LossReport};
pub use geometry::{DATA_HEADER_LEN, FrameGeometry, FrameLayout, PacketGeometry, ReassemblyMode};
pub use packet::DataPacket;
