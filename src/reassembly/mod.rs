//! Frame reassembly.
//!
//! The board streams a frame as a run of fixed-size packets tagged with a
//! sequence number and a cumulative byte counter. [`FrameReassembler`] places
//! each payload into a frame buffer and hands out the buffer once the byte
//! counter shows the frame is over.
//!
//! Two placement modes exist, chosen by [`FrameLayout::mode`]:
//!
//! - **Clipped**: the frame is a whole number of packets. A packet whose byte
//!   counter is a multiple of the frame size opens a frame; every other packet
//!   goes to slot `(sequence_number - 1) mod packets_per_frame`.
//! - **Spanning**: packets straddle frame boundaries. Placement follows the
//!   byte counter and the part of a packet past the frame end is carried into
//!   the next frame.
//!
//! Lost packets leave zero-filled gaps and are reported per frame through
//! [`CapturedFrame::lost_packets`].
//!
//! [`FrameLayout::mode`]: crate::types::FrameLayout::mode
//! [`CapturedFrame::lost_packets`]: crate::types::CapturedFrame::lost_packets
//!
//! ```rust
//! use dca1000::packet::{ReplaySource, encode_datagram};
//! use dca1000::reassembly::FrameReader;
//! use dca1000::types::{FrameGeometry, FrameLayout, PacketGeometry};
//! use std::time::Duration;
//!
//! let frame = FrameGeometry::new(8, 4, 2, 64).unwrap();
//! let packet = PacketGeometry { max_datagram_size: 4096, bytes_per_packet: 1024 };
//! let layout = FrameLayout::new(&frame, &packet).unwrap();
//!
//! let source: ReplaySource = (0..17u32)
//!     .map(|i| encode_datagram(i + 1, u64::from(i) * 1024, &[i as u8; 1024]))
//!     .collect();
//!
//! let mut reader = FrameReader::new(source, layout);
//! let captured = reader.next_frame(Duration::from_millis(100)).unwrap();
//! assert_eq!(captured.data.len(), 16384);
//! assert_eq!(captured.lost_packets, 0);
//! ```

mod reassembler;
mod state;

pub use reassembler::{FrameReader, FrameReassembler};
pub use state::{DEFAULT_LOSS_HISTORY, LossStats, Phase, ReassemblyState, ReassemblyStats};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SyntheticStream;
    use crate::types::{FrameGeometry, FrameLayout, PacketGeometry};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn clipped_single_drop_costs_one_packet(
            packets_per_frame in 2usize..24,
            dropped in 1usize..24,
        ) {
            prop_assume!(dropped < packets_per_frame);

            // 64 bytes per packet keeps frames small: samples * 8 bytes.
            let frame = FrameGeometry::new(1, 1, 1, (packets_per_frame * 16) as u32).unwrap();
            let packet = PacketGeometry { max_datagram_size: 4096, bytes_per_packet: 64 };
            let layout = FrameLayout::new(&frame, &packet).unwrap();
            prop_assert_eq!(layout.packets_per_frame_floor(), packets_per_frame);

            let mut packets = SyntheticStream::new(64).packets(packets_per_frame + 1);
            packets.remove(dropped);

            let mut reassembler = FrameReassembler::new(layout);
            let frames: Vec<_> = packets.into_iter().filter_map(|p| reassembler.push(p)).collect();

            prop_assert_eq!(frames.len(), 1);
            prop_assert_eq!(frames[0].lost_packets, 1);
            let gap = &frames[0].data[dropped * 64..(dropped + 1) * 64];
            prop_assert!(gap.iter().all(|&b| b == 0));
        }

        #[test]
        fn spanning_stream_yields_exact_frames(
            bytes_per_packet in prop::sample::select(vec![96usize, 200, 368, 1000, 1456]),
            frames_wanted in 1u64..4,
        ) {
            let frame = FrameGeometry::new(2, 2, 2, 64).unwrap();
            let packet = PacketGeometry { max_datagram_size: 4096, bytes_per_packet };
            let layout = FrameLayout::new(&frame, &packet).unwrap();
            let bytes_per_frame = layout.bytes_per_frame() as u64;

            let count =
                (frames_wanted * bytes_per_frame).div_ceil(bytes_per_packet as u64) as usize;
            let mut reassembler = FrameReassembler::new(layout);
            let mut frames = Vec::new();
            for packet in SyntheticStream::new(bytes_per_packet).packets(count) {
                frames.extend(reassembler.push(packet));
                frames.extend(std::iter::from_fn(|| reassembler.take_ready()));
            }

            prop_assert_eq!(frames.len() as u64, frames_wanted);
            for (index, captured) in frames.iter().enumerate() {
                prop_assert_eq!(
                    &captured.data,
                    &crate::test_utils::expected_frame(bytes_per_frame as usize, index as u64)
                );
                prop_assert_eq!(captured.lost_packets, 0);
            }
        }
    }
}
