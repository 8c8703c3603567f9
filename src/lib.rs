//! Host-side capture driver for the DCA1000 radar data-capture board.
//!
//! The board streams raw ADC samples from a radar front end over UDP and takes
//! configuration commands on a second UDP port. This crate turns that lossy
//! packet stream into fixed-size frames and complex data cubes.
//!
//! # Features
//!
//! - **Frame Reassembly**: packet placement by sequence number or byte counter,
//!   with per-frame loss estimates instead of errors
//! - **Command Codec**: the board's fixed `5A A5 .. AA EE` control framing
//! - **Sample Organization**: IQ deinterleaving and TDM virtual-channel separation
//! - **Async Streams**: optional background reader with `futures` streams
//!   (feature `stream`, on by default)
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use dca1000::{CaptureConfig, Dca1000};
//!
//! fn main() -> dca1000::Result<()> {
//!     let config = CaptureConfig::from_file("capture.yaml")?;
//!     let mut board = Dca1000::connect(config)?;
//!     board.configure()?;
//!
//!     let frame = board.read_frame()?;
//!     println!("{} bytes, ~{} packets lost", frame.data.len(), frame.lost_packets);
//!
//!     board.stop_recording()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Example (async)
//!
//! ```rust,no_run
//! use dca1000::{CaptureConfig, Dca1000, DriverOptions};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut board = Dca1000::connect(CaptureConfig::default())?;
//!     board.configure()?;
//!
//!     let (_control, connection) = board.into_stream(DriverOptions::default());
//!     let mut cubes = Box::pin(connection.organized_frames());
//!     while let Some(cube) = cubes.next().await {
//!         let cube = cube?;
//!         println!("frame {}: {:?}", cube.frame_number, cube.cube.shape());
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Wire protocols
pub mod command;
pub mod packet;

// Frame processing
pub mod organize;
pub mod reassembly;

// Session
pub mod device;

// Stream-based capture
#[cfg(feature = "stream")]
pub mod connection;
#[cfg(feature = "stream")]
pub mod driver;

// Core exports
pub use error::*;
pub use types::*;

pub use command::{
    Command, CommandCode, CommandResponse, ControlChannel, FpgaConfig, FpgaVersion,
    PacketTimingConfig,
};
pub use config::CaptureConfig;
pub use device::Dca1000;
pub use organize::{
    OrganizedFrame, deinterleave, interleave, organize_frame, reshape, separate_transmit_channels,
};
pub use packet::{PacketSource, ReplaySource, UdpPacketSource};
pub use reassembly::{FrameReader, FrameReassembler, ReassemblyStats};

#[cfg(feature = "stream")]
pub use connection::CaptureConnection;
#[cfg(feature = "stream")]
pub use driver::{Driver, DriverOptions};
