//! Control channel command codec.
//!
//! Builds the fixed-framing configuration messages, parses the board's
//! replies and drives synchronous request/response exchanges over the control
//! socket.
//!
//! ```rust
//! use dca1000::command::{Command, CommandCode, encode_hex};
//!
//! let connect = Command::bare(CommandCode::SystemConnect).encode().unwrap();
//! assert_eq!(connect, [0x5A, 0xA5, 0x09, 0x00, 0x00, 0x00, 0xAA, 0xEE]);
//! assert_eq!(encode_hex("0900", "0000", "").unwrap(), connect);
//! ```

mod channel;
mod code;
mod message;

pub use channel::ControlChannel;
pub use code::CommandCode;
pub use message::{
    CONFIG_FOOTER, CONFIG_HEADER, Command, CommandResponse, FRAMING_LEN, FpgaConfig, FpgaVersion,
    PacketTimingConfig, encode, encode_hex,
};
