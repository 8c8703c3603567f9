//! Control channel command codes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Commands understood by the capture board.
///
/// On the wire each code is a 2-byte little-endian value, so
/// `SystemConnect` (0x0009) is sent as `09 00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[repr(u16)]
pub enum CommandCode {
    ResetFpga = 0x0001,
    ResetRadar = 0x0002,
    ConfigFpgaGen = 0x0003,
    ConfigEeprom = 0x0004,
    RecordStart = 0x0005,
    RecordStop = 0x0006,
    PlaybackStart = 0x0007,
    PlaybackStop = 0x0008,
    SystemConnect = 0x0009,
    SystemError = 0x000A,
    ConfigPacketData = 0x000B,
    ConfigDataModeRadar = 0x000C,
    InitFpgaPlayback = 0x000D,
    ReadFpgaVersion = 0x000E,
}

impl CommandCode {
    pub const ALL: [CommandCode; 14] = [
        CommandCode::ResetFpga,
        CommandCode::ResetRadar,
        CommandCode::ConfigFpgaGen,
        CommandCode::ConfigEeprom,
        CommandCode::RecordStart,
        CommandCode::RecordStop,
        CommandCode::PlaybackStart,
        CommandCode::PlaybackStop,
        CommandCode::SystemConnect,
        CommandCode::SystemError,
        CommandCode::ConfigPacketData,
        CommandCode::ConfigDataModeRadar,
        CommandCode::InitFpgaPlayback,
        CommandCode::ReadFpgaVersion,
    ];

    pub fn value(self) -> u16 {
        self as u16
    }

    pub fn to_le_bytes(self) -> [u8; 2] {
        self.value().to_le_bytes()
    }

    pub fn from_value(value: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.value() == value)
    }

    /// Name as written in the board documentation.
    pub fn name(self) -> &'static str {
        match self {
            CommandCode::ResetFpga => "RESET_FPGA",
            CommandCode::ResetRadar => "RESET_AR_DEV",
            CommandCode::ConfigFpgaGen => "CONFIG_FPGA_GEN",
            CommandCode::ConfigEeprom => "CONFIG_EEPROM",
            CommandCode::RecordStart => "RECORD_START",
            CommandCode::RecordStop => "RECORD_STOP",
            CommandCode::PlaybackStart => "PLAYBACK_START",
            CommandCode::PlaybackStop => "PLAYBACK_STOP",
            CommandCode::SystemConnect => "SYSTEM_CONNECT",
            CommandCode::SystemError => "SYSTEM_ERROR",
            CommandCode::ConfigPacketData => "CONFIG_PACKET_DATA",
            CommandCode::ConfigDataModeRadar => "CONFIG_DATA_MODE_AR_DEV",
            CommandCode::InitFpgaPlayback => "INIT_FPGA_PLAYBACK",
            CommandCode::ReadFpgaVersion => "READ_FPGA_VERSION",
        }
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#06x})", self.name(), self.value())
    }
}
