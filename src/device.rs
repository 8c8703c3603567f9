//! Capture session with one board.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandCode, CommandResponse, ControlChannel, FpgaVersion};
use crate::config::CaptureConfig;
#[cfg(feature = "stream")]
use crate::connection::CaptureConnection;
#[cfg(feature = "stream")]
use crate::driver::DriverOptions;
use crate::organize::OrganizedFrame;
use crate::packet::{PacketSource, UdpPacketSource};
use crate::reassembly::{FrameReader, FrameReassembler, ReassemblyStats};
use crate::types::{CapturedFrame, FrameLayout};
use crate::{CaptureError, Result};

/// A capture board reached over its control and data sockets.
///
/// Created by [`Dca1000::connect`]. [`configure`](Self::configure) brings the
/// board into streaming mode, then frames are pulled with
/// [`read_frame`](Self::read_frame) or [`read_organized`](Self::read_organized).
///
/// ```rust,no_run
/// use dca1000::{CaptureConfig, Dca1000};
///
/// fn main() -> dca1000::Result<()> {
///     let mut board = Dca1000::connect(CaptureConfig::default())?;
///     let version = board.configure()?;
///     println!("FPGA {}.{}", version.major, version.minor);
///
///     for _ in 0..10 {
///         let frame = board.read_organized()?;
///         println!("frame {} lost {} packets", frame.frame_number, frame.lost_packets);
///     }
///     board.stop_recording()?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Dca1000<S = UdpPacketSource> {
    config: CaptureConfig,
    layout: FrameLayout,
    control: ControlChannel,
    reader: FrameReader<S>,
}

impl Dca1000<UdpPacketSource> {
    /// Bind the control and data sockets on the host address.
    ///
    /// Nothing is sent to the board until a command is issued.
    pub fn connect(config: CaptureConfig) -> Result<Self> {
        config.validate()?;
        let network = &config.network;
        let control =
            ControlChannel::bind(network.host_control_addr(), network.device_control_addr())?;
        let source = UdpPacketSource::bind(
            network.host_data_addr(),
            config.packet.max_datagram_size,
            network.recv_buffer_size,
        )?;
        info!(
            "Capture session on {} (control) / {} (data), board at {}",
            network.host_control_addr(),
            network.host_data_addr(),
            network.device_control_addr()
        );
        Self::with_source(config, control, source)
    }
}

impl<S: PacketSource> Dca1000<S> {
    /// Assemble a session from an existing control channel and packet source.
    pub fn with_source(config: CaptureConfig, control: ControlChannel, source: S) -> Result<Self> {
        let layout = config.validate()?;
        let reassembler = FrameReassembler::with_loss_history(layout, config.loss_history.0);
        let reader = FrameReader::with_reassembler(source, reassembler);
        Ok(Self { layout, control, reader, config })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    pub fn control(&self) -> &ControlChannel {
        &self.control
    }

    /// Send one command with the configured command timeout.
    pub fn send_command(&self, command: &Command) -> Result<CommandResponse> {
        self.control.send_command(command, self.config.timeouts.command())
    }

    fn expect_success(&self, command: Command) -> Result<CommandResponse> {
        let response = self.send_command(&command)?;
        response.ensure_success(command.code)?;
        Ok(response)
    }

    /// Run the full bring-up sequence and start recording.
    ///
    /// Sends `SYSTEM_CONNECT`, `READ_FPGA_VERSION`, `CONFIG_FPGA_GEN`,
    /// `CONFIG_PACKET_DATA` and `RECORD_START`, stopping at the first failure.
    pub fn configure(&mut self) -> Result<FpgaVersion> {
        let version = self.prepare()?;
        self.start_recording()?;
        Ok(version)
    }

    /// Connect and configure the board without starting a recording.
    pub fn prepare(&self) -> Result<FpgaVersion> {
        self.system_connect()?;
        let version = self.read_fpga_version()?;
        info!(
            "Board FPGA version {}.{} (playback: {})",
            version.major, version.minor, version.playback_mode
        );
        self.configure_fpga()?;
        self.configure_packet_data()?;
        Ok(version)
    }

    pub fn system_connect(&self) -> Result<()> {
        self.expect_success(Command::bare(CommandCode::SystemConnect)).map(|_| ())
    }

    pub fn read_fpga_version(&self) -> Result<FpgaVersion> {
        let response = self.send_command(&Command::bare(CommandCode::ReadFpgaVersion))?;
        match (response.command(), response.status()) {
            (Some(CommandCode::ReadFpgaVersion), Some(status)) => {
                Ok(FpgaVersion::from_status(status))
            }
            _ => Err(CaptureError::protocol(
                format!("{} reply", CommandCode::ReadFpgaVersion),
                format!("unexpected reply {}", response.to_hex()),
            )),
        }
    }

    pub fn configure_fpga(&self) -> Result<()> {
        self.expect_success(Command::configure_fpga(&self.config.fpga)).map(|_| ())
    }

    pub fn configure_packet_data(&self) -> Result<()> {
        self.expect_success(Command::configure_packets(&self.config.packet_timing)).map(|_| ())
    }

    /// Start streaming. The reassembler restarts since the board's byte
    /// counter begins again at zero.
    pub fn start_recording(&mut self) -> Result<()> {
        self.expect_success(Command::bare(CommandCode::RecordStart))?;
        self.reader.reassembler_mut().reset();
        info!("Recording started");
        Ok(())
    }

    pub fn stop_recording(&self) -> Result<()> {
        self.expect_success(Command::bare(CommandCode::RecordStop))?;
        info!("Recording stopped");
        Ok(())
    }

    pub fn reset_fpga(&self) -> Result<()> {
        self.expect_success(Command::bare(CommandCode::ResetFpga)).map(|_| ())
    }

    pub fn reset_radar(&self) -> Result<()> {
        self.expect_success(Command::bare(CommandCode::ResetRadar)).map(|_| ())
    }

    /// Wait up to `timeout` for an error report from the board.
    pub fn listen_for_error(&self, timeout: Duration) -> Result<Option<CommandResponse>> {
        self.control.listen_for_error(timeout)
    }

    /// Pull the next frame using the configured read timeout.
    pub fn read_frame(&mut self) -> Result<CapturedFrame> {
        self.read_frame_timeout(self.config.timeouts.read())
    }

    pub fn read_frame_timeout(&mut self, timeout: Duration) -> Result<CapturedFrame> {
        self.reader.next_frame(timeout)
    }

    /// Pull the next frame and organize it into virtual channels.
    pub fn read_organized(&mut self) -> Result<OrganizedFrame> {
        let frame = self.read_frame()?;
        frame.organize(&self.config.frame)
    }

    /// Close the frame in progress, however incomplete.
    pub fn flush(&mut self) -> Option<CapturedFrame> {
        self.reader.finish()
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.reader.stats()
    }

    /// End the session, returning the final counters.
    pub fn close(self) -> ReassemblyStats {
        let stats = self.stats();
        if stats.lost_packet_count > 0 {
            warn!(
                "Session closed with {} packets lost over {} frames",
                stats.lost_packet_count, stats.frames_emitted
            );
        }
        info!("Capture session closed after {} frames", stats.frames_emitted);
        stats
    }

    /// Split into the control channel and the frame reader.
    pub fn into_parts(self) -> (CaptureConfig, ControlChannel, FrameReader<S>) {
        debug!("Splitting capture session");
        (self.config, self.control, self.reader)
    }

    /// Hand frame reading to a background task.
    ///
    /// The control channel stays with the caller so recording can be stopped
    /// while frames stream. Must be called within a tokio runtime.
    #[cfg(feature = "stream")]
    pub fn into_stream(self, options: DriverOptions) -> (ControlChannel, CaptureConnection) {
        let geometry = self.config.frame;
        let connection = CaptureConnection::spawn(self.reader, geometry, options);
        (self.control, connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::ReplaySource;
    use crate::test_utils::{SyntheticStream, expected_frame, replay_source};
    use crate::types::FrameGeometry;
    use std::net::{SocketAddr, UdpSocket};
    use std::thread;

    /// Fake board replying to each request; `version_status` answers READ_FPGA_VERSION.
    fn spawn_fake_board(
        requests: usize,
        version_status: u16,
    ) -> (SocketAddr, thread::JoinHandle<Vec<String>>) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = socket.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            let mut buf = [0u8; 4096];
            for _ in 0..requests {
                let (n, from) = socket.recv_from(&mut buf).unwrap();
                let code = [buf[2], buf[3]];
                let is_version = code == CommandCode::ReadFpgaVersion.to_le_bytes();
                let status = if is_version { version_status } else { 0 };
                let status = status.to_le_bytes();
                let reply = [0x5A, 0xA5, code[0], code[1], status[0], status[1], 0xAA, 0xEE];
                socket.send_to(&reply, from).unwrap();
                seen.push(hex::encode(&buf[..n]));
            }
            seen
        });
        (addr, handle)
    }

    fn session(board: SocketAddr, source: ReplaySource) -> Dca1000<ReplaySource> {
        let mut config = CaptureConfig::default();
        config.frame = FrameGeometry::new(8, 4, 2, 64).unwrap();
        config.packet.bytes_per_packet = 1024;
        config.timeouts.command_ms = 2000;
        let control = ControlChannel::bind("127.0.0.1:0".parse().unwrap(), board).unwrap();
        Dca1000::with_source(config, control, source).unwrap()
    }

    #[test]
    fn configure_sends_bring_up_sequence() {
        let _ = tracing_subscriber::fmt::try_init();
        let (board, handle) = spawn_fake_board(5, (3 << 7) | 2);
        let mut device = session(board, ReplaySource::new());

        let version = device.configure().unwrap();
        assert_eq!(version, FpgaVersion { major: 2, minor: 3, playback_mode: false });

        let seen = handle.join().unwrap();
        assert_eq!(
            seen,
            vec![
                "5aa509000000aaee",
                "5aa50e000000aaee",
                "5aa50300060001020102031eaaee",
                "5aa50b000600be05350c0000aaee",
                "5aa505000000aaee",
            ]
        );
    }

    #[test]
    fn failed_status_is_a_protocol_error() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let board = socket.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 64];
            let (_, from) = socket.recv_from(&mut buf).unwrap();
            socket.send_to(&[0x5A, 0xA5, 0x09, 0x00, 0x01, 0x00, 0xAA, 0xEE], from).unwrap();
        });

        let device = session(board, ReplaySource::new());
        assert!(matches!(device.system_connect(), Err(CaptureError::Protocol { .. })));
        handle.join().unwrap();
    }

    #[test]
    fn read_frame_reassembles_from_source() {
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let source = replay_source(SyntheticStream::new(1024).packets(17));
        let mut device = session(silent.local_addr().unwrap(), source);

        let organized = device.read_organized().unwrap();
        assert_eq!(organized.cube.shape(), &[8, 8, 64]);
        assert!(organized.is_complete());

        let trailing = device.flush().unwrap();
        assert_eq!(trailing.packets_received, 1);
        assert_eq!(trailing.data[..1024], expected_frame(16384, 1)[..1024]);

        let stats = device.close();
        assert_eq!(stats.frames_emitted, 2);
        assert_eq!(stats.packets_received, 17);
    }
}
