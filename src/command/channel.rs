//! Control channel socket

use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::{Command, CommandCode, CommandResponse};
use crate::error::is_timeout_kind;
use crate::{CaptureError, Result};

/// Receive buffer for one control reply.
const MAX_REPLY_SIZE: usize = 4096;

/// UDP socket used exclusively for command exchanges with the board.
#[derive(Debug)]
pub struct ControlChannel {
    socket: UdpSocket,
    device_addr: SocketAddr,
}

impl ControlChannel {
    /// Bind the host side of the control channel.
    pub fn bind(local_addr: SocketAddr, device_addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(local_addr)
            .map_err(|e| CaptureError::socket(format!("bind control socket {}", local_addr), e))?;
        debug!("Control channel bound to {} (device {})", local_addr, device_addr);
        Ok(Self { socket, device_addr })
    }

    /// Wrap an already bound socket.
    pub fn from_socket(socket: UdpSocket, device_addr: SocketAddr) -> Self {
        Self { socket, device_addr }
    }

    pub fn device_addr(&self) -> SocketAddr {
        self.device_addr
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| CaptureError::socket("query control socket address", e))
    }

    /// Send one message and wait for one reply.
    ///
    /// Exactly one datagram goes out and at most one is read. An expired
    /// `timeout` yields [`CaptureError::CommandTimeout`]; retrying is left to
    /// the caller.
    pub fn send_and_receive(&self, message: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        self.exchange(None, message, timeout)
    }

    /// Encode, send and parse the reply to a typed command.
    pub fn send_command(&self, command: &Command, timeout: Duration) -> Result<CommandResponse> {
        let message = command.encode()?;
        debug!("Sending {}: {}", command.code, hex::encode(&message));
        let reply = self.exchange(Some(command.code), &message, timeout)?;
        let response = CommandResponse::parse(reply);
        debug!("Reply to {}: {}", command.code, response.to_hex());
        Ok(response)
    }

    /// Wait for an unsolicited error report from the board.
    ///
    /// Returns `Ok(None)` when nothing arrives within `timeout`. Replies that
    /// are not `SYSTEM_ERROR` reports are skipped.
    pub fn listen_for_error(&self, timeout: Duration) -> Result<Option<CommandResponse>> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match self.receive(remaining)? {
                Some(reply) => {
                    let response = CommandResponse::parse(reply);
                    if response.command() == Some(CommandCode::SystemError) {
                        warn!("Board reported error status {:?}", response.status());
                        return Ok(Some(response));
                    }
                    trace!(
                        "Ignoring control reply while listening for errors: {}",
                        response.to_hex()
                    );
                }
                None => return Ok(None),
            }
        }
    }

    fn exchange(
        &self,
        command: Option<CommandCode>,
        message: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        self.socket
            .send_to(message, self.device_addr)
            .map_err(|e| CaptureError::socket(format!("send to {}", self.device_addr), e))?;

        match self.receive(timeout)? {
            Some(reply) => Ok(reply),
            None => Err(CaptureError::CommandTimeout { command, duration: timeout }),
        }
    }

    fn receive(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        // A zero read timeout means "block forever" to the OS.
        let timeout = timeout.max(Duration::from_millis(1));
        self.socket
            .set_read_timeout(Some(timeout))
            .map_err(|e| CaptureError::socket("set control read timeout", e))?;

        let mut buf = [0u8; MAX_REPLY_SIZE];
        match self.socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                trace!("Control reply of {} bytes from {}", n, from);
                Ok(Some(buf[..n].to_vec()))
            }
            Err(e) if is_timeout_kind(&e) => Ok(None),
            Err(e) => Err(CaptureError::socket("receive control reply", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    /// Fake board answering every command with a success echo.
    fn spawn_echo_device(replies: usize) -> (SocketAddr, thread::JoinHandle<Vec<Vec<u8>>>) {
        let socket = UdpSocket::bind(loopback()).unwrap();
        let addr = socket.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            for _ in 0..replies {
                let (n, from) = socket.recv_from(&mut buf).unwrap();
                let request = buf[..n].to_vec();
                let reply = [0x5A, 0xA5, request[2], request[3], 0x00, 0x00, 0xAA, 0xEE];
                socket.send_to(&reply, from).unwrap();
                received.push(request);
            }
            received
        });
        (addr, handle)
    }

    #[test]
    fn exchange_sends_once_and_reads_reply() {
        let (device, handle) = spawn_echo_device(1);
        let channel = ControlChannel::bind(loopback(), device).unwrap();

        let response =
            channel
                .send_command(&Command::bare(CommandCode::SystemConnect), Duration::from_secs(2))
                .unwrap();
        assert!(response.ensure_success(CommandCode::SystemConnect).is_ok());

        let received = handle.join().unwrap();
        assert_eq!(received, vec![hex::decode("5aa509000000aaee").unwrap()]);
    }

    #[test]
    fn silent_device_yields_command_timeout() {
        let silent = UdpSocket::bind(loopback()).unwrap();
        let channel = ControlChannel::bind(loopback(), silent.local_addr().unwrap()).unwrap();

        let result = channel
            .send_command(&Command::bare(CommandCode::RecordStop), Duration::from_millis(50));
        match result {
            Err(CaptureError::CommandTimeout { command, duration }) => {
                assert_eq!(command, Some(CommandCode::RecordStop));
                assert_eq!(duration, Duration::from_millis(50));
            }
            other => panic!("Expected CommandTimeout, got {:?}", other),
        }

        // The request still went out exactly once.
        let mut buf = [0u8; 64];
        silent.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
        let (n, _) = silent.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], &hex::decode("5aa506000000aaee").unwrap()[..]);
    }

    #[test]
    fn raw_exchange_timeout_has_no_command() {
        let silent = UdpSocket::bind(loopback()).unwrap();
        let channel = ControlChannel::bind(loopback(), silent.local_addr().unwrap()).unwrap();
        let result = channel.send_and_receive(&[0x00], Duration::from_millis(20));
        assert!(matches!(result, Err(CaptureError::CommandTimeout { command: None, .. })));
    }

    #[test]
    fn listen_for_error_returns_report() {
        let board = UdpSocket::bind(loopback()).unwrap();
        let channel = ControlChannel::bind(loopback(), board.local_addr().unwrap()).unwrap();
        let host = channel.local_addr().unwrap();

        board.send_to(&hex::decode("5aa509000000aaee").unwrap(), host).unwrap();
        board.send_to(&hex::decode("5aa50a000300aaee").unwrap(), host).unwrap();

        let report =
            channel.listen_for_error(Duration::from_secs(2)).unwrap().expect("error report");
        assert_eq!(report.command(), Some(CommandCode::SystemError));
        assert_eq!(report.status(), Some(3));
    }

    #[test]
    fn listen_for_error_times_out_quietly() {
        let board = UdpSocket::bind(loopback()).unwrap();
        let channel = ControlChannel::bind(loopback(), board.local_addr().unwrap()).unwrap();
        assert!(channel.listen_for_error(Duration::from_millis(20)).unwrap().is_none());
    }
}
