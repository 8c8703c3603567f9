//! Packet sources feeding the reassembler

use socket2::{Domain, Protocol, Socket, Type};
use std::collections::VecDeque;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::format::parse_datagram;
use crate::error::is_timeout_kind;
use crate::types::DataPacket;
use crate::{CaptureError, Result};

/// Source of data channel packets.
///
/// Implementations block for at most `timeout` and return
/// [`CaptureError::Timeout`] when nothing arrived. A datagram that cannot
/// carry the header yields [`CaptureError::MalformedPacket`]; the source stays
/// usable afterwards.
pub trait PacketSource: Send + 'static {
    fn receive_packet(&mut self, timeout: Duration) -> Result<DataPacket>;
}

impl<S: PacketSource + ?Sized> PacketSource for Box<S> {
    fn receive_packet(&mut self, timeout: Duration) -> Result<DataPacket> {
        (**self).receive_packet(timeout)
    }
}

/// Data channel socket bound on the host capture address.
#[derive(Debug)]
pub struct UdpPacketSource {
    socket: UdpSocket,
    buffer: Vec<u8>,
}

impl UdpPacketSource {
    /// Bind the data port.
    ///
    /// `recv_buffer_size` asks the kernel for a larger socket buffer; the
    /// board bursts whole frames faster than a busy host drains them. The OS
    /// may clamp the request, which is logged but not an error.
    pub fn bind(
        local_addr: SocketAddr,
        max_datagram_size: usize,
        recv_buffer_size: Option<usize>,
    ) -> Result<Self> {
        let socket = Socket::new(Domain::for_address(local_addr), Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| CaptureError::socket("create data socket", e))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| CaptureError::socket("set SO_REUSEADDR on data socket", e))?;

        if let Some(requested) = recv_buffer_size {
            match socket.set_recv_buffer_size(requested) {
                Ok(()) => {
                    let actual = socket.recv_buffer_size().unwrap_or(0);
                    if actual < requested {
                        warn!(
                            "Data socket receive buffer clamped to {} bytes (requested {})",
                            actual, requested
                        );
                    } else {
                        debug!("Data socket receive buffer set to {} bytes", actual);
                    }
                }
                Err(e) => {
                    warn!("Failed to set data socket receive buffer to {} bytes: {}", requested, e)
                }
            }
        }

        socket
            .bind(&local_addr.into())
            .map_err(|e| CaptureError::socket(format!("bind data socket {}", local_addr), e))?;

        debug!("Data channel bound to {}", local_addr);
        Ok(Self::from_socket(socket.into(), max_datagram_size))
    }

    /// Wrap an already bound socket.
    pub fn from_socket(socket: UdpSocket, max_datagram_size: usize) -> Self {
        Self { socket, buffer: vec![0u8; max_datagram_size] }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(|e| CaptureError::socket("query data socket address", e))
    }
}

impl PacketSource for UdpPacketSource {
    fn receive_packet(&mut self, timeout: Duration) -> Result<DataPacket> {
        // A zero read timeout means "block forever" to the OS.
        let bounded = timeout.max(Duration::from_millis(1));
        self.socket
            .set_read_timeout(Some(bounded))
            .map_err(|e| CaptureError::socket("set data read timeout", e))?;

        match self.socket.recv_from(&mut self.buffer) {
            Ok((n, _)) => parse_datagram(&self.buffer[..n]),
            Err(e) if is_timeout_kind(&e) => Err(CaptureError::Timeout { duration: timeout }),
            Err(e) => Err(CaptureError::socket("receive data packet", e)),
        }
    }
}

/// In-memory datagram queue.
///
/// Replays recorded or synthetic traffic through the same parsing path as the
/// socket source. Returns [`CaptureError::Timeout`] once drained, like a
/// silent socket.
#[derive(Debug, Default, Clone)]
pub struct ReplaySource {
    datagrams: VecDeque<Vec<u8>>,
}

impl ReplaySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_datagram(&mut self, datagram: Vec<u8>) {
        self.datagrams.push_back(datagram);
    }

    pub fn remaining(&self) -> usize {
        self.datagrams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datagrams.is_empty()
    }
}

impl FromIterator<Vec<u8>> for ReplaySource {
    fn from_iter<I: IntoIterator<Item = Vec<u8>>>(iter: I) -> Self {
        Self { datagrams: iter.into_iter().collect() }
    }
}

impl PacketSource for ReplaySource {
    fn receive_packet(&mut self, timeout: Duration) -> Result<DataPacket> {
        match self.datagrams.pop_front() {
            Some(datagram) => parse_datagram(&datagram),
            None => {
                trace!("Replay source drained");
                Err(CaptureError::Timeout { duration: timeout })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::encode_datagram;

    #[test]
    fn replay_yields_packets_in_order_then_times_out() {
        let mut source: ReplaySource =
            [encode_datagram(1, 0, &[1, 2]), vec![0x00; 3], encode_datagram(2, 2, &[3, 4])]
                .into_iter()
                .collect();
        assert_eq!(source.remaining(), 3);

        let first = source.receive_packet(Duration::from_millis(10)).unwrap();
        assert_eq!(first.sequence_number, 1);

        assert!(matches!(
            source.receive_packet(Duration::from_millis(10)),
            Err(CaptureError::MalformedPacket { len: 3, .. })
        ));

        let second = source.receive_packet(Duration::from_millis(10)).unwrap();
        assert_eq!(second.payload, vec![3, 4]);

        let drained = source.receive_packet(Duration::from_millis(10));
        assert!(matches!(drained, Err(CaptureError::Timeout { .. })));
        assert!(source.is_empty());
    }

    #[test]
    fn udp_source_receives_datagrams() {
        let mut source =
            UdpPacketSource::bind("127.0.0.1:0".parse().unwrap(), 4096, Some(1 << 20)).unwrap();
        let target = source.local_addr().unwrap();

        let board = UdpSocket::bind("127.0.0.1:0").unwrap();
        board.send_to(&encode_datagram(7, 1024 * 6, &[9; 1024]), target).unwrap();

        let packet = source.receive_packet(Duration::from_secs(2)).unwrap();
        assert_eq!(packet.sequence_number, 7);
        assert_eq!(packet.byte_count, 6144);
        assert_eq!(packet.payload.len(), 1024);
    }

    #[test]
    fn silent_udp_source_times_out() {
        let mut source = UdpPacketSource::bind("127.0.0.1:0".parse().unwrap(), 4096, None).unwrap();
        let result = source.receive_packet(Duration::from_millis(20));
        match result {
            Err(err @ CaptureError::Timeout { .. }) => assert!(err.is_retryable()),
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }
}
