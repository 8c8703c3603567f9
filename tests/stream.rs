//! Background capture over a real UDP data socket.

#![cfg(feature = "stream")]

use anyhow::{Context, Result};
use dca1000::packet::encode_datagram;
use dca1000::{
    CaptureConnection, DriverOptions, FrameGeometry, FrameLayout, FrameReader, PacketGeometry,
    UdpPacketSource,
};
use futures::StreamExt;
use std::net::UdpSocket;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn board_datagrams(count: u32, bytes_per_packet: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|index| {
            let payload = vec![(index % 256) as u8; bytes_per_packet];
            encode_datagram(index + 1, u64::from(index) * bytes_per_packet as u64, &payload)
        })
        .collect()
}

async fn connect(
    geometry: FrameGeometry,
    bytes_per_packet: usize,
) -> Result<(CaptureConnection, UdpSocket)> {
    let packet = PacketGeometry { max_datagram_size: 4096, bytes_per_packet };
    let layout = FrameLayout::new(&geometry, &packet)?;
    let source = UdpPacketSource::bind("127.0.0.1:0".parse()?, 4096, Some(4 << 20))?;
    let target = source.local_addr()?;

    let options = DriverOptions { poll_timeout: Duration::from_millis(20), frame_capacity: 32 };
    let connection = CaptureConnection::spawn(FrameReader::new(source, layout), geometry, options);

    let board = UdpSocket::bind("127.0.0.1:0")?;
    board.connect(target)?;
    Ok((connection, board))
}

#[tokio::test]
async fn frames_stream_in_order() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();
    let geometry = FrameGeometry::new(8, 4, 2, 64)?;
    let (connection, board) = connect(geometry, 1024).await?;
    let mut frames = Box::pin(connection.frames());

    for datagram in board_datagrams(16 * 2 + 1, 1024) {
        board.send(&datagram)?;
        // Loopback drops bursts when the receive buffer is clamped.
        tokio::time::sleep(Duration::from_micros(200)).await;
    }

    for expected in 0..2u64 {
        let frame = tokio::time::timeout(WAIT, frames.next()).await?.context("stream ended")?;
        assert_eq!(frame.frame_number, expected);
        assert_eq!(frame.data.len(), 16384);
        assert_eq!(frame.data[0], (expected * 16) as u8);
    }

    let stats = connection.close().await.context("reader task failed")?;
    assert_eq!(stats.frames_emitted, 2);
    Ok(())
}

#[tokio::test]
async fn stats_stream_reports_progress() -> Result<()> {
    let geometry = FrameGeometry::new(8, 4, 2, 64)?;
    let (connection, board) = connect(geometry, 1024).await?;
    let mut updates = Box::pin(connection.stats_updates());

    let initial = tokio::time::timeout(WAIT, updates.next()).await?.context("stats stream ended")?;
    assert_eq!(initial.packets_received, 0);

    for datagram in board_datagrams(17, 1024) {
        board.send(&datagram)?;
        tokio::time::sleep(Duration::from_micros(200)).await;
    }

    let progressed = tokio::time::timeout(WAIT, async {
        while let Some(stats) = updates.next().await {
            if stats.frames_emitted >= 1 {
                return Some(stats);
            }
        }
        None
    })
    .await?
    .context("stats stream ended")?;
    assert!(progressed.packets_received >= 17);
    assert_eq!(connection.current_stats().frames_emitted, 1);
    Ok(())
}

#[tokio::test]
async fn dropping_connection_stops_reader() -> Result<()> {
    let geometry = FrameGeometry::new(8, 4, 2, 64)?;
    let (connection, _board) = connect(geometry, 1024).await?;
    let frames = connection.frames();
    drop(connection);

    // The reader exits, closing the broadcast channel.
    let ended = tokio::time::timeout(WAIT, Box::pin(frames).next()).await?;
    assert!(ended.is_none());
    Ok(())
}
