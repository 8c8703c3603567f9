//! Driver runs frame reassembly on a background task

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::packet::PacketSource;
use crate::reassembly::{FrameReader, ReassemblyStats};
use crate::types::CapturedFrame;

/// Tuning for the background reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverOptions {
    /// Bound on each frame pull; also bounds how long cancellation takes.
    pub poll_timeout: Duration,
    /// Frames buffered per subscriber before the slowest starts skipping.
    pub frame_capacity: usize,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self { poll_timeout: Duration::from_millis(100), frame_capacity: 16 }
    }
}

/// Result of spawning the driver task
pub struct DriverChannels {
    /// Completed frames
    pub frames: broadcast::Receiver<Arc<CapturedFrame>>,
    /// Counter snapshots, refreshed after every pull
    pub stats: watch::Receiver<ReassemblyStats>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    /// Resolves to the final counters once the task stops
    pub task: JoinHandle<ReassemblyStats>,
}

/// Moves a [`FrameReader`] onto a blocking task and publishes its frames.
pub struct Driver;

impl Driver {
    /// Spawn the reader task. Must be called within a tokio runtime.
    pub fn spawn<S>(reader: FrameReader<S>, options: DriverOptions) -> DriverChannels
    where
        S: PacketSource,
    {
        let (frame_tx, frame_rx) = broadcast::channel(options.frame_capacity.max(1));
        let (stats_tx, stats_rx) = watch::channel(reader.stats());
        let cancel = CancellationToken::new();
        let cancel_reader = cancel.clone();

        let task = tokio::task::spawn_blocking(move || {
            Self::frame_reader_loop(reader, options.poll_timeout, frame_tx, stats_tx, cancel_reader)
        });

        DriverChannels { frames: frame_rx, stats: stats_rx, cancel, task }
    }

    fn frame_reader_loop<S>(
        mut reader: FrameReader<S>,
        poll_timeout: Duration,
        frame_tx: broadcast::Sender<Arc<CapturedFrame>>,
        stats_tx: watch::Sender<ReassemblyStats>,
        cancel: CancellationToken,
    ) -> ReassemblyStats
    where
        S: PacketSource,
    {
        info!("Frame reader task started");
        let mut frame_count = 0u64;
        let mut error_count = 0u32;
        const MAX_ERRORS: u32 = 10;

        loop {
            // Checked between pulls; a pull lasts at most poll_timeout.
            if cancel.is_cancelled() {
                info!("Frame reader cancelled");
                break;
            }

            match reader.next_frame(poll_timeout) {
                Ok(frame) => {
                    frame_count += 1;
                    error_count = 0;
                    trace!(
                        "Frame {}: {} packets, {} lost",
                        frame.frame_number, frame.packets_received, frame.lost_packets
                    );

                    if frame_tx.send(Arc::new(frame)).is_err() {
                        debug!("Frame receivers dropped, shutting down");
                        break;
                    }
                    stats_tx.send_replace(reader.stats());
                }
                Err(e) if e.is_timeout() => {
                    stats_tx.send_if_modified(|current| {
                        let latest = reader.stats();
                        let changed = *current != latest;
                        *current = latest;
                        changed
                    });
                }
                Err(e) => {
                    error_count += 1;
                    error!("Frame reader error ({}/{}): {}", error_count, MAX_ERRORS, e);

                    if error_count >= MAX_ERRORS {
                        error!("Too many frame reader errors, shutting down");
                        break;
                    }

                    // Exponential backoff: 100ms, 200ms, 400ms, ...
                    let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                    std::thread::sleep(backoff);
                }
            }
        }

        let stats = reader.stats();
        stats_tx.send_replace(stats.clone());
        info!("Frame reader task ended (published {} frames)", frame_count);
        stats
    }
}
