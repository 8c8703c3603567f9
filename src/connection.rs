//! Async capture connection

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::driver::{Driver, DriverOptions};
use crate::organize::OrganizedFrame;
use crate::packet::PacketSource;
use crate::reassembly::{FrameReader, ReassemblyStats};
use crate::types::{CapturedFrame, FrameGeometry};
use crate::Result;

/// Frames from a background reader, exposed as streams.
///
/// Dropping the connection stops the reader.
pub struct CaptureConnection {
    frames: broadcast::Receiver<Arc<CapturedFrame>>,
    stats: watch::Receiver<ReassemblyStats>,
    geometry: FrameGeometry,
    cancel: CancellationToken,
    task: Option<JoinHandle<ReassemblyStats>>,
}

impl CaptureConnection {
    /// Start reading frames on a blocking task. Must be called within a tokio runtime.
    pub fn spawn<S>(reader: FrameReader<S>, geometry: FrameGeometry, options: DriverOptions) -> Self
    where
        S: PacketSource,
    {
        let channels = Driver::spawn(reader, options);
        info!("Capture connection started (poll timeout {:?})", options.poll_timeout);
        Self {
            frames: channels.frames,
            stats: channels.stats,
            geometry,
            cancel: channels.cancel,
            task: Some(channels.task),
        }
    }

    /// Frames completed after this call.
    ///
    /// A subscriber that falls more than the channel capacity behind skips
    /// the frames it missed.
    pub fn frames(&self) -> impl Stream<Item = Arc<CapturedFrame>> + 'static {
        BroadcastStream::new(self.frames.resubscribe()).filter_map(|result| async move {
            match result {
                Ok(frame) => Some(frame),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!("Frame subscriber lagged, skipped {} frames", skipped);
                    None
                }
            }
        })
    }

    /// Frames organized into `(chirps, virtual_channels, samples)` cubes.
    pub fn organized_frames(&self) -> impl Stream<Item = Result<OrganizedFrame>> + 'static {
        let geometry = self.geometry;
        self.frames().map(move |frame| frame.organize(&geometry))
    }

    /// Counter snapshots, starting with the current one.
    pub fn stats_updates(&self) -> impl Stream<Item = ReassemblyStats> + 'static {
        WatchStream::new(self.stats.clone())
    }

    pub fn current_stats(&self) -> ReassemblyStats {
        self.stats.borrow().clone()
    }

    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    /// Stop the reader and wait for its final counters.
    ///
    /// Returns `None` if the reader task panicked.
    pub async fn close(mut self) -> Option<ReassemblyStats> {
        self.cancel.cancel();
        let task = self.task.take()?;
        match task.await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("Frame reader task failed: {}", e);
                None
            }
        }
    }
}

impl Drop for CaptureConnection {
    fn drop(&mut self) {
        debug!("Dropping capture connection");
        self.cancel.cancel();
    }
}
