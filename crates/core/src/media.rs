//! Media-plane seam.
//!
//! The engine never builds or sends RTP itself. A [`Streamer`] wires a
//! [`StreamContext`] (bound socket, client addresses, SSRC) and then asks
//! a [`MediaPlane`] implementation to start, stop and finally release the
//! delivery for that stream.
//!
//! [`Streamer`]: crate::streamer::Streamer

use crate::error::Result;
use crate::streamer::StreamContext;

/// Media delivery backend driven by [`Streamer`](crate::streamer::Streamer).
///
/// Implementations must not block: `start` should hand the stream off to
/// its own sender (thread, task, hardware pipeline) and return.
pub trait MediaPlane: Send + Sync {
    /// Begin pushing media for `context`.
    fn start(&self, context: &StreamContext) -> Result<()>;

    /// Pause delivery for the stream identified by `key`.
    fn stop(&self, key: &str);

    /// The stream is gone for good; drop any per-stream state.
    fn release(&self, key: &str) {
        let _ = key;
    }
}

/// [`MediaPlane`] that only records lifecycle calls in the log.
///
/// Used by the standalone binary when no real media source is attached.
#[derive(Debug, Default)]
pub struct LoggingMediaPlane;

impl MediaPlane for LoggingMediaPlane {
    fn start(&self, context: &StreamContext) -> Result<()> {
        tracing::info!(
            key = %context.key,
            rtp = %context.rtp_destination,
            rtcp = ?context.rtcp_destination,
            ssrc = format_args!("{:#010X}", context.ssrc),
            "media plane start"
        );
        Ok(())
    }

    fn stop(&self, key: &str) {
        tracing::info!(key, "media plane stop");
    }

    fn release(&self, key: &str) {
        tracing::debug!(key, "media plane release");
    }
}
