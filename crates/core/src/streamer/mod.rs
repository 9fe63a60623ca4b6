//! Streaming-session lifecycle.
//!
//! ```text
//! new()     -> Created
//! init()    -> Initialized   (port acquired, socket bound, SSRC picked)
//! start()   -> Streaming     (media plane started)
//! stop()    -> Initialized   (media plane stopped)
//! finish()  -> Finished      (socket dropped, port restored; terminal)
//! ```
//!
//! Start/stop requests coming through the scheduler are numbered with
//! [`Streamer::issue_command`] and applied with [`Streamer::apply`]. A
//! command older than the last one applied is skipped, so workers running
//! a PLAY and its TEARDOWN out of order still leave the stream stopped.

pub mod registry;

use std::fmt;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{Result, RtspError};
use crate::media::MediaPlane;
use crate::resource::PortPool;
use crate::transport::UdpTransport;

pub use registry::StreamerRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAction {
    Start,
    Stop,
}

impl fmt::Display for StreamAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamerState {
    Created,
    Initialized,
    Streaming,
    Finished,
}

/// Where the client wants media delivered, as negotiated by SETUP.
#[derive(Debug, Clone)]
pub struct Destination {
    pub ip: IpAddr,
    pub rtp_port: u16,
    pub rtcp_port: Option<u16>,
    /// Request URI of the SETUP that negotiated this destination.
    pub uri: String,
}

/// Everything the media plane needs to push one stream.
#[derive(Debug, Clone)]
pub struct StreamContext {
    pub key: String,
    pub uri: String,
    /// Local socket media is sent from.
    pub socket: Arc<UdpSocket>,
    pub local_addr: SocketAddr,
    pub rtp_destination: SocketAddr,
    pub rtcp_destination: Option<SocketAddr>,
    /// RTP synchronization source, chosen randomly (RFC 3550 §8.1).
    pub ssrc: u32,
}

struct Inner {
    state: StreamerState,
    context: Option<StreamContext>,
    port: Option<u16>,
    /// Sequence number of the last command passed to `apply`.
    applied: u64,
}

/// One streaming session's resources and media start/stop.
///
/// Owned by the [`StreamerRegistry`] entry that created it. All transitions
/// are serialized by an internal lock, so concurrent `start`/`stop`/`finish`
/// calls from scheduler workers are safe.
pub struct Streamer {
    key: String,
    listen_ip: IpAddr,
    destination: Destination,
    inner: Mutex<Inner>,
    commands: AtomicU64,
    port_pool: Arc<dyn PortPool>,
    media: Arc<dyn MediaPlane>,
}

impl Streamer {
    pub fn new(
        key: &str,
        listen_ip: IpAddr,
        destination: Destination,
        port_pool: Arc<dyn PortPool>,
        media: Arc<dyn MediaPlane>,
    ) -> Self {
        Self {
            key: key.to_string(),
            listen_ip,
            destination,
            inner: Mutex::new(Inner {
                state: StreamerState::Created,
                context: None,
                port: None,
                applied: 0,
            }),
            commands: AtomicU64::new(0),
            port_pool,
            media,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn state(&self) -> StreamerState {
        self.inner.lock().state
    }

    /// Local port the stream sends from, once initialized.
    pub fn local_port(&self) -> Option<u16> {
        self.inner.lock().port
    }

    pub fn context(&self) -> Option<StreamContext> {
        self.inner.lock().context.clone()
    }

    /// Acquire transport resources and wire up the media path.
    ///
    /// On failure nothing stays acquired and the streamer remains `Created`.
    pub fn init(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != StreamerState::Created {
            tracing::debug!(key = %self.key, state = ?inner.state, "streamer already initialized");
            return Ok(());
        }

        let port = self.port_pool.acquire()?;
        let transport = match UdpTransport::bind(self.listen_ip, port) {
            Ok(transport) => transport,
            Err(e) => {
                self.port_pool.restore(port);
                return Err(e);
            }
        };

        let context = StreamContext {
            key: self.key.clone(),
            uri: self.destination.uri.clone(),
            socket: transport.socket(),
            local_addr: transport.local_addr(),
            rtp_destination: SocketAddr::new(self.destination.ip, self.destination.rtp_port),
            rtcp_destination: self
                .destination
                .rtcp_port
                .map(|port| SocketAddr::new(self.destination.ip, port)),
            ssrc: rand::random::<u32>(),
        };

        tracing::debug!(
            key = %self.key,
            local = %context.local_addr,
            rtp = %context.rtp_destination,
            "streamer initialized"
        );

        inner.context = Some(context);
        inner.port = Some(port);
        inner.state = StreamerState::Initialized;
        Ok(())
    }

    /// Start media delivery. Idempotent while streaming.
    pub fn start(&self) -> Result<()> {
        self.start_locked(&mut self.inner.lock())
    }

    /// Stop media delivery. No-op unless streaming.
    pub fn stop(&self) {
        self.stop_locked(&mut self.inner.lock());
    }

    /// Number the next start/stop command for this streamer.
    pub fn issue_command(&self) -> u64 {
        self.commands.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Apply command `seq` unless a later one was already applied.
    ///
    /// Returns whether the command was applied.
    pub fn apply(&self, seq: u64, action: StreamAction) -> Result<bool> {
        let mut inner = self.inner.lock();
        if seq <= inner.applied {
            tracing::debug!(key = %self.key, seq, applied = inner.applied, %action, "superseded command skipped");
            return Ok(false);
        }
        inner.applied = seq;
        match action {
            StreamAction::Start => self.start_locked(&mut inner)?,
            StreamAction::Stop => self.stop_locked(&mut inner),
        }
        Ok(true)
    }

    fn start_locked(&self, inner: &mut Inner) -> Result<()> {
        match inner.state {
            StreamerState::Streaming => Ok(()),
            StreamerState::Finished => Err(RtspError::StreamerFinished(self.key.clone())),
            StreamerState::Created => {
                tracing::warn!(key = %self.key, "start on uninitialized streamer ignored");
                Ok(())
            }
            StreamerState::Initialized => {
                if let Some(context) = &inner.context {
                    self.media.start(context)?;
                }
                inner.state = StreamerState::Streaming;
                tracing::info!(key = %self.key, "streaming started");
                Ok(())
            }
        }
    }

    fn stop_locked(&self, inner: &mut Inner) {
        if inner.state != StreamerState::Streaming {
            tracing::debug!(key = %self.key, state = ?inner.state, "stop ignored, not streaming");
            return;
        }
        self.media.stop(&self.key);
        inner.state = StreamerState::Initialized;
        tracing::info!(key = %self.key, "streaming stopped");
    }

    /// Release everything and move to `Finished`.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn finish(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == StreamerState::Finished {
            return false;
        }

        if inner.state == StreamerState::Streaming {
            self.media.stop(&self.key);
        }
        if inner.context.take().is_some() {
            self.media.release(&self.key);
        }
        if let Some(port) = inner.port.take() {
            self.port_pool.restore(port);
        }

        inner.state = StreamerState::Finished;
        tracing::debug!(key = %self.key, "streamer finished");
        true
    }
}

impl fmt::Debug for Streamer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Streamer")
            .field("key", &self.key)
            .field("listen_ip", &self.listen_ip)
            .field("destination", &self.destination)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MediaEvent, RecordingMediaPlane, TestPortPool, localhost};

    fn streamer(pool: &Arc<TestPortPool>, media: &Arc<RecordingMediaPlane>) -> Streamer {
        Streamer::new(
            "s1",
            localhost(),
            Destination {
                ip: localhost(),
                rtp_port: 6000,
                rtcp_port: Some(6001),
                uri: "rtsp://127.0.0.1/stream".to_string(),
            },
            pool.clone(),
            media.clone(),
        )
    }

    #[test]
    fn init_acquires_port_and_builds_context() {
        let pool = Arc::new(TestPortPool::new());
        let media = Arc::new(RecordingMediaPlane::new());
        let s = streamer(&pool, &media);

        assert_eq!(s.state(), StreamerState::Created);
        s.init().unwrap();
        assert_eq!(s.state(), StreamerState::Initialized);

        let ctx = s.context().unwrap();
        assert_eq!(Some(ctx.local_addr.port()), s.local_port());
        assert_eq!(ctx.rtp_destination.port(), 6000);
        assert_eq!(ctx.rtcp_destination.map(|a| a.port()), Some(6001));
    }

    #[test]
    fn start_is_idempotent_and_stop_returns_to_initialized() {
        let pool = Arc::new(TestPortPool::new());
        let media = Arc::new(RecordingMediaPlane::new());
        let s = streamer(&pool, &media);
        s.init().unwrap();

        s.start().unwrap();
        s.start().unwrap();
        assert_eq!(s.state(), StreamerState::Streaming);
        assert_eq!(media.count(&MediaEvent::Start("s1".into())), 1);

        s.stop();
        s.stop();
        assert_eq!(s.state(), StreamerState::Initialized);
        assert_eq!(media.count(&MediaEvent::Stop("s1".into())), 1);
    }

    #[test]
    fn stop_without_start_is_noop() {
        let pool = Arc::new(TestPortPool::new());
        let media = Arc::new(RecordingMediaPlane::new());
        let s = streamer(&pool, &media);
        s.init().unwrap();
        s.stop();
        assert!(media.events().is_empty());
    }

    #[test]
    fn finish_releases_exactly_once() {
        let pool = Arc::new(TestPortPool::new());
        let media = Arc::new(RecordingMediaPlane::new());
        let s = streamer(&pool, &media);
        s.init().unwrap();
        let port = s.local_port().unwrap();
        s.start().unwrap();

        assert!(s.finish());
        assert!(!s.finish());
        assert_eq!(s.state(), StreamerState::Finished);
        assert_eq!(pool.restore_count(port), 1);
        assert_eq!(media.count(&MediaEvent::Stop("s1".into())), 1);
        assert_eq!(media.count(&MediaEvent::Release("s1".into())), 1);
        assert!(matches!(s.start(), Err(RtspError::StreamerFinished(_))));
    }

    #[test]
    fn finish_without_init_releases_nothing() {
        let pool = Arc::new(TestPortPool::new());
        let media = Arc::new(RecordingMediaPlane::new());
        let s = streamer(&pool, &media);
        assert!(s.finish());
        assert!(media.events().is_empty());
        assert_eq!(pool.total_restores(), 0);
    }

    #[test]
    fn failed_start_keeps_streamer_initialized() {
        let pool = Arc::new(TestPortPool::new());
        let media = Arc::new(RecordingMediaPlane::failing());
        let s = streamer(&pool, &media);
        s.init().unwrap();
        assert!(s.start().is_err());
        assert_eq!(s.state(), StreamerState::Initialized);
    }

    #[test]
    fn stale_command_is_skipped() {
        let pool = Arc::new(TestPortPool::new());
        let media = Arc::new(RecordingMediaPlane::new());
        let s = streamer(&pool, &media);
        s.init().unwrap();

        let play = s.issue_command();
        let teardown = s.issue_command();
        assert!(teardown > play);

        assert!(s.apply(teardown, StreamAction::Stop).unwrap());
        assert!(!s.apply(play, StreamAction::Start).unwrap());
        assert_eq!(s.state(), StreamerState::Initialized);
        assert!(media.events().is_empty());
    }

    #[test]
    fn commands_in_order_are_all_applied() {
        let pool = Arc::new(TestPortPool::new());
        let media = Arc::new(RecordingMediaPlane::new());
        let s = streamer(&pool, &media);
        s.init().unwrap();

        let play = s.issue_command();
        let teardown = s.issue_command();
        assert!(s.apply(play, StreamAction::Start).unwrap());
        assert_eq!(s.state(), StreamerState::Streaming);
        assert!(s.apply(teardown, StreamAction::Stop).unwrap());
        assert_eq!(s.state(), StreamerState::Initialized);
        assert_eq!(
            media.events(),
            vec![MediaEvent::Start("s1".into()), MediaEvent::Stop("s1".into())]
        );
    }

    #[test]
    fn destination_is_kept_as_negotiated() {
        let pool = Arc::new(TestPortPool::new());
        let media = Arc::new(RecordingMediaPlane::new());
        let s = streamer(&pool, &media);
        let destination = s.destination();
        assert_eq!(destination.rtp_port, 6000);
        assert_eq!(destination.rtcp_port, Some(6001));
        assert_eq!(destination.uri, "rtsp://127.0.0.1/stream");
    }
}
