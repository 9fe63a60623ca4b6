use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, RtspError};
use crate::media::MediaPlane;
use crate::resource::PortPool;
use crate::streamer::{Destination, StreamAction, Streamer};

/// Thread-safe table of live streamers for one listening endpoint.
///
/// A single mutex guards the key → streamer map. Streamer transitions
/// (`start`, `stop`, `finish`) run outside that lock; bulk teardown walks
/// a snapshot taken with [`clone_all`](Self::clone_all) so finishing a
/// streamer may safely re-enter the registry.
#[derive(Clone)]
pub struct StreamerRegistry {
    listen_ip: IpAddr,
    streamers: Arc<Mutex<HashMap<String, Arc<Streamer>>>>,
    port_pool: Arc<dyn PortPool>,
    media: Arc<dyn MediaPlane>,
}

impl StreamerRegistry {
    pub fn new(listen_ip: IpAddr, port_pool: Arc<dyn PortPool>, media: Arc<dyn MediaPlane>) -> Self {
        Self {
            listen_ip,
            streamers: Arc::new(Mutex::new(HashMap::new())),
            port_pool,
            media,
        }
    }

    pub fn listen_ip(&self) -> IpAddr {
        self.listen_ip
    }

    /// Create, initialize and register a streamer under `key`.
    ///
    /// Fails with [`RtspError::DuplicateSession`] if `key` is live. If
    /// initialization fails nothing is registered.
    pub fn create_session(&self, key: &str, destination: Destination) -> Result<Arc<Streamer>> {
        let mut streamers = self.streamers.lock();
        if streamers.contains_key(key) {
            tracing::warn!(key, "streamer already registered");
            return Err(RtspError::DuplicateSession(key.to_string()));
        }

        let streamer = Arc::new(Streamer::new(
            key,
            self.listen_ip,
            destination,
            self.port_pool.clone(),
            self.media.clone(),
        ));
        if let Err(e) = streamer.init() {
            tracing::warn!(key, error = %e, "failed to initialize streamer");
            return Err(e);
        }

        streamers.insert(key.to_string(), streamer.clone());
        tracing::info!(key, total = streamers.len(), "streamer created");
        Ok(streamer)
    }

    /// Finish and remove the streamer under `key`.
    ///
    /// A missing key is only logged. Returns whether an entry was removed.
    pub fn destroy_session(&self, key: &str) -> bool {
        let Some(streamer) = self.lookup(key) else {
            tracing::warn!(key, "no streamer to destroy");
            return false;
        };

        streamer.finish();
        let removed = self.remove_if_same(key, &streamer);
        if removed {
            tracing::debug!(key, "streamer destroyed");
        }
        removed
    }

    /// Finish and remove every streamer. Returns how many were removed.
    pub fn destroy_all(&self) -> usize {
        let snapshot = self.clone_all();
        let mut removed = 0;
        for (key, streamer) in &snapshot {
            streamer.finish();
            if self.remove_if_same(key, streamer) {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "all streamers destroyed");
        }
        removed
    }

    pub fn lookup(&self, key: &str) -> Option<Arc<Streamer>> {
        self.streamers.lock().get(key).cloned()
    }

    /// Start streaming for `key`; a missing key is a logged no-op.
    pub fn start_streaming(&self, key: &str) -> Result<()> {
        match self.lookup(key) {
            Some(streamer) => streamer.start(),
            None => {
                tracing::warn!(key, "start streaming for unknown session");
                Ok(())
            }
        }
    }

    /// Stop streaming for `key`; a missing key is a logged no-op.
    pub fn stop_streaming(&self, key: &str) {
        match self.lookup(key) {
            Some(streamer) => streamer.stop(),
            None => tracing::warn!(key, "stop streaming for unknown session"),
        }
    }

    /// Number the next start/stop command for `key`, if it is registered.
    pub fn issue_command(&self, key: &str) -> Option<u64> {
        self.lookup(key).map(|streamer| streamer.issue_command())
    }

    /// Apply a numbered command issued by [`issue_command`](Self::issue_command).
    ///
    /// Returns `Ok(false)` if a later command for `key` was already applied.
    pub fn apply_command(&self, key: &str, seq: u64, action: StreamAction) -> Result<bool> {
        let streamer = self
            .lookup(key)
            .ok_or_else(|| RtspError::SessionNotFound(key.to_string()))?;
        streamer.apply(seq, action)
    }

    /// Point-in-time copy of the table.
    pub fn clone_all(&self) -> HashMap<String, Arc<Streamer>> {
        self.streamers.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.streamers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.streamers.lock().is_empty()
    }

    /// Only remove the entry if it still holds `streamer`; the key may have
    /// been re-registered while the lock was released.
    fn remove_if_same(&self, key: &str, streamer: &Arc<Streamer>) -> bool {
        let mut streamers = self.streamers.lock();
        match streamers.get(key) {
            Some(current) if Arc::ptr_eq(current, streamer) => {
                streamers.remove(key);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamer::StreamerState;
    use crate::test_support::{MediaEvent, RecordingMediaPlane, TestPortPool, localhost};

    fn destination() -> Destination {
        Destination {
            ip: localhost(),
            rtp_port: 6000,
            rtcp_port: None,
            uri: "rtsp://127.0.0.1/stream".to_string(),
        }
    }

    fn registry() -> (StreamerRegistry, Arc<TestPortPool>, Arc<RecordingMediaPlane>) {
        let pool = Arc::new(TestPortPool::new());
        let media = Arc::new(RecordingMediaPlane::new());
        let registry = StreamerRegistry::new(localhost(), pool.clone(), media.clone());
        (registry, pool, media)
    }

    #[test]
    fn create_and_lookup() {
        let (registry, _, _) = registry();
        let streamer = registry.create_session("a", destination()).unwrap();
        assert_eq!(streamer.state(), StreamerState::Initialized);
        assert!(Arc::ptr_eq(&registry.lookup("a").unwrap(), &streamer));
        assert!(registry.lookup("b").is_none());
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let (registry, _, _) = registry();
        registry.create_session("a", destination()).unwrap();
        assert!(matches!(
            registry.create_session("a", destination()),
            Err(RtspError::DuplicateSession(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn init_failure_leaves_no_entry() {
        let media = Arc::new(RecordingMediaPlane::new());
        let registry =
            StreamerRegistry::new(localhost(), Arc::new(TestPortPool::exhausted()), media);
        assert!(registry.create_session("a", destination()).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn destroy_missing_key_is_noop() {
        let (registry, _, _) = registry();
        assert!(!registry.destroy_session("missing"));
    }

    #[test]
    fn destroy_finishes_and_removes() {
        let (registry, pool, _) = registry();
        let streamer = registry.create_session("a", destination()).unwrap();
        let port = streamer.local_port().unwrap();

        assert!(registry.destroy_session("a"));
        assert_eq!(streamer.state(), StreamerState::Finished);
        assert_eq!(pool.restore_count(port), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn destroy_all_finishes_each_exactly_once() {
        let (registry, pool, media) = registry();
        let streamers: Vec<_> = (0..5)
            .map(|i| registry.create_session(&format!("s{i}"), destination()).unwrap())
            .collect();
        let ports: Vec<u16> = streamers.iter().filter_map(|s| s.local_port()).collect();
        registry.start_streaming("s0").unwrap();

        assert_eq!(registry.destroy_all(), 5);
        assert!(registry.is_empty());
        for (streamer, port) in streamers.iter().zip(ports) {
            assert_eq!(streamer.state(), StreamerState::Finished);
            assert_eq!(pool.restore_count(port), 1);
            assert_eq!(
                media.count(&MediaEvent::Release(streamer.key().to_string())),
                1
            );
        }
        assert_eq!(registry.destroy_all(), 0);
    }

    #[test]
    fn start_and_stop_delegate_to_streamer() {
        let (registry, _, media) = registry();
        registry.create_session("a", destination()).unwrap();

        registry.start_streaming("a").unwrap();
        assert_eq!(registry.lookup("a").unwrap().state(), StreamerState::Streaming);
        registry.stop_streaming("a");
        assert_eq!(registry.lookup("a").unwrap().state(), StreamerState::Initialized);

        registry.start_streaming("missing").unwrap();
        registry.stop_streaming("missing");
        assert_eq!(
            media.events(),
            vec![MediaEvent::Start("a".into()), MediaEvent::Stop("a".into())]
        );
    }

    #[test]
    fn clone_all_is_a_snapshot() {
        let (registry, _, _) = registry();
        registry.create_session("a", destination()).unwrap();
        let snapshot = registry.clone_all();
        registry.destroy_session("a");
        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn commands_for_unknown_key() {
        let registry = StreamerRegistry::new(
            localhost(),
            Arc::new(TestPortPool::new()),
            Arc::new(RecordingMediaPlane::new()),
        );
        assert_eq!(registry.issue_command("missing"), None);
        assert!(matches!(
            registry.apply_command("missing", 1, StreamAction::Start),
            Err(RtspError::SessionNotFound(_))
        ));
    }
}
