//! Network transport for RTSP signaling and the unit's datagram channel.
//!
//! - **TCP** ([`tcp`]): RTSP request/response signaling, one thread per
//!   client connection.
//! - **UDP** ([`udp`]): sockets bound for streamers, plus the unit's
//!   datagram channel receiving client reports.
//!
//! Every listening channel is registered in a [`ChannelTable`] under its
//! `"<ip>_<port>"` key. Its loop runs while the registration's flag is
//! set, so deregistering a key shuts the channel down.

pub mod tcp;
pub mod udp;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{Result, RtspError};
use crate::resource::ChannelDirectory;

pub use udp::UdpTransport;

/// Live channels keyed by `"<ip>_<port>"`.
#[derive(Debug, Default)]
pub struct ChannelTable {
    channels: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` and return the flag its loop should poll.
    ///
    /// Re-registering a key shuts down the channel that held it.
    pub fn register(&self, key: &str) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(true));
        if let Some(previous) = self.channels.lock().insert(key.to_string(), flag.clone()) {
            tracing::warn!(key, "channel key re-registered, closing previous channel");
            previous.store(false, Ordering::SeqCst);
        }
        tracing::debug!(key, "channel registered");
        flag
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.channels.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.lock().is_empty()
    }
}

impl ChannelDirectory for ChannelTable {
    fn deregister_channel(&self, key: &str) -> Result<()> {
        let flag = self
            .channels
            .lock()
            .remove(key)
            .ok_or_else(|| RtspError::ChannelNotFound(key.to_string()))?;
        flag.store(false, Ordering::SeqCst);
        tracing::debug!(key, "channel deregistered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deregister_clears_flag() {
        let table = ChannelTable::new();
        let flag = table.register("127.0.0.1_8554");
        assert!(flag.load(Ordering::SeqCst));
        assert!(table.is_registered("127.0.0.1_8554"));

        table.deregister_channel("127.0.0.1_8554").unwrap();
        assert!(!flag.load(Ordering::SeqCst));
        assert!(table.is_empty());
    }

    #[test]
    fn deregister_unknown_key_fails() {
        let table = ChannelTable::new();
        assert!(matches!(
            table.deregister_channel("10.0.0.1_554"),
            Err(RtspError::ChannelNotFound(_))
        ));
    }

    #[test]
    fn reregister_closes_previous() {
        let table = ChannelTable::new();
        let first = table.register("k");
        let second = table.register("k");
        assert!(!first.load(Ordering::SeqCst));
        assert!(second.load(Ordering::SeqCst));
        assert_eq!(table.len(), 1);
    }
}
