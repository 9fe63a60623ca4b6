//! Process-wide resources the engine borrows but does not own.
//!
//! - [`PortPool`]: local UDP ports handed to streamers and to the unit's
//!   datagram channel, and given back on release.
//! - [`ChannelDirectory`]: the transport layer's table of listening
//!   channels, addressed by `"<ip>_<port>"` keys.

use std::collections::{BTreeSet, VecDeque};
use std::ops::RangeInclusive;

use parking_lot::Mutex;

use crate::error::{Result, RtspError};

/// Source of local ports for datagram sockets.
pub trait PortPool: Send + Sync {
    /// Reserve a free port.
    fn acquire(&self) -> Result<u16>;

    /// Return a previously acquired port. Best effort: unknown ports are
    /// logged and ignored.
    fn restore(&self, port: u16);
}

/// Deregistration side of the transport's channel table.
pub trait ChannelDirectory: Send + Sync {
    fn deregister_channel(&self, key: &str) -> Result<()>;
}

/// Key under which a channel bound to `ip:port` is registered.
pub fn channel_key(ip: &str, port: u16) -> String {
    format!("{}_{}", ip, port)
}

/// [`PortPool`] over a fixed inclusive port range.
///
/// Ports are handed out lowest-first and restored ports go to the back of
/// the free list, so a just-released port is not immediately reused.
pub struct RangePortPool {
    inner: Mutex<PoolState>,
}

struct PoolState {
    free: VecDeque<u16>,
    in_use: BTreeSet<u16>,
}

impl RangePortPool {
    pub fn new(range: RangeInclusive<u16>) -> Self {
        tracing::debug!(min = range.start(), max = range.end(), "port pool created");
        Self {
            inner: Mutex::new(PoolState {
                free: range.collect(),
                in_use: BTreeSet::new(),
            }),
        }
    }

    pub fn available(&self) -> usize {
        self.inner.lock().free.len()
    }

    pub fn in_use(&self) -> usize {
        self.inner.lock().in_use.len()
    }
}

impl PortPool for RangePortPool {
    fn acquire(&self) -> Result<u16> {
        let mut state = self.inner.lock();
        let port = state.free.pop_front().ok_or(RtspError::PortPoolExhausted)?;
        state.in_use.insert(port);
        tracing::trace!(port, remaining = state.free.len(), "port acquired");
        Ok(port)
    }

    fn restore(&self, port: u16) {
        let mut state = self.inner.lock();
        if !state.in_use.remove(&port) {
            tracing::warn!(port, "restoring a port that was not acquired");
            return;
        }
        state.free.push_back(port);
        tracing::trace!(port, available = state.free.len(), "port restored");
    }
}
