//! The listening unit and its single client session.
//!
//! ## Protocol state (driven only by requests)
//!
//! ```text
//! open()    -> Init
//! SETUP     -> Ready     (destination + session id negotiated)
//! PLAY      -> Playing
//! TEARDOWN  -> Stopped
//! ```
//!
//! At most one unit exists per [`RtspUnitManager`]. Closing the unit hands
//! its ports and channels back to the transport but leaves streamers alone;
//! call [`StreamerRegistry::destroy_all`](crate::streamer::StreamerRegistry::destroy_all)
//! for those.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::resource::{ChannelDirectory, PortPool, channel_key};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Init,
    Ready,
    Playing,
    Stopped,
}

/// A listening endpoint plus the session negotiated on it.
#[derive(Debug)]
pub struct RtspUnit {
    listen_ip: IpAddr,
    listen_port: u16,
    session: Mutex<Session>,
    state: Mutex<ProtocolState>,
}

impl RtspUnit {
    pub fn new(listen_ip: IpAddr, listen_port: u16) -> Self {
        Self {
            listen_ip,
            listen_port,
            session: Mutex::new(Session::default()),
            state: Mutex::new(ProtocolState::Init),
        }
    }

    pub fn listen_ip(&self) -> IpAddr {
        self.listen_ip
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_ip, self.listen_port)
    }

    pub fn state(&self) -> ProtocolState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: ProtocolState) {
        let mut current = self.state.lock();
        if *current != state {
            tracing::debug!(unit = %self.listen_addr(), old_state = ?*current, new_state = ?state, "state transition");
            *current = state;
        }
    }

    /// Copy of the current session record.
    pub fn session(&self) -> Session {
        self.session.lock().clone()
    }

    /// Mutate the session record under its lock.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        f(&mut self.session.lock())
    }

    pub fn client_port(&self) -> Option<u16> {
        self.session.lock().client_port
    }

    /// Key of the control (RTSP) channel in the transport's channel table.
    pub fn control_channel_key(&self) -> String {
        channel_key(&self.listen_ip.to_string(), self.listen_port)
    }

    /// Key of the datagram channel, once a client port is reserved.
    pub fn datagram_channel_key(&self) -> Option<String> {
        self.client_port()
            .map(|port| channel_key(&self.listen_ip.to_string(), port))
    }
}

/// Holder of the one active [`RtspUnit`].
///
/// Constructed once at startup with the port pool and channel table it
/// returns resources to.
pub struct RtspUnitManager {
    unit: Mutex<Option<Arc<RtspUnit>>>,
    port_pool: Arc<dyn PortPool>,
    channels: Arc<dyn ChannelDirectory>,
}

impl RtspUnitManager {
    pub fn new(port_pool: Arc<dyn PortPool>, channels: Arc<dyn ChannelDirectory>) -> Self {
        Self {
            unit: Mutex::new(None),
            port_pool,
            channels,
        }
    }

    /// Open the unit for `ip:port`, or return the one already open.
    ///
    /// A client port for the unit's datagram channel is reserved from the
    /// pool; if the pool is exhausted the unit opens without one.
    pub fn open(&self, ip: IpAddr, port: u16) -> Arc<RtspUnit> {
        let mut slot = self.unit.lock();
        if let Some(unit) = slot.as_ref() {
            tracing::debug!(unit = %unit.listen_addr(), "RTSP unit already open");
            return unit.clone();
        }

        let unit = Arc::new(RtspUnit::new(ip, port));
        match self.port_pool.acquire() {
            Ok(client_port) => unit.with_session(|s| s.client_port = Some(client_port)),
            Err(e) => tracing::warn!(error = %e, "RTSP unit opened without a client port"),
        }

        tracing::info!(unit = %unit.listen_addr(), client_port = ?unit.client_port(), "RTSP unit opened");
        *slot = Some(unit.clone());
        unit
    }

    /// Close the open unit. Returns `false` if none was open.
    ///
    /// Channel deregistration and port restoration are best effort.
    pub fn close(&self) -> bool {
        let Some(unit) = self.unit.lock().take() else {
            return false;
        };

        let keys = std::iter::once(unit.control_channel_key()).chain(unit.datagram_channel_key());
        for key in keys {
            if let Err(e) = self.channels.deregister_channel(&key) {
                tracing::warn!(%key, error = %e, "failed to deregister channel");
            }
        }

        if let Some(port) = unit.client_port() {
            self.port_pool.restore(port);
        }

        tracing::info!(unit = %unit.listen_addr(), "RTSP unit closed");
        true
    }

    pub fn current(&self) -> Option<Arc<RtspUnit>> {
        self.unit.lock().clone()
    }
}
