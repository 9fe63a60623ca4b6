use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crate::error::{Result, RtspError};
use crate::media::{LoggingMediaPlane, MediaPlane};
use crate::protocol::MethodHandler;
use crate::resource::RangePortPool;
use crate::scheduler::ScheduleManager;
use crate::streamer::StreamerRegistry;
use crate::transport::{ChannelTable, UdpTransport, tcp, udp};
use crate::unit::{RtspUnit, RtspUnitManager};

/// Name of the schedule unit that runs PLAY/TEARDOWN stream control.
pub const DEFAULT_CONTROL_UNIT: &str = "rtsp-stream-control";

/// Server-level configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the RTSP unit listens on. Also used as the media
    /// destination IP and in the SDP `c=` line.
    pub listen_ip: IpAddr,
    /// RTSP control port. `0` lets the OS pick one.
    pub listen_port: u16,
    /// Local ports handed to streamers and the datagram channel.
    pub port_range: RangeInclusive<u16>,
    /// Worker threads in the stream-control schedule unit.
    pub control_pool_size: usize,
    /// Pending stream-control jobs allowed before submissions are rejected.
    pub control_queue_capacity: usize,
    pub control_unit_name: String,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_ip, self.listen_port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_port: 8554,
            port_range: 5000..=5999,
            control_pool_size: 4,
            control_queue_capacity: 64,
            control_unit_name: DEFAULT_CONTROL_UNIT.to_string(),
        }
    }
}

/// Top-level orchestrator.
///
/// Owns the port pool, channel table, unit manager, streamer registry and
/// schedule manager, and wires them into a [`MethodHandler`] served by
/// [`transport::tcp`](crate::transport::tcp).
pub struct Server {
    config: ServerConfig,
    running: Arc<AtomicBool>,
    port_pool: Arc<RangePortPool>,
    channels: Arc<ChannelTable>,
    units: Arc<RtspUnitManager>,
    registry: StreamerRegistry,
    scheduler: Arc<ScheduleManager>,
    local_addr: Option<SocketAddr>,
    accept_thread: Option<JoinHandle<()>>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_media_plane(config, Arc::new(LoggingMediaPlane))
    }

    /// Create a server that drives `media` for every streamer.
    pub fn with_media_plane(config: ServerConfig, media: Arc<dyn MediaPlane>) -> Self {
        let port_pool = Arc::new(RangePortPool::new(config.port_range.clone()));
        let channels = Arc::new(ChannelTable::new());
        let units = Arc::new(RtspUnitManager::new(port_pool.clone(), channels.clone()));
        let registry = StreamerRegistry::new(config.listen_ip, port_pool.clone(), media);

        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            port_pool,
            channels,
            units,
            registry,
            scheduler: Arc::new(ScheduleManager::new()),
            local_addr: None,
            accept_thread: None,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(RtspError::AlreadyRunning);
        }

        let listener = TcpListener::bind(self.config.listen_addr())?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        if let Err(e) = self.open(listener, local_addr) {
            self.release();
            return Err(e);
        }

        self.local_addr = Some(local_addr);
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(addr = %local_addr, "RTSP server listening");
        Ok(())
    }

    fn open(&mut self, listener: TcpListener, local_addr: SocketAddr) -> Result<()> {
        let name = &self.config.control_unit_name;
        self.scheduler.init_job(
            name,
            self.config.control_pool_size,
            self.config.control_queue_capacity,
        )?;

        let unit = self.units.open(self.config.listen_ip, local_addr.port());
        self.spawn_datagram_channel(&unit);

        let handler = MethodHandler::new(
            self.units.clone(),
            self.registry.clone(),
            self.scheduler.clone(),
            name,
        );
        let control = self.channels.register(&unit.control_channel_key());
        let accept = thread::Builder::new()
            .name("rtsp-accept".to_string())
            .spawn(move || tcp::accept_loop(listener, handler, control))?;
        self.accept_thread = Some(accept);
        Ok(())
    }

    /// Bind the unit's reserved client port and receive on it until the
    /// channel is deregistered. Failure leaves the unit without one.
    fn spawn_datagram_channel(&self, unit: &RtspUnit) {
        let (Some(port), Some(key)) = (unit.client_port(), unit.datagram_channel_key()) else {
            return;
        };

        let transport = match UdpTransport::bind(unit.listen_ip(), port) {
            Ok(transport) => transport,
            Err(e) => {
                tracing::warn!(port, error = %e, "datagram channel bind failed");
                return;
            }
        };

        let running = self.channels.register(&key);
        let spawned = thread::Builder::new()
            .name("rtsp-datagram".to_string())
            .spawn(move || udp::receive_loop(transport, running));
        if let Err(e) = spawned {
            tracing::warn!(port, error = %e, "datagram channel thread failed to start");
        }
    }

    /// Tear everything down: streamers, the stream-control unit, then the
    /// RTSP unit and its channels.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!("server stopping");
        self.release();

        if let Some(handle) = self.accept_thread.take()
            && handle.join().is_err()
        {
            tracing::warn!("accept loop exited with a panic");
        }
        self.local_addr = None;
    }

    fn release(&self) {
        let destroyed = self.registry.destroy_all();
        self.scheduler.stop_all(&self.config.control_unit_name);
        self.units.close();
        tracing::debug!(destroyed, ports_in_use = self.port_pool.in_use(), "server resources released");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bound control address; resolves a `0` listen port.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.local_addr.ok_or(RtspError::NotStarted)
    }

    /// The open RTSP unit.
    pub fn unit(&self) -> Result<Arc<RtspUnit>> {
        self.units.current().ok_or(RtspError::NoRtspUnit)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &StreamerRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<ScheduleManager> {
        &self.scheduler
    }

    pub fn port_pool(&self) -> &Arc<RangePortPool> {
        &self.port_pool
    }

    pub fn channels(&self) -> &Arc<ChannelTable> {
        &self.channels
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::localhost;

    fn config(range: RangeInclusive<u16>) -> ServerConfig {
        ServerConfig {
            listen_ip: localhost(),
            listen_port: 0,
            port_range: range,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:8554");
        assert_eq!(config.port_range, 5000..=5999);
        assert_eq!(config.control_unit_name, DEFAULT_CONTROL_UNIT);
    }

    #[test]
    fn accessors_fail_before_start() {
        let server = Server::new(config(46000..=46009));
        assert!(matches!(server.local_addr(), Err(RtspError::NotStarted)));
        assert!(matches!(server.unit(), Err(RtspError::NoRtspUnit)));
        assert!(!server.is_running());
    }

    #[test]
    fn start_registers_channels_and_stop_releases_them() {
        let mut server = Server::new(config(46010..=46019));
        server.start().unwrap();
        assert!(matches!(server.start(), Err(RtspError::AlreadyRunning)));

        let unit = server.unit().unwrap();
        assert_eq!(unit.listen_port(), server.local_addr().unwrap().port());
        assert!(server.channels().is_registered(&unit.control_channel_key()));
        assert!(
            server
                .channels()
                .is_registered(&unit.datagram_channel_key().unwrap())
        );
        assert!(server.scheduler().contains(DEFAULT_CONTROL_UNIT));
        assert_eq!(server.port_pool().in_use(), 1);

        server.stop();
        assert!(!server.is_running());
        assert!(server.channels().is_empty());
        assert!(!server.scheduler().contains(DEFAULT_CONTROL_UNIT));
        assert!(server.unit().is_err());
        assert_eq!(server.port_pool().in_use(), 0);
    }

    #[test]
    fn start_fails_when_port_taken() {
        let taken = TcpListener::bind((localhost(), 0)).unwrap();
        let mut server = Server::new(ServerConfig {
            listen_port: taken.local_addr().unwrap().port(),
            ..config(46020..=46029)
        });
        assert!(matches!(server.start(), Err(RtspError::Io(_))));
        assert!(!server.is_running());
        assert!(server.unit().is_err());
    }
}
