use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::Result;

/// A UDP socket bound to a specific local port.
///
/// Streamers bind one of these on a port taken from the
/// [`PortPool`](crate::resource::PortPool) and hand the socket to the media
/// plane for RTP delivery. The socket is closed when the last clone of the
/// inner `Arc` is dropped.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
}

impl UdpTransport {
    pub fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::new(ip, port))?;
        let local_addr = socket.local_addr()?;
        tracing::trace!(%local_addr, "UDP socket bound");
        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn socket(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }
}

/// Receive loop for a unit's datagram channel (client RTCP reports).
///
/// Reports are only counted and traced; the loop polls `running` every
/// 100ms so deregistering the channel stops it promptly.
pub fn receive_loop(transport: UdpTransport, running: Arc<AtomicBool>) {
    let socket = transport.socket();
    if let Err(e) = socket.set_read_timeout(Some(Duration::from_millis(100))) {
        tracing::warn!(error = %e, "datagram channel cannot set read timeout");
        return;
    }

    let mut buf = [0u8; 1500];
    let mut received: u64 = 0;
    while running.load(Ordering::SeqCst) {
        match socket.recv_from(&mut buf) {
            Ok((len, peer)) => {
                received += 1;
                tracing::trace!(%peer, len, received, "datagram received");
            }
            Err(ref e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(e) => {
                tracing::warn!(error = %e, "datagram channel receive error");
                thread::sleep(Duration::from_millis(100));
            }
        }
    }
    tracing::debug!(local_addr = %transport.local_addr(), received, "datagram channel closed");
}
