//! Per-client negotiation state (RFC 2326 §3, §12.37).
//!
//! A [`Session`] is owned by the single [`RtspUnit`](crate::unit::RtspUnit)
//! and records what the client asked for during SETUP:
//!
//! - the session ID (a UUID string, returned in the `Session` header);
//! - where media goes (destination IP and RTP/RTCP ports), or that it is
//!   interleaved on the control connection;
//! - the local port reserved for the unit's datagram channel.
//!
//! A session is ready to stream once it has both a session ID and a
//! positive destination port.

pub mod transport;

use std::net::{IpAddr, SocketAddr};

pub use transport::TransportHeader;

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub session_id: Option<String>,
    pub destination_ip: Option<IpAddr>,
    /// RTP destination port; 0 until a SETUP negotiated one.
    pub destination_port: u16,
    pub rtcp_destination_port: Option<u16>,
    pub interleaved: bool,
    /// Locally bound port reserved for this session, returned to the
    /// port pool when the unit closes.
    pub client_port: Option<u16>,
}

impl Session {
    /// Mint a fresh, globally unique session ID.
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Session ID and destination port are both set.
    pub fn is_configured(&self) -> bool {
        self.session_id.is_some() && self.destination_port > 0
    }

    pub fn rtp_destination(&self) -> Option<SocketAddr> {
        let ip = self.destination_ip?;
        (self.destination_port > 0).then(|| SocketAddr::new(ip, self.destination_port))
    }

    pub fn rtcp_destination(&self) -> Option<SocketAddr> {
        let ip = self.destination_ip?;
        self.rtcp_destination_port
            .map(|port| SocketAddr::new(ip, port))
    }

    /// Record a successful `client_port` negotiation under `session_id`.
    pub fn configure(
        &mut self,
        session_id: &str,
        destination_ip: IpAddr,
        rtp_port: u16,
        rtcp_port: Option<u16>,
    ) {
        self.destination_ip = Some(destination_ip);
        self.destination_port = rtp_port;
        self.rtcp_destination_port = rtcp_port;
        self.interleaved = false;
        self.session_id = Some(session_id.to_string());
        tracing::debug!(session_id, %destination_ip, rtp_port, ?rtcp_port, "session configured");
    }
}
