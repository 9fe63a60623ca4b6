use crate::error::{Result, RtspError};

/// Client transport request parsed from a SETUP `Transport` header
/// (RFC 2326 §12.39).
///
/// Only the last semicolon-separated parameter is inspected; it must be
/// either an `interleaved` marker or a `client_port` assignment:
///
/// ```text
/// Transport: RTP/AVP/TCP;unicast;interleaved=0-1   -> Interleaved
/// Transport: RTP/AVP;unicast;client_port=6000-6001 -> ClientPort { 6000, Some(6001) }
/// Transport: RTP/AVP;unicast;client_port=6000      -> ClientPort { 6000, None }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportHeader {
    /// Media must travel inside the RTSP control connection.
    Interleaved,
    /// Media goes to separate datagram ports on the client.
    ClientPort {
        rtp_port: u16,
        rtcp_port: Option<u16>,
    },
}

impl TransportHeader {
    /// Parse the `Transport` header value.
    ///
    /// ## Examples
    ///
    /// ```
    /// use rtsp::session::transport::TransportHeader;
    ///
    /// let th = TransportHeader::parse("RTP/AVP;unicast;client_port=8000-8001").unwrap();
    /// assert_eq!(th, TransportHeader::ClientPort { rtp_port: 8000, rtcp_port: Some(8001) });
    ///
    /// assert!(TransportHeader::parse("RTP/AVP;unicast").is_err());
    /// ```
    pub fn parse(header: &str) -> Result<Self> {
        let last = header
            .rsplit_once(';')
            .map_or(header, |(_, last)| last)
            .trim();

        if last.starts_with("interleaved") {
            return Ok(TransportHeader::Interleaved);
        }

        if !last.starts_with("client_port") {
            return Err(RtspError::InvalidTransport(header.to_string()));
        }

        let (_, ports) = last
            .rsplit_once('=')
            .ok_or_else(|| RtspError::InvalidTransport(header.to_string()))?;

        // RTCP is validated before it is trimmed off the RTP part.
        let (rtp, rtcp_port) = match ports.rsplit_once('-') {
            Some((rtp, rtcp)) => (rtp, Some(parse_port(rtcp, header)?)),
            None => (ports, None),
        };
        let rtp_port = parse_port(rtp, header)?;

        Ok(TransportHeader::ClientPort {
            rtp_port,
            rtcp_port,
        })
    }
}

/// Zero, negative, out-of-range and non-numeric values are all rejected.
fn parse_port(value: &str, header: &str) -> Result<u16> {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|port| *port > 0)
        .and_then(|port| u16::try_from(port).ok())
        .ok_or_else(|| RtspError::InvalidTransport(header.to_string()))
}
