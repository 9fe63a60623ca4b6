//! SDP body returned by DESCRIBE.
//!
//! The engine serves a single fixed H.264 video description; only the
//! connection address varies with the listening unit:
//!
//! ```text
//! c=IN IP4 <listen-ip>
//! m=video 5004 RTP/AVP 96
//! a=rtpmap:96 H264/90000
//! ```

/// RTP port advertised on the `m=` line.
pub const MEDIA_PORT: u16 = 5004;

/// Dynamic payload type used for H.264.
pub const PAYLOAD_TYPE: u8 = 96;

pub const CONTENT_TYPE: &str = "application/sdp";

/// Generate the session description for a unit listening on `listen_ip`.
pub fn generate_sdp(listen_ip: &str) -> String {
    let sdp = [
        format!("c=IN IP4 {}", listen_ip),
        format!("m=video {} RTP/AVP {}", MEDIA_PORT, PAYLOAD_TYPE),
        format!("a=rtpmap:{} H264/90000", PAYLOAD_TYPE),
    ];

    format!("{}\r\n", sdp.join("\r\n"))
}
