//! RTSP signaling (RFC 2326).
//!
//! Requests arrive already decoded as [`RtspRequest`]; the
//! [`MethodHandler`] applies them to the open unit and produces an
//! [`RtspResponse`] (or nothing, for dropped requests).
//!
//! ## Supported methods
//!
//! | Method | Effect | State after |
//! |--------|--------|-------------|
//! | OPTIONS | Lists public methods | unchanged |
//! | DESCRIBE | Returns fixed H.264 SDP | unchanged |
//! | SETUP | Negotiates client ports, registers a streamer | Ready |
//! | PLAY | Queues streaming start | Playing |
//! | TEARDOWN | Queues streaming stop | Stopped |
//!
//! Anything else gets `404 Not Found` and the connection is closed.
//! Every response echoes `CSeq` and `Session` from the request.

pub mod handler;
pub mod request;
pub mod response;
pub mod sdp;

pub use handler::MethodHandler;
pub use request::{Method, RtspRequest};
pub use response::RtspResponse;
