//! RTSP session and stream-control engine.
//!
//! A [`Server`] opens a single RTSP unit, negotiates one client session
//! over OPTIONS/DESCRIBE/SETUP/PLAY/TEARDOWN, and tracks one
//! [`Streamer`](streamer::Streamer) per negotiated session. Streaming
//! start/stop runs on a [`ScheduleManager`](scheduler::ScheduleManager)
//! worker pool so signaling never blocks on the media plane.

pub mod error;
pub mod media;
pub mod protocol;
pub mod resource;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod streamer;
pub mod transport;
pub mod unit;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Result, RtspError};
pub use media::{LoggingMediaPlane, MediaPlane};
pub use protocol::{MethodHandler, RtspRequest, RtspResponse};
pub use scheduler::{Job, ScheduleManager, ScheduleUnit};
pub use server::{Server, ServerConfig};
pub use streamer::{Streamer, StreamerRegistry};
pub use unit::{ProtocolState, RtspUnit, RtspUnitManager};
