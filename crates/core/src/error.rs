//! Error types for the RTSP streaming engine.

use std::fmt;

/// Errors that can occur in the RTSP streaming engine.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Protocol**: [`Parse`](Self::Parse), [`InvalidTransport`](Self::InvalidTransport).
/// - **Transport**: [`Io`](Self::Io).
/// - **Sessions**: [`DuplicateSession`](Self::DuplicateSession),
///   [`SessionNotFound`](Self::SessionNotFound),
///   [`StreamerFinished`](Self::StreamerFinished).
/// - **Scheduler**: [`ScheduleUnitNotFound`](Self::ScheduleUnitNotFound),
///   [`ScheduleQueueFull`](Self::ScheduleQueueFull),
///   [`DuplicateJob`](Self::DuplicateJob),
///   [`ScheduleUnitStopped`](Self::ScheduleUnitStopped).
/// - **Resources**: [`PortPoolExhausted`](Self::PortPoolExhausted),
///   [`ChannelNotFound`](Self::ChannelNotFound),
///   [`NoRtspUnit`](Self::NoRtspUnit).
/// - **Server**: [`NotStarted`](Self::NotStarted),
///   [`AlreadyRunning`](Self::AlreadyRunning).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse an RTSP request message (RFC 2326 §6).
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The `Transport` header of a SETUP request could not be negotiated.
    #[error("invalid transport header: {0}")]
    InvalidTransport(String),

    /// A live streamer is already registered under this key.
    #[error("session already exists: {0}")]
    DuplicateSession(String),

    /// No streamer is registered under this key.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The streamer has released its resources and cannot be reused.
    #[error("streamer already finished: {0}")]
    StreamerFinished(String),

    /// No schedule unit exists with the given name.
    #[error("schedule unit not found: {0}")]
    ScheduleUnitNotFound(String),

    /// The schedule unit's pending queue is at capacity.
    #[error("schedule unit {unit} queue is full (capacity {capacity})")]
    ScheduleQueueFull { unit: String, capacity: usize },

    /// A job with the same key is already queued or running in the unit.
    #[error("job already active in schedule unit {unit}: {key}")]
    DuplicateJob { unit: String, key: String },

    /// The schedule unit was stopped and accepts no more work.
    #[error("schedule unit stopped: {0}")]
    ScheduleUnitStopped(String),

    /// The port pool has no free port left.
    #[error("port pool exhausted")]
    PortPoolExhausted,

    /// No channel is registered under this key.
    #[error("channel not registered: {0}")]
    ChannelNotFound(String),

    /// No RTSP unit is currently open.
    #[error("no RTSP unit is open")]
    NoRtspUnit,

    /// [`Server::start`](crate::Server::start) has not been called yet.
    #[error("server not started")]
    NotStarted,

    /// [`Server::start`](crate::Server::start) was called while already running.
    #[error("server already running")]
    AlreadyRunning,
}

/// Specific kind of RTSP parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no request line).
    EmptyRequest,
    /// Request line did not have the expected `Method URI Version` format.
    InvalidRequestLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidHeader => write!(f, "invalid header"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
