use std::sync::Arc;

use crate::error::{Result, RtspError};
use crate::protocol::request::{Method, RtspRequest};
use crate::protocol::response::RtspResponse;
use crate::protocol::sdp;
use crate::scheduler::{ScheduleManager, StreamControlJob};
use crate::session::{Session, TransportHeader};
use crate::streamer::{Destination, StreamAction, StreamerRegistry};
use crate::unit::{ProtocolState, RtspUnit, RtspUnitManager};

/// Methods advertised by OPTIONS.
pub const PUBLIC_METHODS: &str = "DESCRIBE, PAUSE, SETUP, PLAY, TEARDOWN";

/// Protocol state machine for the open [`RtspUnit`].
///
/// Consumes decoded requests and returns the response to write, or `None`
/// when the request is dropped without an answer. Dropped requests are:
///
/// - any request while no unit is open;
/// - SETUP with a missing or malformed `Transport` header, with ports that
///   are zero, negative or not numbers, or whose streamer cannot be
///   registered;
/// - SETUP while the unit is already playing.
///
/// Streaming start/stop for PLAY and TEARDOWN is queued on the control
/// schedule unit; the response never waits for it.
#[derive(Clone)]
pub struct MethodHandler {
    units: Arc<RtspUnitManager>,
    registry: StreamerRegistry,
    scheduler: Arc<ScheduleManager>,
    control_unit: String,
}

impl MethodHandler {
    pub fn new(
        units: Arc<RtspUnitManager>,
        registry: StreamerRegistry,
        scheduler: Arc<ScheduleManager>,
        control_unit: &str,
    ) -> Self {
        MethodHandler {
            units,
            registry,
            scheduler,
            control_unit: control_unit.to_string(),
        }
    }

    pub fn handle(&self, request: &RtspRequest) -> Option<RtspResponse> {
        let Some(unit) = self.units.current() else {
            tracing::warn!(method = %request.method, "no RTSP unit open, request dropped");
            return None;
        };

        match self.dispatch(&unit, request) {
            Ok(Some(response)) => {
                tracing::debug!(
                    method = %request.method,
                    status = response.status_code,
                    close = response.closes_connection(),
                    "> response"
                );
                Some(response)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(method = %request.method, error = %e, "request dropped");
                None
            }
        }
    }

    fn dispatch(&self, unit: &RtspUnit, request: &RtspRequest) -> Result<Option<RtspResponse>> {
        tracing::debug!(method = %request.method, uri = %request.uri, cseq = ?request.cseq(), "< request");

        let response = match &request.method {
            Method::Options => self.handle_options(request),
            Method::Describe => self.handle_describe(unit, request),
            Method::Setup => return self.handle_setup(unit, request),
            Method::Play => self.handle_play(unit, request),
            Method::Teardown => self.handle_teardown(unit, request),
            Method::Other(name) => {
                tracing::warn!(method = %name, "unknown RTSP method");
                self.respond(request, RtspResponse::not_found()).closing()
            }
        };
        Ok(Some(response))
    }

    fn handle_options(&self, request: &RtspRequest) -> RtspResponse {
        self.respond(
            request,
            RtspResponse::ok().add_header("Public", PUBLIC_METHODS),
        )
    }

    fn handle_describe(&self, unit: &RtspUnit, request: &RtspRequest) -> RtspResponse {
        let body = sdp::generate_sdp(&unit.listen_ip().to_string());
        self.respond(
            request,
            RtspResponse::ok()
                .add_header("Content-Type", sdp::CONTENT_TYPE)
                .with_body(body),
        )
    }

    fn handle_setup(&self, unit: &RtspUnit, request: &RtspRequest) -> Result<Option<RtspResponse>> {
        let header = request
            .transport()
            .ok_or_else(|| RtspError::InvalidTransport("missing Transport header".to_string()))?;

        if unit.state() == ProtocolState::Playing {
            tracing::warn!(transport = header, "SETUP while playing, request dropped");
            return Ok(None);
        }

        let (rtp_port, rtcp_port) = match TransportHeader::parse(header)? {
            TransportHeader::Interleaved => {
                unit.with_session(|s| s.interleaved = true);
                tracing::info!(
                    dest_port = unit.session().destination_port,
                    "interleaved streaming requested, closing control connection"
                );
                let response = self.respond(request, RtspResponse::not_found()).closing();
                return Ok(Some(response));
            }
            TransportHeader::ClientPort {
                rtp_port,
                rtcp_port,
            } => (rtp_port, rtcp_port),
        };

        // The client address is not negotiated; media goes to the listen IP.
        let destination_ip = unit.listen_ip();
        let session_id = Session::generate_id();

        // Nothing on the unit changes unless the streamer registers.
        self.registry.create_session(
            &session_id,
            Destination {
                ip: destination_ip,
                rtp_port,
                rtcp_port,
                uri: request.uri.clone(),
            },
        )?;

        let previous = unit.with_session(|s| {
            let previous = s.session_id.take();
            s.configure(&session_id, destination_ip, rtp_port, rtcp_port);
            previous
        });
        if let Some(previous) = previous
            && self.registry.destroy_session(&previous)
        {
            tracing::debug!(session_id = %previous, "previous session replaced");
        }
        unit.set_state(ProtocolState::Ready);

        tracing::info!(%session_id, rtp_port, ?rtcp_port, "session created via SETUP");

        let response = RtspResponse::ok()
            .add_header("Session", &session_id)
            .add_header(
                "Transport",
                &format!("RTP/AVP;unicast;client_port={}", rtp_port),
            );
        Ok(Some(self.respond(request, response)))
    }

    fn handle_play(&self, unit: &RtspUnit, request: &RtspRequest) -> RtspResponse {
        let response = self.respond(request, RtspResponse::ok());
        if let Some(session_id) = Self::streaming_session(unit) {
            self.queue_stream_control(&session_id, StreamAction::Start);
            unit.set_state(ProtocolState::Playing);
        } else {
            tracing::debug!("PLAY before SETUP, nothing to start");
        }
        response
    }

    fn handle_teardown(&self, unit: &RtspUnit, request: &RtspRequest) -> RtspResponse {
        let response = self.respond(request, RtspResponse::ok());
        if let Some(session_id) = Self::streaming_session(unit) {
            self.queue_stream_control(&session_id, StreamAction::Stop);
            unit.set_state(ProtocolState::Stopped);
        } else {
            tracing::debug!("TEARDOWN before SETUP, nothing to stop");
        }
        response
    }

    /// Session ID to drive streaming for, if a destination port is set.
    fn streaming_session(unit: &RtspUnit) -> Option<String> {
        let session = unit.session();
        if session.destination_port == 0 {
            return None;
        }
        session.session_id
    }

    fn queue_stream_control(&self, session_id: &str, action: StreamAction) {
        let Some(seq) = self.registry.issue_command(session_id) else {
            tracing::warn!(session_id, %action, "no streamer for session, stream control skipped");
            return;
        };
        let job = Arc::new(StreamControlJob::new(
            session_id,
            action,
            seq,
            self.registry.clone(),
        ));
        match self.scheduler.start_job(&self.control_unit, job) {
            Ok(()) => tracing::debug!(session_id, %action, "stream control queued"),
            Err(e) => tracing::warn!(session_id, %action, error = %e, "failed to queue stream control"),
        }
    }

    /// Echo CSeq and Session from the request and mark the connection keep-alive.
    fn respond(&self, request: &RtspRequest, mut response: RtspResponse) -> RtspResponse {
        if let Some(cseq) = request.cseq() {
            response = response.add_header("CSeq", cseq);
        }
        if let Some(session) = request.session()
            && !response.has_header("Session")
        {
            response = response.add_header("Session", session);
        }
        response.keep_alive()
    }
}
