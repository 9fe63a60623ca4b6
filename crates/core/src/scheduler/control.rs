use crate::scheduler::job::{CancelToken, Job};
use crate::streamer::{StreamAction, StreamerRegistry};

/// Starts or stops streaming for one session off the request path.
///
/// Submitted by the protocol handler for PLAY and TEARDOWN with a command
/// number from [`StreamerRegistry::issue_command`]. Workers may pick the
/// jobs up in any order; the streamer skips a command older than the last
/// one it applied, so the latest request always wins.
pub struct StreamControlJob {
    key: String,
    session_id: String,
    action: StreamAction,
    seq: u64,
    registry: StreamerRegistry,
}

impl StreamControlJob {
    pub fn new(session_id: &str, action: StreamAction, seq: u64, registry: StreamerRegistry) -> Self {
        Self {
            key: format!("{}:{}:{}", action, session_id, seq),
            session_id: session_id.to_string(),
            action,
            seq,
            registry,
        }
    }
}

impl Job for StreamControlJob {
    fn key(&self) -> &str {
        &self.key
    }

    fn run(&self, cancel: &CancelToken) {
        if cancel.is_cancelled() {
            return;
        }

        match self
            .registry
            .apply_command(&self.session_id, self.seq, self.action)
        {
            Ok(true) => {}
            Ok(false) => tracing::debug!(session_id = %self.session_id, action = %self.action, "stream control superseded"),
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, action = %self.action, error = %e, "stream control failed")
            }
        }
    }
}
