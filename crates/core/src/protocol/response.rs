/// An RTSP response (RFC 2326 §7).
///
/// Serializes to the standard text format:
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// Server: rtsp-streamer/0.1\r\n
/// CSeq: 2\r\n
/// Content-Type: application/sdp\r\n
/// Content-Length: 71\r\n
/// Connection: keep-alive\r\n
/// \r\n
/// c=IN IP4 ...
/// ```
///
/// Built with chained [`add_header`](Self::add_header) /
/// [`with_body`](Self::with_body) calls. The `Connection` header decides
/// whether the transport keeps the control connection open after writing
/// the response (see [`closes_connection`](Self::closes_connection)).
#[must_use]
#[derive(Debug, Clone)]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Server identification string included in every response (RFC 2326 §12.36).
pub const SERVER_AGENT: &str = "rtsp-streamer/0.1";

impl RtspResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        RtspResponse {
            status_code,
            status_text: status_text.to_string(),
            headers: vec![("Server".to_string(), SERVER_AGENT.to_string())],
            body: None,
        }
    }

    /// 200 OK (RFC 2326 §7.1.1).
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    /// 404 Not Found.
    pub fn not_found() -> Self {
        Self::new(404, "Not Found")
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Replace every header called `name` with a single value.
    pub fn set_header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        self.add_header(name, value)
    }

    /// Attach a body and set `Content-Length` to its byte length.
    pub fn with_body(self, body: String) -> Self {
        let mut response = self.set_header("Content-Length", &body.len().to_string());
        response.body = Some(body);
        response
    }

    /// Mark the control connection to stay open after this response.
    pub fn keep_alive(self) -> Self {
        self.set_header("Connection", "keep-alive")
    }

    /// Mark the control connection to be closed once this response is flushed.
    pub fn closing(self) -> Self {
        self.set_header("Connection", "close")
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.get_header(name).is_some()
    }

    pub fn closes_connection(&self) -> bool {
        self.get_header("Connection")
            .is_some_and(|value| value.eq_ignore_ascii_case("close"))
    }

    /// Serialize to the RTSP text wire format.
    pub fn serialize(&self) -> String {
        let mut response = format!("RTSP/1.0 {} {}\r\n", self.status_code, self.status_text);

        for (name, value) in &self.headers {
            response.push_str(&format!("{}: {}\r\n", name, value));
        }
        response.push_str("\r\n");

        if let Some(body) = &self.body {
            response.push_str(body);
        }
        response
    }
}
