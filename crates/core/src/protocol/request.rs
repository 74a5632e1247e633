use std::fmt;

/// RTSP methods sent by the client (RFC 2326 §10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    Describe,
    Setup,
    Play,
    Teardown,
    GetParameter,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Describe => "DESCRIBE",
            Method::Setup => "SETUP",
            Method::Play => "PLAY",
            Method::Teardown => "TEARDOWN",
            Method::GetParameter => "GET_PARAMETER",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing RTSP request (RFC 2326 §6).
///
/// Serializes to the standard text format:
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// ```
///
/// Uses a builder pattern: chain [`add_header`](Self::add_header) and
/// [`add_optional_header`](Self::add_optional_header), then call
/// [`serialize`](Self::serialize). Headers are written in insertion order.
#[must_use]
#[derive(Debug, Clone)]
pub struct RtspRequest {
    pub method: Method,
    /// Request-URI (e.g. `rtsp://host:port/stream/trackID=1`).
    pub uri: String,
    pub headers: Vec<(String, String)>,
}

impl RtspRequest {
    pub fn new(method: Method, uri: &str) -> Self {
        RtspRequest {
            method,
            uri: uri.to_string(),
            headers: Vec::new(),
        }
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Add the header only when `value` is present.
    pub fn add_optional_header(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.add_header(name, value),
            None => self,
        }
    }

    /// Serialize to the RTSP text wire format.
    pub fn serialize(&self) -> String {
        let mut request = format!("{} {} RTSP/1.0\r\n", self.method, self.uri);

        for (name, value) in &self.headers {
            request.push_str(&format!("{}: {}\r\n", name, value));
        }

        request.push_str("\r\n");
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_describe() {
        let req = RtspRequest::new(Method::Describe, "rtsp://10.0.0.2/live")
            .add_header("Accept", "application/sdp")
            .add_optional_header("Authorization", None)
            .add_header("CSeq", "2")
            .add_optional_header("User-Agent", Some("Lavf58.29.100"));
        assert_eq!(
            req.serialize(),
            "DESCRIBE rtsp://10.0.0.2/live RTSP/1.0\r\n\
             Accept: application/sdp\r\n\
             CSeq: 2\r\n\
             User-Agent: Lavf58.29.100\r\n\
             \r\n"
        );
    }

    #[test]
    fn method_names() {
        assert_eq!(Method::GetParameter.to_string(), "GET_PARAMETER");
        assert_eq!(Method::Teardown.as_str(), "TEARDOWN");
    }
}
