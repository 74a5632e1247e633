use std::io::{self, Read};

use crate::error::{ParseErrorKind, Result, RtspError};
use crate::transport::StreamReader;

/// Literal prefix of every RTSP status line.
const STATUS_PREFIX: &[u8] = b"RTSP/1.0 ";

/// Largest response body accepted. SDP descriptions are a few KiB.
pub const MAX_BODY_SIZE: usize = 1 << 20;

/// Unparseable status lines skipped before giving up on a response.
const MAX_STATUS_LINE_ATTEMPTS: usize = 16;

/// An RTSP response as read off the wire (RFC 2326 §7).
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 2\r\n
/// Content-Type: application/sdp\r\n
/// Content-Length: 142\r\n
/// \r\n
/// v=0\r\n...
/// ```
///
/// The status line is located by scanning for `RTSP/1.0 `, so binary RTP
/// data in front of it is skipped. A body is read whenever `Content-Length`
/// is present.
#[derive(Debug, Clone)]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RtspResponse {
    /// Read one complete response from `reader`.
    pub fn read<S: Read>(reader: &mut StreamReader<S>) -> Result<Self> {
        let (status_code, status_text) = Self::read_status_line(reader)?;
        let headers = Self::read_headers(reader)?;

        let mut response = RtspResponse {
            status_code,
            status_text,
            headers,
            body: None,
        };

        if let Some(len) = response.content_length()? {
            if len > MAX_BODY_SIZE {
                tracing::warn!(len, max = MAX_BODY_SIZE, "response body too large");
                return Err(RtspError::parse(ParseErrorKind::BodyTooLarge));
            }
            response.body = Some(reader.read_text(len)?);
        }

        tracing::debug!(
            status = response.status_code,
            cseq = ?response.cseq(),
            body_len = ?response.body.as_ref().map(String::len),
            "response"
        );
        Ok(response)
    }

    fn read_status_line<S: Read>(reader: &mut StreamReader<S>) -> Result<(u16, String)> {
        for _ in 0..MAX_STATUS_LINE_ATTEMPTS {
            if !reader.read_until_found(STATUS_PREFIX)? {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            let Some(line) = reader.read_line()? else {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            };

            let (code, text) = line.split_once(' ').unwrap_or((line.as_str(), ""));
            match code.trim().parse::<u16>() {
                Ok(code) => return Ok((code, text.trim().to_string())),
                Err(_) => {
                    tracing::warn!(%line, "invalid status line, scanning for the next one");
                }
            }
        }
        Err(RtspError::parse(ParseErrorKind::InvalidStatusLine))
    }

    fn read_headers<S: Read>(reader: &mut StreamReader<S>) -> Result<Vec<(String, String)>> {
        let mut headers = Vec::new();

        while let Some(line) = reader.read_line()? {
            if line.is_empty() {
                break;
            }

            let (name, value) = line
                .split_once(':')
                .ok_or(RtspError::parse(ParseErrorKind::InvalidHeader))?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok(headers)
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// All values of a repeatable header, e.g. `WWW-Authenticate`.
    pub fn get_headers<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn cseq(&self) -> Option<&str> {
        self.get_header("CSeq")
    }

    /// Parsed `Content-Length` (RFC 2326 §12.14), if present.
    pub fn content_length(&self) -> Result<Option<usize>> {
        match self.get_header("Content-Length") {
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| RtspError::parse(ParseErrorKind::InvalidContentLength)),
            None => Ok(None),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}
