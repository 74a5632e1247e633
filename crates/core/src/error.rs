//! Error types for the RTSP client library.

use std::fmt;

/// Errors that can occur in the RTSP client library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Authentication**: [`Unauthorized`](Self::Unauthorized),
///   [`UnknownAuthChallenge`](Self::UnknownAuthChallenge).
/// - **Protocol**: [`Status`](Self::Status), [`Parse`](Self::Parse),
///   [`NoSession`](Self::NoSession), [`NoMediaTrack`](Self::NoMediaTrack).
/// - **Transport**: [`Io`](Self::Io), [`ResyncFailed`](Self::ResyncFailed),
///   [`InvalidUri`](Self::InvalidUri), [`UnsupportedScheme`](Self::UnsupportedScheme).
/// - **Cancellation**: [`Interrupted`](Self::Interrupted), a clean stop rather than a failure.
/// - **Client**: [`AlreadyRunning`](Self::AlreadyRunning).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server rejected the request again after credentials were sent.
    #[error("unauthorized")]
    Unauthorized,

    /// The server answered a request with an unexpected status code.
    #[error("{method} failed with status {code}")]
    Status { method: &'static str, code: u16 },

    /// Failed to parse an RTSP response message (RFC 2326 §7).
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// SETUP succeeded but no `Session` header came back (RFC 2326 §12.37).
    #[error("no session")]
    NoSession,

    /// None of the requested tracks could be set up.
    #[error("no media track")]
    NoMediaTrack,

    /// A 401 response carried neither a Digest nor a Basic challenge.
    #[error("unknown authentication type")]
    UnknownAuthChallenge,

    /// The stop flag was observed; the session ends cleanly.
    #[error("interrupted")]
    Interrupted,

    /// No interleaved frame header was found within the search window.
    #[error("no RTP frame header found after scanning {scanned} bytes")]
    ResyncFailed { scanned: usize },

    /// The target URI could not be split into host and port.
    #[error("invalid RTSP URI: {0}")]
    InvalidUri(String),

    /// The built-in connector only opens plain `rtsp://` sockets.
    #[error("unsupported URI scheme: {0}")]
    UnsupportedScheme(String),

    /// [`Client::start`](crate::Client::start) was called while a session is running.
    #[error("client already running")]
    AlreadyRunning,
}

/// Specific kind of RTSP parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Too many `RTSP/1.0` lines in a row without a numeric status code.
    InvalidStatusLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// No line terminator within the maximum line size.
    LineTooLong,
    /// `Content-Length` was present but not a number.
    InvalidContentLength,
    /// `Content-Length` exceeds the accepted body size.
    BodyTooLarge,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::LineTooLong => write!(f, "line too long"),
            Self::InvalidContentLength => write!(f, "invalid content length"),
            Self::BodyTooLarge => write!(f, "body too large"),
        }
    }
}

impl RtspError {
    pub(crate) fn parse(kind: ParseErrorKind) -> Self {
        RtspError::Parse { kind }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
