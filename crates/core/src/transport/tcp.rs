use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use parking_lot::Mutex;

use super::StopFlag;
use crate::error::{Result, RtspError};

/// Default RTSP port (RFC 2326 §3.2).
pub const DEFAULT_RTSP_PORT: u16 = 554;

/// Split an `rtsp://[user[:pass]@]host[:port][/path]` URI into host and port.
///
/// IPv6 literals must be bracketed (`rtsp://[::1]:8554/live`).
///
/// ```
/// use rtsp::transport::tcp::host_and_port;
///
/// assert_eq!(
///     host_and_port("rtsp://admin:pw@10.0.0.2:8554/live").unwrap(),
///     ("10.0.0.2".to_string(), 8554)
/// );
/// assert_eq!(host_and_port("rtsp://camera/stream").unwrap(), ("camera".to_string(), 554));
/// assert!(host_and_port("rtsps://camera/stream").is_err());
/// ```
pub fn host_and_port(uri: &str) -> Result<(String, u16)> {
    let (scheme, rest) = uri
        .split_once("://")
        .ok_or_else(|| RtspError::InvalidUri(uri.to_string()))?;

    if !scheme.eq_ignore_ascii_case("rtsp") {
        return Err(RtspError::UnsupportedScheme(scheme.to_string()));
    }

    let authority = rest.split(['/', '?']).next().unwrap_or_default();
    let host_port = match authority.rsplit_once('@') {
        Some((_, host_port)) => host_port,
        None => authority,
    };

    let (host, port) = if let Some(bracketed) = host_port.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| RtspError::InvalidUri(uri.to_string()))?;
        (host, after.strip_prefix(':'))
    } else {
        match host_port.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (host_port, None),
        }
    };

    if host.is_empty() {
        return Err(RtspError::InvalidUri(uri.to_string()));
    }

    let port = match port {
        Some(p) => p
            .parse()
            .map_err(|_| RtspError::InvalidUri(uri.to_string()))?,
        None => DEFAULT_RTSP_PORT,
    };

    Ok((host.to_string(), port))
}

/// Open the TCP connection for `uri`, trying each resolved address in turn.
pub fn connect(uri: &str, timeout: Duration) -> Result<TcpStream> {
    let (host, port) = host_and_port(uri)?;
    let mut last_err = None;

    for addr in (host.as_str(), port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                tracing::debug!(%addr, "connected");
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "connect attempt failed");
                last_err = Some(e);
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved"))
        .into())
}

/// Stops a session from another thread.
///
/// Sets the shared [`StopFlag`] and shuts the registered socket down, which
/// wakes a read blocked inside the session thread. Where shutdown does not
/// unblock a pending read, the read returns once the socket read timeout
/// expires and the flag is seen.
#[derive(Debug, Default)]
pub struct Interrupter {
    stop: StopFlag,
    socket: Mutex<Option<TcpStream>>,
}

impl Interrupter {
    pub fn new(stop: StopFlag) -> Self {
        Self {
            stop,
            socket: Mutex::new(None),
        }
    }

    pub fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    /// Keep a handle on `stream` so [`interrupt`](Self::interrupt) can close it.
    ///
    /// If a stop was already requested the stream is shut down immediately.
    pub fn register(&self, stream: &TcpStream) -> Result<()> {
        let handle = stream.try_clone()?;
        if self.stop.is_stopped() {
            let _ = handle.shutdown(Shutdown::Both);
        }
        *self.socket.lock() = Some(handle);
        Ok(())
    }

    /// Drop the socket handle once the session no longer uses it.
    pub fn clear(&self) {
        self.socket.lock().take();
    }

    pub fn interrupt(&self) {
        self.stop.stop();
        if let Some(socket) = self.socket.lock().as_ref()
            && let Err(e) = socket.shutdown(Shutdown::Both)
        {
            tracing::debug!(error = %e, "socket shutdown on stop failed");
        }
    }
}
