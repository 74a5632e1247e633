//! Byte-level transport for the client side of an RTSP session.
//!
//! With RTP over RTSP (RFC 2326 §10.12) everything travels on the one TCP
//! connection:
//!
//! - **Signaling**: RTSP responses, read line by line by [`reader`].
//!
//! - **Media**: RTP/RTCP packets wrapped in a 4-byte `$` frame header,
//!   read by [`interleaved`]. Keep-alive responses land in the middle of
//!   this data, so the framer resynchronizes on the next valid header.
//!
//! - **Connection**: [`tcp`] opens plain `rtsp://` sockets and lets another
//!   thread unblock a pending read on stop.

pub mod interleaved;
pub mod reader;
pub mod tcp;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Result, RtspError};

pub use interleaved::{InterleavedFramer, InterleavedHeader};
pub use reader::StreamReader;
pub use tcp::Interrupter;

/// Shared cancellation flag, checked at every blocking step boundary.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns [`RtspError::Interrupted`] once [`stop`](Self::stop) was called.
    pub fn check(&self) -> Result<()> {
        if self.is_stopped() {
            Err(RtspError::Interrupted)
        } else {
            Ok(())
        }
    }
}
