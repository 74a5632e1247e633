//! Events reported by a running session.
//!
//! A session reports progress through a single [`EventListener`]. Exactly one
//! terminal event ([`Event::Disconnected`], [`Event::Unauthorized`] or
//! [`Event::Failed`]) ends every session.

use crate::error::{Result, RtspError};
use crate::protocol::{AudioCodec, SdpInfo, VideoCodec};
use crate::queue::Frame;

/// Which track an access unit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

/// What a decoder needs to be configured for a negotiated track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackParameters {
    Video {
        codec: VideoCodec,
        /// `[VPS‖]SPS‖PPS` in Annex-B form, when the SDP carried them.
        parameter_sets: Option<Vec<u8>>,
        width: Option<u32>,
        height: Option<u32>,
    },
    Audio {
        codec: AudioCodec,
        sample_rate: u32,
        channels: u8,
        /// AudioSpecificConfig.
        config: Option<Vec<u8>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A connection attempt is starting.
    Connecting,
    /// PLAY succeeded; media follows.
    Connected(SdpInfo),
    /// One per track set up, sent before [`Event::Connected`].
    TrackReady(TrackParameters),
    /// A reassembled access unit. The same frame is also pushed to the
    /// track's queue.
    AccessUnit { kind: MediaKind, frame: Frame },
    /// The session ended cleanly (stop requested or stream ended).
    Disconnected,
    /// Credentials were missing or rejected.
    Unauthorized,
    Failed(String),
}

impl Event {
    /// Terminal event for a session that finished with `result`.
    ///
    /// Any error seen after a stop was requested counts as a clean
    /// disconnect.
    pub fn from_result(result: &Result<()>, stopped: bool) -> Self {
        match result {
            Ok(()) => Event::Disconnected,
            Err(RtspError::Unauthorized) => Event::Unauthorized,
            Err(RtspError::Interrupted) => Event::Disconnected,
            Err(_) if stopped => Event::Disconnected,
            Err(e) => Event::Failed(e.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::Disconnected | Event::Unauthorized | Event::Failed(_)
        )
    }
}

/// Receives session events on the session thread.
///
/// Implemented for any `FnMut(Event) + Send` closure, so a channel sender
/// can be wrapped as `move |e| { let _ = tx.send(e); }`.
pub trait EventListener: Send {
    fn on_event(&mut self, event: Event);
}

impl<F> EventListener for F
where
    F: FnMut(Event) + Send,
{
    fn on_event(&mut self, event: Event) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn terminal_mapping() {
        assert_eq!(Event::from_result(&Ok(()), false), Event::Disconnected);
        assert_eq!(
            Event::from_result(&Err(RtspError::Unauthorized), false),
            Event::Unauthorized
        );
        assert_eq!(
            Event::from_result(&Err(RtspError::Interrupted), false),
            Event::Disconnected
        );
        assert_eq!(
            Event::from_result(&Err(RtspError::NoMediaTrack), false),
            Event::Failed("no media track".into())
        );
    }

    #[test]
    fn io_error_after_stop_is_clean() {
        let err = || -> Result<()> {
            Err(io::Error::from(io::ErrorKind::ConnectionAborted).into())
        };
        assert_eq!(Event::from_result(&err(), true), Event::Disconnected);
        assert!(matches!(Event::from_result(&err(), false), Event::Failed(_)));
    }

    #[test]
    fn unauthorized_wins_over_stop() {
        assert_eq!(
            Event::from_result(&Err(RtspError::Unauthorized), true),
            Event::Unauthorized
        );
    }

    #[test]
    fn closure_listener() {
        let mut seen = Vec::new();
        {
            let mut listener = |e: Event| seen.push(e);
            listener.on_event(Event::Connecting);
            listener.on_event(Event::Disconnected);
        }
        assert_eq!(seen, vec![Event::Connecting, Event::Disconnected]);
        assert!(seen[1].is_terminal());
        assert!(!seen[0].is_terminal());
    }
}
