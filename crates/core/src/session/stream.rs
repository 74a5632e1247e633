//! The streaming loop that runs once PLAY has been accepted.

use std::io::{Read, Write};
use std::time::Instant;

use super::{MediaDispatcher, RtspSession};
use crate::error::Result;
use crate::event::EventListener;
use crate::media::rtp::{RTP_HEADER_LEN, RtpHeader};
use crate::protocol::{Capabilities, Method};

impl<S: Read + Write> RtspSession<S> {
    /// Read interleaved RTP until the stream fails or a stop is requested.
    ///
    /// Only returns with an error; [`RtspError::Interrupted`](crate::RtspError::Interrupted)
    /// signals a requested stop.
    pub(super) fn stream(
        &mut self,
        dispatcher: &mut MediaDispatcher,
        listener: &mut dyn EventListener,
    ) -> Result<()> {
        let keep_alive_interval = self.session_timeout / 2;
        let mut last_keep_alive = Instant::now();
        let mut header = [0u8; RTP_HEADER_LEN];
        let mut body = Vec::new();

        loop {
            self.ctx.stop.check()?;

            let (frame, skipped) = self.framer.read_header(&mut self.reader)?;
            if skipped > 0 {
                self.ctx.stats.record_resync();
            }
            let len = frame.length as usize;

            if self.framer.is_rtcp(frame.channel) {
                tracing::trace!(channel = frame.channel, len, "skipping RTCP");
                self.reader.skip(len)?;
                continue;
            }

            self.reader.read_exact(&mut header)?;
            let Some(rtp) = RtpHeader::parse(&header, len) else {
                continue;
            };
            if !rtp.is_valid() {
                // Body layout is unknown; the next header read resyncs past it.
                tracing::warn!(version = rtp.version, "invalid RTP version, skipping packet");
                self.ctx.stats.record_dropped_payload();
                continue;
            }

            body.resize(rtp.payload_size, 0);
            self.reader.read_exact(&mut body)?;
            tracing::trace!(
                pt = rtp.payload_type,
                seq = rtp.sequence,
                ts = rtp.timestamp,
                len = rtp.payload_size,
                "RTP packet"
            );

            if last_keep_alive.elapsed() >= keep_alive_interval {
                last_keep_alive = Instant::now();
                self.send_keep_alive()?;
            }

            match rtp.payload(&body) {
                Some(payload) if !payload.is_empty() => dispatcher.dispatch(&rtp, payload, listener),
                _ => {
                    tracing::warn!(seq = rtp.sequence, "malformed RTP payload, dropping");
                    self.ctx.stats.record_dropped_payload();
                }
            }
        }
    }

    /// Keep the session alive without waiting for the answer; the response
    /// is skipped by the resync scan of a later frame header read.
    fn send_keep_alive(&mut self) -> Result<()> {
        let method = if self.capabilities.contains(Capabilities::GET_PARAMETER) {
            Method::GetParameter
        } else {
            Method::Options
        };
        let uri = self.base_uri.clone();
        tracing::debug!(method = %method, uri, "sending keep-alive");
        self.send_request(method, &uri, None)
    }
}
