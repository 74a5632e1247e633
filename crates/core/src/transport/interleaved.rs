//! Interleaved RTP/RTCP framing over the RTSP connection (RFC 2326 §10.12).
//!
//! ```text
//! +--------+---------+-------------------+
//! | '$'    | channel | length (u16, BE)  |  followed by `length` bytes
//! | 0x24   | 1 byte  | 2 bytes           |  of RTP or RTCP
//! +--------+---------+-------------------+
//! ```
//!
//! Keep-alive responses are written into the same stream in between RTP
//! frames. When the next four bytes are not a plausible frame header the
//! framer slides a 4-byte window forward one byte at a time until they are,
//! giving up after [`RESYNC_WINDOW`] bytes.

use std::io::Read;

use super::StreamReader;
use crate::error::{Result, RtspError};
use crate::media::rtp::RTP_HEADER_LEN;

/// Frame marker byte (`$`).
pub const INTERLEAVED_MARKER: u8 = 0x24;

/// Maximum bytes discarded while looking for the next frame header.
pub const RESYNC_WINDOW: usize = 100_000;

/// Smallest RTCP packet (an empty receiver report header).
const RTCP_MIN_LEN: usize = 4;

/// A parsed interleaved frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterleavedHeader {
    pub channel: u8,
    /// Length of the RTP/RTCP packet that follows.
    pub length: u16,
}

impl InterleavedHeader {
    /// Parse four header bytes; `None` if the marker byte is wrong.
    pub fn parse(bytes: &[u8; 4]) -> Option<Self> {
        if bytes[0] != INTERLEAVED_MARKER {
            return None;
        }
        Some(Self {
            channel: bytes[1],
            length: u16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }
}

/// Reads interleaved frame headers for the channels negotiated at SETUP.
#[derive(Debug, Clone, Default)]
pub struct InterleavedFramer {
    rtp_channels: Vec<u8>,
    rtcp_channels: Vec<u8>,
}

impl InterleavedFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a negotiated `interleaved=<rtp>-<rtcp>` pair.
    pub fn add_pair(&mut self, rtp: u8, rtcp: u8) {
        self.rtp_channels.push(rtp);
        self.rtcp_channels.push(rtcp);
    }

    pub fn is_rtcp(&self, channel: u8) -> bool {
        self.rtcp_channels.contains(&channel)
    }

    /// A header is plausible when it names a negotiated channel and is long
    /// enough to hold the packet type carried on that channel.
    pub fn is_plausible(&self, header: &InterleavedHeader) -> bool {
        let len = header.length as usize;
        if self.rtp_channels.contains(&header.channel) {
            len >= RTP_HEADER_LEN
        } else if self.rtcp_channels.contains(&header.channel) {
            len >= RTCP_MIN_LEN
        } else {
            false
        }
    }

    /// Read the next frame header, resynchronizing if needed.
    ///
    /// Returns the header and the number of bytes discarded to find it.
    pub fn read_header<S: Read>(
        &self,
        reader: &mut StreamReader<S>,
    ) -> Result<(InterleavedHeader, usize)> {
        let mut window = [0u8; 4];
        reader.read_exact(&mut window)?;

        let mut skipped = 0usize;
        loop {
            if let Some(header) = InterleavedHeader::parse(&window)
                && self.is_plausible(&header)
            {
                if skipped > 0 {
                    tracing::warn!(skipped, channel = header.channel, "resynchronized RTP stream");
                }
                return Ok((header, skipped));
            }

            if skipped >= RESYNC_WINDOW {
                tracing::error!(scanned = skipped, "no interleaved frame header found");
                return Err(RtspError::ResyncFailed { scanned: skipped });
            }

            window.copy_within(1.., 0);
            let mut next = [0u8; 1];
            reader.read_exact(&mut next)?;
            window[3] = next[0];
            skipped += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::StopFlag;
    use std::io::Cursor;

    fn framer() -> InterleavedFramer {
        let mut f = InterleavedFramer::new();
        f.add_pair(0, 1);
        f.add_pair(2, 3);
        f
    }

    fn reader(data: Vec<u8>) -> StreamReader<Cursor<Vec<u8>>> {
        StreamReader::new(Cursor::new(data), StopFlag::new())
    }

    #[test]
    fn aligned_header() {
        let mut r = reader(vec![0x24, 0x00, 0x00, 0x14]);
        let (h, skipped) = framer().read_header(&mut r).unwrap();
        assert_eq!(h, InterleavedHeader { channel: 0, length: 20 });
        assert_eq!(skipped, 0);
    }

    #[test]
    fn resync_over_keepalive_response() {
        let mut data = b"RTSP/1.0 200 OK\r\nCSeq: 7\r\n\r\n".to_vec();
        let garbage = data.len();
        data.extend_from_slice(&[0x24, 0x02, 0x00, 0x20]);

        let mut r = reader(data);
        let (h, skipped) = framer().read_header(&mut r).unwrap();
        assert_eq!(h.channel, 2);
        assert_eq!(h.length, 32);
        assert_eq!(skipped, garbage);
    }

    #[test]
    fn unknown_channel_and_short_length_are_skipped() {
        let data = vec![
            0x24, 0x07, 0x00, 0x20, // channel 7 was never negotiated
            0x24, 0x00, 0x00, 0x04, // too short for RTP
            0x24, 0x01, 0x00, 0x1c, // RTCP on channel 1
        ];
        let mut r = reader(data);
        let (h, skipped) = framer().read_header(&mut r).unwrap();
        assert_eq!(h, InterleavedHeader { channel: 1, length: 28 });
        assert_eq!(skipped, 8);
        assert!(framer().is_rtcp(h.channel));
    }

    #[test]
    fn gives_up_after_window() {
        let mut r = reader(vec![0xAB; RESYNC_WINDOW + 16]);
        match framer().read_header(&mut r) {
            Err(RtspError::ResyncFailed { scanned }) => assert_eq!(scanned, RESYNC_WINDOW),
            other => panic!("expected ResyncFailed, got {other:?}"),
        }
    }

    #[test]
    fn eof_while_scanning_is_io_error() {
        let mut r = reader(vec![0x00, 0x01, 0x02, 0x03, 0x04]);
        assert!(matches!(framer().read_header(&mut r), Err(RtspError::Io(_))));
    }
}
