/// Size of the RTP fixed header in bytes.
pub const RTP_HEADER_LEN: usize = 12;

/// Parsed RTP fixed header (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |            contributing source (CSRC) identifiers             |
/// |                             ....                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// One value per received packet. `payload_size` is everything after the
/// 12-byte fixed header, so it still includes CSRCs, a header extension and
/// padding when the corresponding bits are set; [`payload`](Self::payload)
/// strips those.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    /// RTP payload type (7-bit, RFC 3551).
    pub payload_type: u8,
    pub sequence: u16,
    /// Media clock timestamp. Wraps at 2^32.
    pub timestamp: u32,
    pub ssrc: u32,
    /// Bytes following the fixed header in the framed packet.
    pub payload_size: usize,
}

impl RtpHeader {
    /// Parse the fixed header of a packet that is `packet_len` bytes long in
    /// total (as announced by the interleaved frame header).
    ///
    /// Returns `None` when `packet_len` cannot even hold the fixed header.
    /// The version is not checked here; see [`is_valid`](Self::is_valid).
    pub fn parse(header: &[u8; RTP_HEADER_LEN], packet_len: usize) -> Option<Self> {
        if packet_len < RTP_HEADER_LEN {
            return None;
        }

        Some(Self {
            version: header[0] >> 6,
            padding: header[0] & 0x20 != 0,
            extension: header[0] & 0x10 != 0,
            csrc_count: header[0] & 0x0f,
            marker: header[1] & 0x80 != 0,
            payload_type: header[1] & 0x7f,
            sequence: u16::from_be_bytes([header[2], header[3]]),
            timestamp: u32::from_be_bytes([header[4], header[5], header[6], header[7]]),
            ssrc: u32::from_be_bytes([header[8], header[9], header[10], header[11]]),
            payload_size: packet_len - RTP_HEADER_LEN,
        })
    }

    /// Only RTP version 2 is defined.
    pub fn is_valid(&self) -> bool {
        self.version == 2
    }

    /// Slice the codec payload out of the bytes that followed the fixed header.
    ///
    /// Skips CSRC identifiers and a header extension (RFC 3550 §5.3.1) and
    /// drops trailing padding. Returns `None` if the announced lengths do not
    /// fit inside `body`.
    pub fn payload<'a>(&self, body: &'a [u8]) -> Option<&'a [u8]> {
        let mut start = self.csrc_count as usize * 4;

        if self.extension {
            let ext = body.get(start..start + 4)?;
            let words = u16::from_be_bytes([ext[2], ext[3]]) as usize;
            start += 4 + words * 4;
        }

        let mut end = body.len();
        if self.padding {
            let pad = *body.last()? as usize;
            end = end.checked_sub(pad)?;
        }

        if start > end {
            return None;
        }
        Some(&body[start..end])
    }
}
