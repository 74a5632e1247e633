/// Interleaved channel pair for one track (RFC 2326 §12.39, §10.12).
///
/// Sent in the SETUP `Transport` header and read back from the server's
/// answer, which may pick different channels than requested.
///
/// ## Wire format example
///
/// ```text
/// Client → Server:
///   Transport: RTP/AVP/TCP;unicast;interleaved=0-1
///
/// Server → Client:
///   Transport: RTP/AVP/TCP;unicast;interleaved=0-1;ssrc=4A3B2C1D
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportHeader {
    /// Channel carrying RTP.
    pub rtp_channel: u8,
    /// Channel carrying RTCP (typically `rtp_channel + 1`).
    pub rtcp_channel: u8,
}

impl TransportHeader {
    /// Channels requested for the video track.
    pub const VIDEO: Self = Self::interleaved(0, 1);
    /// Channels requested for the audio track.
    pub const AUDIO: Self = Self::interleaved(2, 3);

    pub const fn interleaved(rtp_channel: u8, rtcp_channel: u8) -> Self {
        Self {
            rtp_channel,
            rtcp_channel,
        }
    }

    /// `Transport` header value for the SETUP request.
    pub fn request_value(&self) -> String {
        format!(
            "RTP/AVP/TCP;unicast;interleaved={}-{}",
            self.rtp_channel, self.rtcp_channel
        )
    }

    /// Parse the `Transport` header value (RFC 2326 §12.39).
    ///
    /// Looks for `interleaved=RTP-RTCP` among semicolon-separated parameters.
    /// A single channel implies RTCP on the next one.
    ///
    /// ## Examples
    ///
    /// ```
    /// use rtsp::session::transport::TransportHeader;
    ///
    /// let th = TransportHeader::parse("RTP/AVP/TCP;unicast;interleaved=2-3").unwrap();
    /// assert_eq!(th.rtp_channel, 2);
    /// assert_eq!(th.rtcp_channel, 3);
    ///
    /// assert!(TransportHeader::parse("RTP/AVP;unicast;client_port=8000-8001").is_none());
    /// ```
    pub fn parse(header: &str) -> Option<Self> {
        for part in header.split(';') {
            let part = part.trim();
            if let Some(channels) = part.strip_prefix("interleaved=") {
                let (rtp, rtcp) = match channels.split_once('-') {
                    Some((rtp, rtcp)) => {
                        let rtp: u8 = rtp.trim().parse().ok()?;
                        (rtp, rtcp.trim().parse().ok()?)
                    }
                    None => {
                        let rtp: u8 = channels.trim().parse().ok()?;
                        (rtp, rtp.checked_add(1)?)
                    }
                };
                return Some(Self::interleaved(rtp, rtcp));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_values() {
        assert_eq!(
            TransportHeader::VIDEO.request_value(),
            "RTP/AVP/TCP;unicast;interleaved=0-1"
        );
        assert_eq!(
            TransportHeader::AUDIO.request_value(),
            "RTP/AVP/TCP;unicast;interleaved=2-3"
        );
    }

    #[test]
    fn parse_server_answer() {
        let th =
            TransportHeader::parse("RTP/AVP/TCP;unicast;interleaved=4-5;ssrc=4A3B2C1D;mode=play")
                .unwrap();
        assert_eq!(th, TransportHeader::interleaved(4, 5));
    }

    #[test]
    fn parse_single_channel() {
        assert_eq!(
            TransportHeader::parse("RTP/AVP/TCP;interleaved=6"),
            Some(TransportHeader::interleaved(6, 7))
        );
        assert!(TransportHeader::parse("RTP/AVP/TCP;interleaved=255").is_none());
    }

    #[test]
    fn parse_no_interleaved() {
        assert!(TransportHeader::parse("RTP/AVP;unicast").is_none());
        assert!(TransportHeader::parse("RTP/AVP/TCP;interleaved=a-b").is_none());
    }
}
