//! SDP (Session Description Protocol) parsing (RFC 4566 / RFC 8866).
//!
//! Reads the DESCRIBE response body into at most one video and one audio
//! track. Only the attributes a player needs are interpreted:
//!
//! ```text
//! s=<session-name>                              ← session name
//! i=<session-description>                       ← session information
//! m=video 0 RTP/AVP 96                          ← media type, payload type
//! a=control:trackID=1                           ← track URL for SETUP
//! a=rtpmap:96 H264/90000                        ← codec/clock rate
//! a=fmtp:96 sprop-parameter-sets=Z0IA...,aM4... ← codec parameters
//! a=framesize:96 1280-720                       ← picture size
//! m=audio 0 RTP/AVP 97
//! a=rtpmap:97 MPEG4-GENERIC/16000/2             ← codec/sample rate/channels
//! a=fmtp:97 mode=AAC-hbr;config=1410;...        ← AU header mode, AudioSpecificConfig
//! ```
//!
//! Parsing never fails: unknown lines are skipped and missing values stay
//! `None`.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::media::annex_b;

/// Cameras are inconsistent about padding in `sprop-*` values.
const SPROP_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Default RTP clock for video (RFC 6184 §8.1, RFC 7798 §7.1).
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    H265,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioCodec {
    /// `mpeg4-generic` (RFC 3640).
    Aac,
    Unknown(String),
}

/// The `m=video` section of a session description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTrack {
    /// `a=control` value: relative path or absolute URL.
    pub control: Option<String>,
    pub payload_type: Option<u8>,
    pub codec: VideoCodec,
    pub clock_rate: u32,
    /// Parameter sets in Annex-B form (start code included).
    pub vps: Option<Vec<u8>>,
    pub sps: Option<Vec<u8>>,
    pub pps: Option<Vec<u8>>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl VideoTrack {
    fn new(payload_type: Option<u8>) -> Self {
        Self {
            control: None,
            payload_type,
            codec: VideoCodec::Unknown(String::new()),
            clock_rate: VIDEO_CLOCK_RATE,
            vps: None,
            sps: None,
            pps: None,
            width: None,
            height: None,
        }
    }

    /// `[VPS‖]SPS‖PPS` as one unit, when SPS and PPS are both known.
    pub fn parameter_sets(&self) -> Option<Vec<u8>> {
        let (sps, pps) = (self.sps.as_ref()?, self.pps.as_ref()?);
        let mut unit = Vec::new();
        if self.codec == VideoCodec::H265
            && let Some(vps) = &self.vps
        {
            unit.extend_from_slice(vps);
        }
        unit.extend_from_slice(sps);
        unit.extend_from_slice(pps);
        Some(unit)
    }

    fn apply_fmtp(&mut self, params: &[(String, String)]) {
        for (key, value) in params {
            match key.to_ascii_lowercase().as_str() {
                "sprop-parameter-sets" => {
                    let mut sets = value.split(',');
                    if let (Some(sps), Some(pps)) = (sets.next(), sets.next()) {
                        self.sps = decode_parameter_set(sps);
                        self.pps = decode_parameter_set(pps);
                    }
                }
                "sprop-vps" => self.vps = decode_parameter_set(value),
                "sprop-sps" => self.sps = decode_parameter_set(value),
                "sprop-pps" => self.pps = decode_parameter_set(value),
                _ => {}
            }
        }
    }
}

/// The `m=audio` section of a session description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    pub control: Option<String>,
    pub payload_type: Option<u8>,
    pub codec: AudioCodec,
    /// Sample rate in Hz, which is also the RTP clock rate.
    pub sample_rate: u32,
    pub channels: u8,
    /// AU header mode (`AAC-hbr` / `AAC-lbr`).
    pub mode: Option<String>,
    /// AudioSpecificConfig bytes from the hex `config` parameter.
    pub config: Option<Vec<u8>>,
}

impl AudioTrack {
    fn new(payload_type: Option<u8>) -> Self {
        Self {
            control: None,
            payload_type,
            codec: AudioCodec::Unknown(String::new()),
            sample_rate: 0,
            channels: 1,
            mode: None,
            config: None,
        }
    }

    fn apply_fmtp(&mut self, params: &[(String, String)]) {
        for (key, value) in params {
            match key.to_ascii_lowercase().as_str() {
                "mode" => self.mode = Some(value.clone()),
                "config" => self.config = decode_hex(value),
                _ => {}
            }
        }
    }
}

/// Result of parsing a DESCRIBE body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdpInfo {
    pub session_name: Option<String>,
    pub session_description: Option<String>,
    pub video: Option<VideoTrack>,
    pub audio: Option<AudioTrack>,
}

enum Section {
    Session,
    Video,
    Audio,
    /// Another media type, or a second video/audio section.
    Ignored,
}

impl SdpInfo {
    pub fn parse(text: &str) -> Self {
        let mut info = SdpInfo::default();
        let mut section = Section::Session;

        for line in text.lines() {
            let Some((kind, value)) = line.split_once('=') else {
                continue;
            };

            match (kind.trim(), &section) {
                ("m", _) => section = info.start_media(value),
                ("s", Section::Session) => info.session_name = Some(value.to_string()),
                ("i", Section::Session) => info.session_description = Some(value.to_string()),
                ("a", Section::Video) => {
                    if let Some(video) = info.video.as_mut() {
                        apply_video_attribute(video, value);
                    }
                }
                ("a", Section::Audio) => {
                    if let Some(audio) = info.audio.as_mut() {
                        apply_audio_attribute(audio, value);
                    }
                }
                _ => {}
            }
        }

        tracing::debug!(
            video = ?info.video.as_ref().map(|v| &v.codec),
            audio = ?info.audio.as_ref().map(|a| &a.codec),
            "SDP parsed"
        );
        info
    }

    fn start_media(&mut self, value: &str) -> Section {
        let fields: Vec<&str> = value.split_whitespace().collect();
        let payload_type = fields.get(3).and_then(|pt| pt.parse::<u8>().ok());
        if payload_type.is_none() {
            tracing::warn!(media = value, "failed to get payload type from m= line");
        }

        match fields.first().copied() {
            Some("video") if self.video.is_none() => {
                self.video = Some(VideoTrack::new(payload_type));
                Section::Video
            }
            Some("audio") if self.audio.is_none() => {
                self.audio = Some(AudioTrack::new(payload_type));
                Section::Audio
            }
            _ => Section::Ignored,
        }
    }
}

/// Split `<fmt> <value>` attribute bodies such as `rtpmap:96 H264/90000`.
fn after_format(value: &str) -> &str {
    value.split_once(' ').map(|(_, rest)| rest.trim()).unwrap_or("")
}

/// `a=fmtp:<fmt> key=value;key=value`.
fn fmtp_params(value: &str) -> Vec<(String, String)> {
    after_format(value)
        .split(';')
        .filter_map(|p| {
            let (k, v) = p.trim().split_once('=')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

fn apply_video_attribute(video: &mut VideoTrack, attr: &str) {
    if let Some(control) = attr.strip_prefix("control:") {
        video.control = Some(control.trim().to_string());
    } else if attr.starts_with("rtpmap:") {
        let mut parts = after_format(attr).split('/');
        let name = parts.next().unwrap_or_default();
        video.codec = match name.to_ascii_lowercase().as_str() {
            "h264" => VideoCodec::H264,
            "h265" => VideoCodec::H265,
            _ => {
                tracing::warn!(codec = name, "unknown video codec");
                VideoCodec::Unknown(name.to_string())
            }
        };
        if let Some(rate) = parts.next().and_then(|r| r.trim().parse().ok()) {
            video.clock_rate = rate;
        }
        tracing::info!(codec = ?video.codec, "video");
    } else if attr.starts_with("fmtp:") {
        video.apply_fmtp(&fmtp_params(attr));
    } else if attr.starts_with("framesize:") {
        if let Some((w, h)) = after_format(attr).split_once('-') {
            video.width = w.trim().parse().ok();
            video.height = h.trim().parse().ok();
        }
    }
}

fn apply_audio_attribute(audio: &mut AudioTrack, attr: &str) {
    if let Some(control) = attr.strip_prefix("control:") {
        audio.control = Some(control.trim().to_string());
    } else if attr.starts_with("rtpmap:") {
        let parts: Vec<&str> = after_format(attr).split('/').collect();
        if parts.len() < 2 {
            return;
        }
        audio.codec = if parts[0].eq_ignore_ascii_case("mpeg4-generic") {
            AudioCodec::Aac
        } else {
            tracing::warn!(codec = parts[0], "unknown audio codec");
            AudioCodec::Unknown(parts[0].to_string())
        };
        audio.sample_rate = parts[1].trim().parse().unwrap_or(0);
        // "a=rtpmap:97 MPEG4-GENERIC/8000" means mono.
        audio.channels = parts.get(2).and_then(|c| c.trim().parse().ok()).unwrap_or(1);
        tracing::info!(
            codec = ?audio.codec,
            sample_rate = audio.sample_rate,
            channels = audio.channels,
            "audio"
        );
    } else if attr.starts_with("fmtp:") {
        audio.apply_fmtp(&fmtp_params(attr));
    }
}

fn decode_parameter_set(b64: &str) -> Option<Vec<u8>> {
    match SPROP_BASE64.decode(b64.trim()) {
        Ok(nal) if !nal.is_empty() => Some(annex_b(&nal)),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(value = b64, error = %e, "invalid base64 parameter set");
            None
        }
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.is_empty() || hex.len() % 2 != 0 {
        tracing::warn!(value = hex, "invalid hex config");
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn h264_video_track() {
        let sdp = "m=video 0 RTP/AVP 96\r\n\
                   a=control:trackID=1\r\n\
                   a=rtpmap:96 H264/90000\r\n\
                   a=fmtp:96 sprop-parameter-sets=Z0IAHpWoFAFuQA==,aM48gA==\r\n";
        let info = SdpInfo::parse(sdp);
        let video = info.video.expect("video track");
        assert_eq!(video.payload_type, Some(96));
        assert_eq!(video.codec, VideoCodec::H264);
        assert_eq!(video.control.as_deref(), Some("trackID=1"));
        assert_eq!(video.clock_rate, 90_000);

        let sps = video.sps.as_ref().expect("sps");
        let pps = video.pps.as_ref().expect("pps");
        assert_eq!(
            sps.as_slice(),
            &[0u8, 0, 0, 1, 0x67, 0x42, 0x00, 0x1e, 0x95, 0xa8, 0x14, 0x01, 0x6e, 0x40]
        );
        assert_eq!(pps.as_slice(), &[0u8, 0, 0, 1, 0x68, 0xce, 0x3c, 0x80]);
        assert_eq!(video.parameter_sets().unwrap(), [&sps[..], &pps[..]].concat());
        assert!(info.audio.is_none());
    }

    #[test]
    fn full_camera_description() {
        let sdp = "v=0\r\n\
                   o=- 1 1 IN IP4 192.168.1.10\r\n\
                   s=Media Presentation\r\n\
                   i=Front door\r\n\
                   t=0 0\r\n\
                   a=control:*\r\n\
                   m=video 0 RTP/AVP 96\r\n\
                   a=rtpmap:96 H265/90000\r\n\
                   a=fmtp:96 sprop-vps=QAEMAf//AWAAAAMAkAAAAwAAAwBdlZgJ; sprop-sps=QgEBAWAAAAMAkAAAAwAAAwBdoAKAgC0WWVmkkyvAQAAAAwBAAAAGQg; sprop-pps=RAHBcrRiQA\r\n\
                   a=framesize:96 1920-1080\r\n\
                   a=control:rtsp://192.168.1.10/live/track0\r\n\
                   m=audio 0 RTP/AVP 97\r\n\
                   a=rtpmap:97 MPEG4-GENERIC/16000/2\r\n\
                   a=fmtp:97 streamtype=5; profile-level-id=15; mode=AAC-hbr; config=1410; sizeLength=13\r\n\
                   a=control:track1\r\n";
        let info = SdpInfo::parse(sdp);
        assert_eq!(info.session_name.as_deref(), Some("Media Presentation"));
        assert_eq!(info.session_description.as_deref(), Some("Front door"));

        let video = info.video.expect("video");
        assert_eq!(video.codec, VideoCodec::H265);
        assert_eq!(video.width, Some(1920));
        assert_eq!(video.height, Some(1080));
        assert_eq!(
            video.control.as_deref(),
            Some("rtsp://192.168.1.10/live/track0")
        );
        let vps = video.vps.as_ref().expect("vps");
        assert_eq!(&vps[..6], &[0, 0, 0, 1, 0x40, 0x01]);
        assert_eq!(&video.pps.as_ref().expect("pps")[..6], &[0, 0, 0, 1, 0x44, 0x01]);
        let sets = video.parameter_sets().unwrap();
        assert!(sets.starts_with(vps));

        let audio = info.audio.expect("audio");
        assert_eq!(audio.codec, AudioCodec::Aac);
        assert_eq!(audio.payload_type, Some(97));
        assert_eq!(audio.sample_rate, 16_000);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.mode.as_deref(), Some("AAC-hbr"));
        assert_eq!(audio.config.as_deref(), Some(&[0x14, 0x10][..]));
        assert_eq!(audio.control.as_deref(), Some("track1"));
    }

    #[test]
    fn mono_default_and_unknown_audio() {
        let sdp = "m=audio 0 RTP/AVP 0\na=rtpmap:0 PCMU/8000\n";
        let audio = SdpInfo::parse(sdp).audio.unwrap();
        assert_eq!(audio.codec, AudioCodec::Unknown("PCMU".into()));
        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.channels, 1);
    }

    #[test]
    fn missing_payload_type() {
        let video = SdpInfo::parse("m=video 0 RTP/AVP\r\n").video.unwrap();
        assert_eq!(video.payload_type, None);
        assert_eq!(video.codec, VideoCodec::Unknown(String::new()));
        assert!(video.parameter_sets().is_none());
    }

    #[test]
    fn second_video_section_ignored() {
        let sdp = "m=video 0 RTP/AVP 96\r\na=control:first\r\n\
                   m=video 0 RTP/AVP 98\r\na=control:second\r\n\
                   m=application 0 RTP/AVP 107\r\na=control:meta\r\n";
        let video = SdpInfo::parse(sdp).video.unwrap();
        assert_eq!(video.payload_type, Some(96));
        assert_eq!(video.control.as_deref(), Some("first"));
    }

    #[test]
    fn hex_config() {
        assert_eq!(decode_hex("1190"), Some(vec![0x11, 0x90]));
        assert_eq!(decode_hex("121056E500"), Some(vec![0x12, 0x10, 0x56, 0xe5, 0x00]));
        assert_eq!(decode_hex("123"), None);
        assert_eq!(decode_hex("zz"), None);
    }
}
