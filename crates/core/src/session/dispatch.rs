//! Routes RTP payloads to the depacketizer of the matching track and hands
//! the resulting access units to the queues and the listener.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::event::{Event, EventListener, MediaKind};
use crate::media::aac::{AacDepacketizer, AacMode};
use crate::media::h264::H264Depacketizer;
use crate::media::h265::H265Depacketizer;
use crate::media::rtp::RtpHeader;
use crate::media::{Depacketizer, NalClass};
use crate::protocol::{AudioCodec, AudioTrack, VideoCodec, VideoTrack};
use crate::queue::{Frame, FrameQueue};

/// Parameter sets larger than this carry a slice as well (some encoders
/// append the IDR to the SPS/PPS unit) and are emitted right away.
const EMBEDDED_SLICE_THRESHOLD: usize = 100;

/// Convert an RTP timestamp to microseconds on a `clock_rate` Hz clock.
///
/// ```
/// use rtsp::session::dispatch::timestamp_us;
///
/// assert_eq!(timestamp_us(90_000, 90_000), 1_000_000);
/// assert_eq!(timestamp_us(48_000, 48_000), 1_000_000);
/// ```
pub fn timestamp_us(rtp_timestamp: u32, clock_rate: u32) -> u64 {
    if clock_rate == 0 {
        return 0;
    }
    u64::from(rtp_timestamp) * 1_000_000 / u64::from(clock_rate)
}

/// Counters shared between the session thread and the [`Client`](crate::Client).
#[derive(Debug, Default)]
pub struct StreamStats {
    video_units: AtomicU64,
    video_bytes: AtomicU64,
    audio_units: AtomicU64,
    audio_bytes: AtomicU64,
    dropped_payloads: AtomicU64,
    dropped_frames: AtomicU64,
    resyncs: AtomicU64,
}

/// Point-in-time copy of [`StreamStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub video_units: u64,
    pub video_bytes: u64,
    pub audio_units: u64,
    pub audio_bytes: u64,
    /// RTP packets that were malformed or matched no track.
    pub dropped_payloads: u64,
    /// Access units a full queue refused.
    pub dropped_frames: u64,
    /// Times the interleaved reader had to skip bytes to find a frame.
    pub resyncs: u64,
}

impl StreamStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            video_units: self.video_units.load(Ordering::Relaxed),
            video_bytes: self.video_bytes.load(Ordering::Relaxed),
            audio_units: self.audio_units.load(Ordering::Relaxed),
            audio_bytes: self.audio_bytes.load(Ordering::Relaxed),
            dropped_payloads: self.dropped_payloads.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_dropped_payload(&self) {
        self.dropped_payloads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_resync(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    fn record_unit(&self, kind: MediaKind, len: usize) {
        let (units, bytes) = match kind {
            MediaKind::Video => (&self.video_units, &self.video_bytes),
            MediaKind::Audio => (&self.audio_units, &self.audio_bytes),
        };
        units.fetch_add(1, Ordering::Relaxed);
        bytes.fetch_add(len as u64, Ordering::Relaxed);
    }
}

struct Route {
    payload_type: u8,
    clock_rate: u32,
    depacketizer: Box<dyn Depacketizer>,
    queue: Arc<FrameQueue>,
}

/// Parameter sets waiting to be sent in front of the next keyframe.
#[derive(Default)]
struct ParameterSets {
    vps: Option<Vec<u8>>,
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
}

impl ParameterSets {
    /// `[VPS‖]SPS‖PPS`, once: the cache is emptied when both SPS and PPS
    /// are present.
    fn take_combined(&mut self) -> Option<Vec<u8>> {
        if self.sps.is_none() || self.pps.is_none() {
            return None;
        }
        let mut unit = self.vps.take().unwrap_or_default();
        unit.extend(self.sps.take().unwrap_or_default());
        unit.extend(self.pps.take().unwrap_or_default());
        Some(unit)
    }
}

/// Per-session payload router.
pub struct MediaDispatcher {
    video: Option<Route>,
    audio: Option<Route>,
    parameter_sets: ParameterSets,
    stats: Arc<StreamStats>,
}

impl MediaDispatcher {
    pub fn new(stats: Arc<StreamStats>) -> Self {
        Self {
            video: None,
            audio: None,
            parameter_sets: ParameterSets::default(),
            stats,
        }
    }

    /// Route the track's payload type to an H.264/H.265 depacketizer.
    ///
    /// Parameter sets from the SDP seed the cache, so the first keyframe is
    /// preceded by them even if the stream never repeats them in-band.
    pub fn with_video(mut self, track: &VideoTrack, queue: Arc<FrameQueue>) -> Self {
        let Some(payload_type) = track.payload_type else {
            tracing::warn!("video track without payload type, not routed");
            return self;
        };
        let depacketizer: Box<dyn Depacketizer> = match &track.codec {
            VideoCodec::H264 => Box::new(H264Depacketizer::new()),
            VideoCodec::H265 => Box::new(H265Depacketizer::new()),
            VideoCodec::Unknown(name) => {
                tracing::warn!(codec = %name, "unsupported video codec, not routed");
                return self;
            }
        };

        self.parameter_sets = ParameterSets {
            vps: track.vps.clone(),
            sps: track.sps.clone(),
            pps: track.pps.clone(),
        };
        self.video = Some(Route {
            payload_type,
            clock_rate: track.clock_rate,
            depacketizer,
            queue,
        });
        self
    }

    /// Route the track's payload type to the AAC depacketizer.
    pub fn with_audio(mut self, track: &AudioTrack, queue: Arc<FrameQueue>) -> Self {
        let Some(payload_type) = track.payload_type else {
            tracing::warn!("audio track without payload type, not routed");
            return self;
        };
        if track.codec != AudioCodec::Aac {
            tracing::warn!(codec = ?track.codec, "unsupported audio codec, not routed");
            return self;
        }

        let mode = AacMode::from_sdp(track.mode.as_deref().unwrap_or_default());
        self.audio = Some(Route {
            payload_type,
            clock_rate: track.sample_rate,
            depacketizer: Box::new(AacDepacketizer::new(mode)),
            queue,
        });
        self
    }

    /// Feed one RTP packet's payload.
    pub fn dispatch(
        &mut self,
        header: &RtpHeader,
        payload: &[u8],
        listener: &mut dyn EventListener,
    ) {
        let pt = header.payload_type;

        if let Some(video) = self.video.as_mut()
            && video.payload_type == pt
        {
            let Some(unit) = video.depacketizer.depacketize(payload) else {
                return;
            };
            let class = video.depacketizer.classify(&unit);
            let ts = timestamp_us(header.timestamp, video.clock_rate);
            self.on_video_unit(unit, class, ts, listener);
        } else if let Some(audio) = self.audio.as_mut()
            && audio.payload_type == pt
        {
            let Some(sample) = audio.depacketizer.depacketize(payload) else {
                return;
            };
            let frame = Frame::new(sample, timestamp_us(header.timestamp, audio.clock_rate), false);
            deliver(MediaKind::Audio, &audio.queue, &self.stats, listener, frame);
        } else {
            tracing::warn!(payload_type = pt, "invalid RTP payload type");
            self.stats.record_dropped_payload();
        }
    }

    fn on_video_unit(
        &mut self,
        unit: Vec<u8>,
        class: NalClass,
        ts: u64,
        listener: &mut dyn EventListener,
    ) {
        let Some(video) = self.video.as_ref() else {
            return;
        };
        let sets = &mut self.parameter_sets;

        match class {
            NalClass::Vps | NalClass::Sps | NalClass::Pps => {
                let slot = match class {
                    NalClass::Vps => &mut sets.vps,
                    NalClass::Sps => &mut sets.sps,
                    _ => &mut sets.pps,
                };
                let embedded = unit.len() > EMBEDDED_SLICE_THRESHOLD;
                *slot = Some(unit.clone());
                if embedded {
                    tracing::trace!(len = unit.len(), "parameter set with embedded slice");
                    let frame = Frame::new(unit, ts, true);
                    deliver(MediaKind::Video, &video.queue, &self.stats, listener, frame);
                }
            }
            NalClass::Keyframe => {
                if let Some(combined) = sets.take_combined() {
                    let frame = Frame::new(combined, ts, true);
                    deliver(MediaKind::Video, &video.queue, &self.stats, listener, frame);
                }
                let frame = Frame::new(unit, ts, true);
                deliver(MediaKind::Video, &video.queue, &self.stats, listener, frame);
            }
            NalClass::Other => {
                let frame = Frame::new(unit, ts, false);
                deliver(MediaKind::Video, &video.queue, &self.stats, listener, frame);
            }
        }
    }
}

fn deliver(
    kind: MediaKind,
    queue: &FrameQueue,
    stats: &StreamStats,
    listener: &mut dyn EventListener,
    frame: Frame,
) {
    tracing::trace!(?kind, len = frame.len(), ts = frame.timestamp_us, "access unit");
    stats.record_unit(kind, frame.len());
    if !queue.push(frame.clone()) {
        stats.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }
    listener.on_event(Event::AccessUnit { kind, frame });
}

/// Wrap a parameter-set unit for seeding a queue before streaming starts.
pub(crate) fn parameter_set_frame(unit: Vec<u8>) -> Frame {
    Frame::new(Bytes::from(unit), 0, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SdpInfo;

    fn rtp(payload_type: u8, timestamp: u32) -> RtpHeader {
        let mut bytes = [0u8; 12];
        bytes[0] = 0x80;
        bytes[1] = payload_type;
        bytes[4..8].copy_from_slice(&timestamp.to_be_bytes());
        RtpHeader::parse(&bytes, 100).unwrap()
    }

    fn h264_track() -> VideoTrack {
        SdpInfo::parse(
            "m=video 0 RTP/AVP 96\r\n\
             a=rtpmap:96 H264/90000\r\n\
             a=fmtp:96 sprop-parameter-sets=Z0IAHpWoFAFuQA==,aM48gA==\r\n",
        )
        .video
        .unwrap()
    }

    fn aac_track() -> AudioTrack {
        SdpInfo::parse(
            "m=audio 0 RTP/AVP 97\r\n\
             a=rtpmap:97 mpeg4-generic/48000/2\r\n\
             a=fmtp:97 mode=AAC-hbr;config=1190\r\n",
        )
        .audio
        .unwrap()
    }

    struct Collect(Vec<Event>);

    impl EventListener for Collect {
        fn on_event(&mut self, event: Event) {
            self.0.push(event);
        }
    }

    fn frames(events: &[Event]) -> Vec<(MediaKind, Frame)> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::AccessUnit { kind, frame } => Some((*kind, frame.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn idr_preceded_by_parameter_sets_once() {
        let track = h264_track();
        let queue = Arc::new(FrameQueue::new(16));
        let stats = Arc::new(StreamStats::default());
        let mut dispatcher = MediaDispatcher::new(stats.clone()).with_video(&track, queue.clone());
        let mut listener = Collect(Vec::new());

        dispatcher.dispatch(&rtp(96, 90_000), &[0x65, 0x88, 0x80], &mut listener);
        dispatcher.dispatch(&rtp(96, 93_000), &[0x41, 0x9a], &mut listener);
        dispatcher.dispatch(&rtp(96, 180_000), &[0x65, 0x88, 0x81], &mut listener);

        let got = frames(&listener.0);
        assert_eq!(got.len(), 4, "sets, idr, p, idr");
        let expected_sets = track.parameter_sets().unwrap();
        assert_eq!(got[0].1.data[..], expected_sets[..]);
        assert!(got[0].1.keyframe);
        assert_eq!(got[0].1.timestamp_us, 1_000_000);
        assert_eq!(got[1].1.data[..], [0, 0, 0, 1, 0x65, 0x88, 0x80]);
        assert!(got[1].1.keyframe);
        assert!(!got[2].1.keyframe);
        assert_eq!(got[3].1.data[..], [0, 0, 0, 1, 0x65, 0x88, 0x81]);

        assert_eq!(queue.len(), 4);
        assert_eq!(stats.snapshot().video_units, 4);
    }

    #[test]
    fn in_band_parameter_sets_refresh_cache() {
        let track = h264_track();
        let queue = Arc::new(FrameQueue::new(16));
        let mut dispatcher = MediaDispatcher::new(Arc::default()).with_video(&track, queue);
        let mut listener = Collect(Vec::new());

        dispatcher.dispatch(&rtp(96, 0), &[0x65, 0x01], &mut listener);
        dispatcher.dispatch(&rtp(96, 0), &[0x67, 0x42, 0x00, 0x1f], &mut listener);
        dispatcher.dispatch(&rtp(96, 0), &[0x68, 0xce], &mut listener);
        dispatcher.dispatch(&rtp(96, 0), &[0x65, 0x02], &mut listener);

        let got = frames(&listener.0);
        assert_eq!(got.len(), 4);
        assert_eq!(
            got[2].1.data[..],
            [0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1f, 0, 0, 0, 1, 0x68, 0xce]
        );
    }

    #[test]
    fn large_parameter_set_emitted_immediately() {
        let mut track = h264_track();
        track.sps = None;
        track.pps = None;
        let queue = Arc::new(FrameQueue::new(16));
        let mut dispatcher = MediaDispatcher::new(Arc::default()).with_video(&track, queue);
        let mut listener = Collect(Vec::new());

        let mut big_sps = vec![0x67];
        big_sps.extend(std::iter::repeat_n(0xaa, 120));
        dispatcher.dispatch(&rtp(96, 0), &big_sps, &mut listener);
        dispatcher.dispatch(&rtp(96, 0), &[0x68, 0xce], &mut listener);

        let got = frames(&listener.0);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].1.len(), 4 + big_sps.len());
    }

    #[test]
    fn without_sdp_sets_idr_is_sent_alone() {
        let mut track = h264_track();
        track.pps = None;
        let queue = Arc::new(FrameQueue::new(16));
        let mut dispatcher = MediaDispatcher::new(Arc::default()).with_video(&track, queue);
        let mut listener = Collect(Vec::new());

        dispatcher.dispatch(&rtp(96, 0), &[0x65, 0x01], &mut listener);
        assert_eq!(frames(&listener.0).len(), 1);
    }

    #[test]
    fn aac_uses_sample_rate_clock() {
        let queue = Arc::new(FrameQueue::new(4));
        let stats = Arc::new(StreamStats::default());
        let mut dispatcher =
            MediaDispatcher::new(stats.clone()).with_audio(&aac_track(), queue.clone());
        let mut listener = Collect(Vec::new());

        // AU-headers-length 16 bits, size 3, index 0.
        let payload = [0x00, 0x10, 0x00, 0x18, 0xde, 0xad, 0xbe];
        dispatcher.dispatch(&rtp(97, 48_000), &payload, &mut listener);

        let got = frames(&listener.0);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, MediaKind::Audio);
        assert_eq!(got[0].1.data[..], [0xde, 0xad, 0xbe]);
        assert_eq!(got[0].1.timestamp_us, 1_000_000);
        assert_eq!(queue.pop().unwrap(), got[0].1);
        assert_eq!(stats.snapshot().audio_bytes, 3);
    }

    #[test]
    fn unknown_payload_type_dropped() {
        let stats = Arc::new(StreamStats::default());
        let mut dispatcher = MediaDispatcher::new(stats.clone())
            .with_video(&h264_track(), Arc::new(FrameQueue::new(4)));
        let mut listener = Collect(Vec::new());

        dispatcher.dispatch(&rtp(111, 0), &[0x65, 0x01], &mut listener);
        assert!(listener.0.is_empty());
        assert_eq!(stats.snapshot().dropped_payloads, 1);
    }

    #[test]
    fn unsupported_tracks_not_routed() {
        let mut audio = aac_track();
        audio.codec = AudioCodec::Unknown("PCMU".into());
        let mut video = h264_track();
        video.codec = VideoCodec::Unknown("JPEG".into());

        let stats = Arc::new(StreamStats::default());
        let mut dispatcher = MediaDispatcher::new(stats.clone())
            .with_video(&video, Arc::new(FrameQueue::new(1)))
            .with_audio(&audio, Arc::new(FrameQueue::new(1)));
        let mut listener = Collect(Vec::new());
        dispatcher.dispatch(&rtp(96, 0), &[0x65, 0x01], &mut listener);
        dispatcher.dispatch(&rtp(97, 0), &[0x00, 0x10, 0x00, 0x08, 0xaa], &mut listener);

        assert!(listener.0.is_empty());
        assert_eq!(stats.snapshot().dropped_payloads, 2);
    }

    #[test]
    fn timestamp_conversion() {
        assert_eq!(timestamp_us(9, 90_000), 100);
        assert_eq!(timestamp_us(u32::MAX, 90_000), 47_721_858_833);
        assert_eq!(timestamp_us(1234, 0), 0);
    }
}
