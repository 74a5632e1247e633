//! RTSP session state machine, client side (RFC 2326 §A.1).
//!
//! One [`RtspSession`] drives one connection from the first OPTIONS to the
//! final TEARDOWN. It owns the stream exclusively; everything it produces
//! leaves through the [`FrameQueue`]s and the [`EventListener`].
//!
//! ## Session lifecycle
//!
//! ```text
//! Idle -> Connecting -> OptionsNegotiation -> Describing
//!      -> SettingUp(0..n) -> Playing -> TearingDown -> Disconnected
//!
//! any state -> Failed(reason)
//! ```
//!
//! Each request that gets `401 Unauthorized` is answered once with
//! credentials derived from the server's challenge; once a challenge is
//! known every later request carries a freshly computed `Authorization`.

pub mod dispatch;
mod stream;
pub mod transport;

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, RtspError};
use crate::event::{Event, EventListener, TrackParameters};
use crate::protocol::{
    AudioCodec, Capabilities, Challenge, Credentials, Method, RtspRequest, RtspResponse, SdpInfo,
};
use crate::queue::FrameQueue;
use crate::transport::{InterleavedFramer, StopFlag, StreamReader};
pub use dispatch::{MediaDispatcher, StatsSnapshot, StreamStats};
pub use transport::TransportHeader;

/// Default session timeout (RFC 2326 §12.37), used when the server sends none.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;

/// User agent sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = "Lavf58.29.100";

/// Client-side session state (RFC 2326 §A.1).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    OptionsNegotiation,
    Describing,
    /// SETUP of the track with this index (0 video, 1 audio).
    SettingUp(usize),
    /// PLAY accepted; media is flowing.
    Playing,
    TearingDown,
    Disconnected,
    Failed(String),
}

/// Everything one session needs to know about its target.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub uri: String,
    pub credentials: Option<Credentials>,
    pub user_agent: Option<String>,
    pub want_video: bool,
    pub want_audio: bool,
    /// Log every response header at debug level.
    pub dump_headers: bool,
}

impl SessionConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            credentials: None,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            want_video: true,
            want_audio: true,
            dump_headers: false,
        }
    }
}

/// Shared handles between a session thread and its owner.
///
/// All fields are reference counted, so clones observe the same queues,
/// counters and state.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub stop: StopFlag,
    pub video_queue: Arc<FrameQueue>,
    pub audio_queue: Arc<FrameQueue>,
    pub stats: Arc<StreamStats>,
    pub state: Arc<Mutex<SessionState>>,
}

impl SessionContext {
    /// Transition to a new state.
    pub fn set_state(&self, state: SessionState) {
        let mut current = self.state.lock();
        tracing::debug!(old_state = ?*current, new_state = ?state, "state transition");
        *current = state;
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }
}

/// The `Session` response header (RFC 2326 §12.37): `<id>[;timeout=<secs>]`.
///
/// ```
/// use rtsp::session::parse_session_header;
///
/// assert_eq!(parse_session_header("12345678;timeout=30"), ("12345678".into(), Some(30)));
/// assert_eq!(parse_session_header("ABCDEF"), ("ABCDEF".into(), None));
/// ```
pub fn parse_session_header(value: &str) -> (String, Option<u64>) {
    let mut parts = value.split(';');
    let id = parts.next().unwrap_or_default().trim().to_string();
    let timeout = parts
        .filter_map(|p| p.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("timeout"))
        .and_then(|(_, secs)| secs.trim().parse().ok());
    (id, timeout)
}

/// URI to SETUP a track whose SDP `a=control` is `control`.
///
/// Absolute `rtsp://`/`rtsps://` controls are used as-is, `*` (or no
/// control) means the base itself, anything else is appended to the base.
pub fn track_uri(base: &str, control: Option<&str>) -> String {
    let control = control.map(str::trim).unwrap_or_default();
    if control.is_empty() || control == "*" {
        return base.to_string();
    }
    let lower = control.to_ascii_lowercase();
    if lower.starts_with("rtsp://") || lower.starts_with("rtsps://") {
        return control.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        control.trim_start_matches('/')
    )
}

/// Map a non-401 status to success or [`RtspError::Status`].
fn check_status(method: Method, response: &RtspResponse) -> Result<()> {
    match response.status_code {
        200 => Ok(()),
        401 => Err(RtspError::Unauthorized),
        code => Err(RtspError::Status {
            method: method.as_str(),
            code,
        }),
    }
}

/// One RTSP client session over a connected stream.
pub struct RtspSession<S> {
    reader: StreamReader<S>,
    config: SessionConfig,
    ctx: SessionContext,
    cseq: u32,
    challenge: Option<Challenge>,
    session_id: Option<String>,
    /// Aggregate control URI: `Content-Base` when sent, else the target URI.
    base_uri: String,
    session_timeout: Duration,
    capabilities: Capabilities,
    framer: InterleavedFramer,
}

impl<S: Read + Write> RtspSession<S> {
    /// Run a full session over `stream` and return its terminal event.
    ///
    /// The stream is dropped, closing it, before this returns. Progress
    /// events go to `listener`; the terminal event is returned, not sent.
    pub fn execute(
        stream: S,
        config: SessionConfig,
        ctx: &SessionContext,
        listener: &mut dyn EventListener,
    ) -> Event {
        let mut session = RtspSession::new(stream, config, ctx.clone());
        let result = session.run(listener);
        drop(session);

        let event = Event::from_result(&result, ctx.stop.is_stopped());
        match (&result, &event) {
            (Err(e), Event::Failed(_)) => tracing::error!(error = %e, "session failed"),
            (Err(e), _) => tracing::info!(error = %e, "session ended"),
            (Ok(()), _) => tracing::info!("session ended"),
        }
        ctx.set_state(match &event {
            Event::Failed(reason) => SessionState::Failed(reason.clone()),
            _ => SessionState::Disconnected,
        });
        event
    }

    fn new(stream: S, config: SessionConfig, ctx: SessionContext) -> Self {
        let base_uri = config.uri.clone();
        Self {
            reader: StreamReader::new(stream, ctx.stop.clone()),
            config,
            ctx,
            cseq: 0,
            challenge: None,
            session_id: None,
            base_uri,
            session_timeout: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
            capabilities: Capabilities::NONE,
            framer: InterleavedFramer::new(),
        }
    }

    fn run(&mut self, listener: &mut dyn EventListener) -> Result<()> {
        let uri = self.config.uri.clone();

        self.ctx.set_state(SessionState::OptionsNegotiation);
        let options = self.request_with_auth(Method::Options, &uri, None)?;
        check_status(Method::Options, &options)?;
        self.capabilities = options
            .get_header("Public")
            .map(Capabilities::parse)
            .unwrap_or_default();
        tracing::debug!(capabilities = ?self.capabilities, "server capabilities");

        self.ctx.set_state(SessionState::Describing);
        let describe =
            self.request_with_auth(Method::Describe, &uri, Some(("Accept", "application/sdp")))?;
        check_status(Method::Describe, &describe)?;
        let mut sdp = SdpInfo::parse(describe.body.as_deref().unwrap_or_default());
        self.select_tracks(&mut sdp);

        let base = describe
            .get_header("Content-Base")
            .map(|b| b.trim_end_matches('/').to_string())
            .unwrap_or_else(|| uri.clone());
        self.base_uri = base.clone();

        let mut dispatcher = MediaDispatcher::new(self.ctx.stats.clone());
        let mut tracks = 0usize;

        if let Some(video) = sdp.video.clone() {
            self.ctx.set_state(SessionState::SettingUp(0));
            let setup_uri = track_uri(&base, video.control.as_deref());
            match self.setup(&setup_uri, TransportHeader::VIDEO)? {
                Some(_) => {
                    dispatcher = dispatcher.with_video(&video, self.ctx.video_queue.clone());
                    tracks += 1;
                }
                None => sdp.video = None,
            }
        }
        if let Some(audio) = sdp.audio.clone() {
            self.ctx.set_state(SessionState::SettingUp(1));
            let setup_uri = track_uri(&base, audio.control.as_deref());
            match self.setup(&setup_uri, TransportHeader::AUDIO)? {
                Some(_) => {
                    dispatcher = dispatcher.with_audio(&audio, self.ctx.audio_queue.clone());
                    tracks += 1;
                }
                None => sdp.audio = None,
            }
        }

        if tracks == 0 {
            return Err(RtspError::NoMediaTrack);
        }
        if self.session_id.is_none() {
            return Err(RtspError::NoSession);
        }

        let play = self.request_with_auth(Method::Play, &base, Some(("Range", "npt=0.000-")))?;
        check_status(Method::Play, &play)?;
        self.ctx.set_state(SessionState::Playing);
        tracing::info!(session = ?self.session_id, uri = %uri, "playing");

        self.announce_tracks(&sdp, listener);
        listener.on_event(Event::Connected(sdp));

        match self.stream(&mut dispatcher, listener) {
            Err(RtspError::Interrupted) => tracing::debug!("stream interrupted"),
            Err(e) if self.ctx.stop.is_stopped() => tracing::debug!(error = %e, "stream stopped"),
            Err(e) => tracing::warn!(error = %e, "stream ended"),
            Ok(()) => {}
        }

        if self.capabilities.contains(Capabilities::TEARDOWN) {
            self.ctx.set_state(SessionState::TearingDown);
            if let Err(e) = self.teardown(&base) {
                tracing::debug!(error = %e, "TEARDOWN failed");
            }
        }
        Ok(())
    }

    /// Drop tracks the caller did not ask for, and audio we cannot decode.
    fn select_tracks(&self, sdp: &mut SdpInfo) {
        if !self.config.want_video {
            sdp.video = None;
        }
        if !self.config.want_audio {
            sdp.audio = None;
        }
        if let Some(audio) = &sdp.audio
            && audio.codec != AudioCodec::Aac
        {
            tracing::warn!(codec = ?audio.codec, "unsupported audio codec, audio disabled");
            sdp.audio = None;
        }
    }

    /// SETUP one track. `Ok(None)` if the server refused it.
    fn setup(&mut self, uri: &str, transport: TransportHeader) -> Result<Option<TransportHeader>> {
        let value = transport.request_value();
        let response = self.request_with_auth(Method::Setup, uri, Some(("Transport", value.as_str())))?;
        if !response.is_success() {
            tracing::warn!(uri, status = response.status_code, "SETUP refused, track disabled");
            return Ok(None);
        }

        if let Some(header) = response.get_header("Session") {
            let (id, timeout) = parse_session_header(header);
            if !id.is_empty() {
                if let Some(secs) = timeout.filter(|&s| s > 0) {
                    self.session_timeout = Duration::from_secs(secs);
                }
                tracing::info!(session = %id, timeout = ?self.session_timeout, "session established");
                self.session_id = Some(id);
            }
        }

        let negotiated = response
            .get_header("Transport")
            .and_then(TransportHeader::parse)
            .unwrap_or(transport);
        self.framer
            .add_pair(negotiated.rtp_channel, negotiated.rtcp_channel);
        Ok(Some(negotiated))
    }

    /// Tell the listener about each track and prime the video queue with
    /// the SDP parameter sets.
    fn announce_tracks(&self, sdp: &SdpInfo, listener: &mut dyn EventListener) {
        if let Some(video) = &sdp.video {
            let parameter_sets = video.parameter_sets();
            self.ctx.video_queue.clear();
            if let Some(sets) = &parameter_sets {
                self.ctx
                    .video_queue
                    .push(dispatch::parameter_set_frame(sets.clone()));
            }
            listener.on_event(Event::TrackReady(TrackParameters::Video {
                codec: video.codec.clone(),
                parameter_sets,
                width: video.width,
                height: video.height,
            }));
        }
        if let Some(audio) = &sdp.audio {
            self.ctx.audio_queue.clear();
            listener.on_event(Event::TrackReady(TrackParameters::Audio {
                codec: audio.codec.clone(),
                sample_rate: audio.sample_rate,
                channels: audio.channels,
                config: audio.config.clone(),
            }));
        }
    }

    /// Best-effort TEARDOWN; the response is not awaited.
    fn teardown(&mut self, uri: &str) -> Result<()> {
        let request = self.build_request(Method::Teardown, uri, None);
        let stream = self.reader.get_mut();
        stream.write_all(request.serialize().as_bytes())?;
        stream.flush()?;
        Ok(())
    }

    /// Send `method` and read the response, answering one 401 challenge.
    fn request_with_auth(
        &mut self,
        method: Method,
        uri: &str,
        header: Option<(&str, &str)>,
    ) -> Result<RtspResponse> {
        self.send_request(method, uri, header)?;
        let response = self.read_response()?;
        if response.status_code != 401 {
            return Ok(response);
        }

        if self.config.credentials.is_none() {
            tracing::warn!(method = %method, "server requires credentials");
            return Err(RtspError::Unauthorized);
        }
        self.challenge = Some(Challenge::from_headers(
            response.get_headers("WWW-Authenticate"),
        )?);
        tracing::debug!(challenge = ?self.challenge, "retrying with credentials");

        self.send_request(method, uri, header)?;
        let response = self.read_response()?;
        if response.status_code == 401 {
            return Err(RtspError::Unauthorized);
        }
        Ok(response)
    }

    fn build_request(
        &mut self,
        method: Method,
        uri: &str,
        header: Option<(&str, &str)>,
    ) -> RtspRequest {
        self.cseq += 1;
        let authorization = match (&self.challenge, &self.config.credentials) {
            (Some(challenge), Some(credentials)) => {
                Some(challenge.authorization(credentials, method.as_str(), uri))
            }
            _ => None,
        };
        let session = match method {
            Method::Options | Method::Describe => None,
            _ => self.session_id.as_deref(),
        };

        let mut request = RtspRequest::new(method, uri);
        if let Some((name, value)) = header {
            request = request.add_header(name, value);
        }
        request
            .add_optional_header("Authorization", authorization.as_deref())
            .add_header("CSeq", &self.cseq.to_string())
            .add_optional_header("User-Agent", self.config.user_agent.as_deref())
            .add_optional_header("Session", session)
    }

    fn send_request(
        &mut self,
        method: Method,
        uri: &str,
        header: Option<(&str, &str)>,
    ) -> Result<()> {
        let request = self.build_request(method, uri, header);
        tracing::debug!(method = %method, cseq = self.cseq, uri, "request");
        self.reader.send(request.serialize().as_bytes())
    }

    fn read_response(&mut self) -> Result<RtspResponse> {
        let response = RtspResponse::read(&mut self.reader)?;
        tracing::info!(status = response.status_code, cseq = ?response.cseq(), "response");
        if self.config.dump_headers {
            for (name, value) in &response.headers {
                tracing::debug!(name = %name, value = %value, "header");
            }
        }
        Ok(response)
    }
}
