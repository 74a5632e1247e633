use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Result, RtspError};
use crate::event::{Event, EventListener, MediaKind};
use crate::protocol::Credentials;
use crate::queue::{DEFAULT_POP_TIMEOUT, DEFAULT_QUEUE_CAPACITY, FrameQueue};
use crate::session::{
    DEFAULT_USER_AGENT, RtspSession, SessionConfig, SessionContext, SessionState, StatsSnapshot,
};
use crate::transport::{Interrupter, StopFlag, tcp};

/// Reason reported when a session unwinds instead of returning.
const SESSION_PANICKED: &str = "session panicked";

/// Clears the running flag when the session thread exits, even by unwinding.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Client-level configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `rtsp://[user:pass@]host[:port]/path`.
    pub uri: String,
    pub credentials: Option<Credentials>,
    /// `User-Agent` header; `None` omits it.
    pub user_agent: Option<String>,
    pub want_video: bool,
    pub want_audio: bool,
    /// Log every response header at debug level.
    pub dump_headers: bool,
    pub connect_timeout: Duration,
    /// Socket read timeout. Also bounds how long a stop can take to be
    /// observed if closing the socket does not wake a blocked read.
    pub read_timeout: Duration,
    pub video_queue_capacity: usize,
    pub audio_queue_capacity: usize,
    /// How long [`FrameQueue::pop`] waits on both queues.
    pub queue_pop_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            credentials: None,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            want_video: true,
            want_audio: true,
            dump_headers: false,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            video_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            audio_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            queue_pop_timeout: DEFAULT_POP_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            uri: self.uri.clone(),
            credentials: self.credentials.clone(),
            user_agent: self.user_agent.clone(),
            want_video: self.want_video,
            want_audio: self.want_audio,
            dump_headers: self.dump_headers,
        }
    }
}

/// Runs one RTSP session at a time on a background thread.
///
/// Connects to [`ClientConfig::uri`], reports [`Event`]s to a listener and
/// fills the video and audio [`FrameQueue`]s. Reconnecting after a
/// terminal event is left to the caller: call [`start`](Self::start) again.
pub struct Client {
    config: ClientConfig,
    ctx: SessionContext,
    interrupter: Arc<Interrupter>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let ctx = SessionContext {
            video_queue: Arc::new(FrameQueue::with_pop_timeout(
                config.video_queue_capacity,
                config.queue_pop_timeout,
            )),
            audio_queue: Arc::new(FrameQueue::with_pop_timeout(
                config.audio_queue_capacity,
                config.queue_pop_timeout,
            )),
            ..SessionContext::default()
        };
        Self {
            config,
            interrupter: Arc::new(Interrupter::new(ctx.stop.clone())),
            ctx,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Start a session. Events, including exactly one terminal event, are
    /// delivered to `listener` on the session thread.
    pub fn start<L>(&mut self, mut listener: L) -> Result<()>
    where
        L: EventListener + 'static,
    {
        if self.running.load(Ordering::SeqCst) {
            return Err(RtspError::AlreadyRunning);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }

        // Fresh stop flag per run; a previous stop must not end this one.
        self.ctx.stop = StopFlag::new();
        self.interrupter = Arc::new(Interrupter::new(self.ctx.stop.clone()));
        self.running.store(true, Ordering::SeqCst);

        let config = self.config.clone();
        let ctx = self.ctx.clone();
        let interrupter = self.interrupter.clone();
        let running = self.running.clone();

        tracing::info!(uri = %config.uri, "starting RTSP client");

        let spawned = thread::Builder::new()
            .name("rtsp-session".to_string())
            .spawn(move || {
                let running = RunningGuard(running);
                let session = panic::catch_unwind(AssertUnwindSafe(|| {
                    listener.on_event(Event::Connecting);
                    run_session(&config, &ctx, &interrupter, &mut listener)
                }));
                let event = session.unwrap_or_else(|_| {
                    tracing::error!("session thread panicked");
                    interrupter.clear();
                    ctx.set_state(SessionState::Failed(SESSION_PANICKED.to_string()));
                    Event::Failed(SESSION_PANICKED.to_string())
                });
                drop(running);
                listener.on_event(event);
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Request the running session to end. Returns immediately; the
    /// session reports [`Event::Disconnected`] when it is gone.
    pub fn stop(&self) {
        tracing::info!("client stopping");
        self.interrupter.interrupt();
        self.ctx.video_queue.interrupt();
        self.ctx.audio_queue.interrupt();
    }

    /// Wait for the session thread to finish.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!("session thread panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Queue of Annex-B video access units.
    pub fn video_queue(&self) -> Arc<FrameQueue> {
        self.ctx.video_queue.clone()
    }

    /// Queue of raw AAC access units.
    pub fn audio_queue(&self) -> Arc<FrameQueue> {
        self.ctx.audio_queue.clone()
    }

    pub fn state(&self) -> SessionState {
        self.ctx.state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Check whether `config.uri` serves video.
    ///
    /// Reachable means a first video access unit arrived, or the server
    /// answered with `401` (it exists, the credentials are just wrong).
    /// The session is stopped before returning.
    pub fn probe(config: ClientConfig, timeout: Duration) -> bool {
        let config = ClientConfig {
            want_video: true,
            want_audio: false,
            ..config
        };
        let (tx, rx) = mpsc::channel();
        let mut client = Client::new(config);

        let listener = move |event: Event| {
            let verdict = match event {
                Event::AccessUnit {
                    kind: MediaKind::Video,
                    ..
                } => Some(true),
                Event::Unauthorized => Some(true),
                Event::Failed(_) | Event::Disconnected => Some(false),
                _ => None,
            };
            if let Some(reachable) = verdict {
                let _ = tx.send(reachable);
            }
        };

        if let Err(e) = client.start(listener) {
            tracing::warn!(error = %e, "probe could not start");
            return false;
        }
        let reachable = rx.recv_timeout(timeout).unwrap_or(false);
        client.stop();
        tracing::info!(uri = %client.config.uri, reachable, "probe finished");
        reachable
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

fn run_session(
    config: &ClientConfig,
    ctx: &SessionContext,
    interrupter: &Interrupter,
    listener: &mut dyn EventListener,
) -> Event {
    ctx.set_state(SessionState::Connecting);

    let stream = match tcp::connect(&config.uri, config.connect_timeout) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(uri = %config.uri, error = %e, "connect failed");
            let event = Event::from_result(&Err(e), ctx.stop.is_stopped());
            ctx.set_state(match &event {
                Event::Failed(reason) => SessionState::Failed(reason.clone()),
                _ => SessionState::Disconnected,
            });
            return event;
        }
    };
    if let Err(e) = stream.set_read_timeout(Some(config.read_timeout)) {
        tracing::warn!(error = %e, "failed to set read timeout");
    }
    if let Err(e) = interrupter.register(&stream) {
        tracing::warn!(error = %e, "stop will wait for the read timeout");
    }

    let event = RtspSession::execute(stream, config.session_config(), ctx, listener);
    interrupter.clear();
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn defaults() {
        let config = ClientConfig::new("rtsp://cam/live");
        assert_eq!(config.uri, "rtsp://cam/live");
        assert_eq!(config.user_agent.as_deref(), Some("Lavf58.29.100"));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.video_queue_capacity, 120);
        assert!(config.want_video && config.want_audio);

        let client = Client::new(config);
        assert!(!client.is_running());
        assert_eq!(client.state(), SessionState::Idle);
        assert_eq!(client.video_queue().capacity(), 120);
    }

    #[test]
    fn unsupported_scheme_fails() {
        let (tx, rx) = mpsc::channel();
        let mut client = Client::new(ClientConfig::new("rtsps://cam/live"));
        client
            .start(move |e: Event| {
                let _ = tx.send(e);
            })
            .unwrap();

        assert_eq!(rx.recv().unwrap(), Event::Connecting);
        assert_eq!(
            rx.recv().unwrap(),
            Event::Failed("unsupported URI scheme: rtsps".into())
        );
        client.join();
        assert!(!client.is_running());
        assert!(matches!(client.state(), SessionState::Failed(_)));
    }

    #[test]
    fn refused_connection_fails() {
        // Bind then drop to get a port nothing listens on.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut config = ClientConfig::new(format!("rtsp://127.0.0.1:{port}/live"));
        config.connect_timeout = Duration::from_millis(500);

        let (tx, rx) = mpsc::channel();
        let mut client = Client::new(config);
        client
            .start(move |e: Event| {
                let _ = tx.send(e);
            })
            .unwrap();
        let events: Vec<Event> = rx.iter().collect();
        client.join();
        assert!(matches!(events.last(), Some(Event::Failed(_))));
    }

    #[test]
    fn panicking_session_reports_failure_and_can_restart() {
        let (tx, rx) = mpsc::channel();
        let mut client = Client::new(ClientConfig::new("rtsps://cam/live"));
        client
            .start(move |e: Event| {
                if e == Event::Connecting {
                    panic!("listener failure");
                }
                let _ = tx.send(e);
            })
            .unwrap();

        assert_eq!(rx.recv().unwrap(), Event::Failed("session panicked".into()));
        client.join();
        assert!(!client.is_running());
        assert_eq!(client.state(), SessionState::Failed("session panicked".into()));

        let (tx, rx) = mpsc::channel();
        client
            .start(move |e: Event| {
                let _ = tx.send(e);
            })
            .unwrap();
        let events: Vec<Event> = rx.iter().collect();
        client.join();
        assert!(matches!(events.last(), Some(Event::Failed(_))));
    }

    #[test]
    fn probe_unreachable() {
        assert!(!Client::probe(
            ClientConfig::new("rtsp://[::1"),
            Duration::from_secs(1)
        ));
    }
}
