//! RTSP client: interleaved RTP over TCP with H.264, H.265 and AAC
//! depacketization.
//!
//! ```no_run
//! use rtsp::{Client, ClientConfig, Credentials, Event};
//!
//! let mut config = ClientConfig::new("rtsp://192.168.1.10:554/stream");
//! config.credentials = Some(Credentials::new("admin", "secret"));
//!
//! let mut client = Client::new(config);
//! let video = client.video_queue();
//! client
//!     .start(|event: Event| {
//!         if event.is_terminal() {
//!             println!("session ended: {event:?}");
//!         }
//!     })
//!     .unwrap();
//!
//! while let Some(frame) = video.pop() {
//!     println!("{} bytes at {} us", frame.len(), frame.timestamp_us);
//! }
//! ```

pub mod client;
pub mod error;
pub mod event;
pub mod media;
pub mod protocol;
pub mod queue;
pub mod session;
pub mod transport;

pub use client::{Client, ClientConfig};
pub use error::{Result, RtspError};
pub use event::{Event, EventListener, MediaKind, TrackParameters};
pub use media::Depacketizer;
pub use protocol::{Credentials, SdpInfo};
pub use queue::{Frame, FrameQueue};
pub use session::{RtspSession, SessionConfig, SessionContext, SessionState, StatsSnapshot};
pub use transport::StopFlag;
