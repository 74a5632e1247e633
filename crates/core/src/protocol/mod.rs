//! RTSP protocol implementation (RFC 2326), client side.
//!
//! This module handles the text-based RTSP signaling protocol: building
//! requests, reading responses, answering authentication challenges and
//! parsing the SDP returned by DESCRIBE.
//!
//! ## RTSP message format (RFC 2326 §4)
//!
//! RTSP messages follow HTTP/1.1 syntax with a different method set:
//!
//! ```text
//! DESCRIBE rtsp://server/stream RTSP/1.0\r\n
//! Accept: application/sdp\r\n
//! CSeq: 2\r\n
//! \r\n
//! ```
//!
//! ## Methods sent by the client
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | OPTIONS | §10.1 | Capability discovery |
//! | DESCRIBE | §10.2 | Retrieve SDP session description |
//! | SETUP | §10.4 | Negotiate interleaved TCP transport |
//! | PLAY | §10.5 | Start media delivery |
//! | TEARDOWN | §10.7 | Destroy session |
//! | GET_PARAMETER | §10.8 | Keep-alive |

pub mod auth;
pub mod capabilities;
pub mod request;
pub mod response;
pub mod sdp;

pub use auth::{Challenge, Credentials};
pub use capabilities::Capabilities;
pub use request::{Method, RtspRequest};
pub use response::RtspResponse;
pub use sdp::{AudioCodec, AudioTrack, SdpInfo, VideoCodec, VideoTrack};
