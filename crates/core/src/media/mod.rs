//! RTP payload depacketization.
//!
//! This module provides the [`Depacketizer`] trait and codec-specific
//! implementations that turn RTP payloads back into decodable units.
//!
//! ## RTP overview (RFC 3550)
//!
//! Every RTP packet starts with a 12-byte fixed header ([`rtp::RtpHeader`])
//! carrying the payload type, a 16-bit sequence number, a 32-bit media
//! timestamp and the SSRC. What follows is codec specific:
//!
//! - **Video** packets carry whole NAL units, fragments of one NAL unit, or
//!   aggregates of several. Reassembled units are emitted in Annex-B form,
//!   prefixed with [`START_CODE`].
//! - **Audio** (AAC) packets carry an AU-header section followed by one or
//!   more access units.
//!
//! ## Supported codecs
//!
//! | Codec | Module | RFC | Status |
//! |-------|--------|-----|--------|
//! | H.264 | [`h264`] | [RFC 6184](https://tools.ietf.org/html/rfc6184) | Single NAL + FU-A |
//! | H.265 | [`h265`] | [RFC 7798](https://tools.ietf.org/html/rfc7798) | Single NAL + FU |
//! | AAC | [`aac`] | [RFC 3640](https://tools.ietf.org/html/rfc3640) | One complete AU per packet |

pub mod aac;
pub mod fragment;
pub mod h264;
pub mod h265;
pub mod rtp;

/// Annex-B start code prefixed to every emitted NAL unit.
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Role of an emitted video unit, as far as access-unit dispatch cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalClass {
    /// H.265 video parameter set.
    Vps,
    /// Sequence parameter set.
    Sps,
    /// Picture parameter set.
    Pps,
    /// IDR (H.264) or IRAP (H.265) slice.
    Keyframe,
    Other,
}

/// Codec-specific RTP depacketizer.
///
/// One instance per track. Implementations keep whatever reassembly state
/// the payload format needs between packets; malformed input is dropped
/// locally and never surfaces as an error.
pub trait Depacketizer: Send {
    /// Feed one RTP payload (header, CSRCs, extension and padding already
    /// removed). Returns a complete unit when this packet finishes one.
    fn depacketize(&mut self, payload: &[u8]) -> Option<Vec<u8>>;

    /// Classify a unit previously returned by [`depacketize`](Self::depacketize).
    fn classify(&self, _unit: &[u8]) -> NalClass {
        NalClass::Other
    }

    /// Drop any partial reassembly.
    fn reset(&mut self) {}
}

/// Prefix `nal` with [`START_CODE`].
pub fn annex_b(nal: &[u8]) -> Vec<u8> {
    let mut unit = Vec::with_capacity(START_CODE.len() + nal.len());
    unit.extend_from_slice(&START_CODE);
    unit.extend_from_slice(nal);
    unit
}
