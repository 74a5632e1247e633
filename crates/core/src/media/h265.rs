//! H.265 (HEVC) RTP depacketizer, RFC 7798.
//!
//! Key differences from H.264 (RFC 6184):
//!
//! - **2-byte NAL unit header** (vs 1-byte in H.264).
//!   The NAL type is in bits 1..6 of the first byte:
//!   ```text
//!   +---------------+---------------+
//!   |F|   Type    |  LayerId  | TID |
//!   +---------------+---------------+
//!   ```
//!
//! - **FU packets** (type 49, §4.4.3) carry the 2-byte payload header, then
//!   a 1-byte FU header `[S|E|FuType]` with a 6-bit type field. The original
//!   header is rebuilt as `(b0 & 0x81) | (FuType << 1), b1`.
//!
//! - **Parameter sets**: VPS (32), SPS (33) and PPS (34). IRAP pictures
//!   (types 16-21) are the random access points.
//!
//! Aggregation packets (48) and PACI packets (50) are recognized and dropped.

use super::fragment::FuAssembler;
use super::{Depacketizer, NalClass, annex_b};

pub const NAL_TYPE_BLA_W_LP: u8 = 16;
pub const NAL_TYPE_CRA: u8 = 21;
pub const NAL_TYPE_VPS: u8 = 32;
pub const NAL_TYPE_SPS: u8 = 33;
pub const NAL_TYPE_PPS: u8 = 34;
pub const NAL_TYPE_AP: u8 = 48;
pub const NAL_TYPE_FU: u8 = 49;
pub const NAL_TYPE_PACI: u8 = 50;

/// NAL unit type of an Annex-B H.265 unit.
pub fn nal_type(unit: &[u8]) -> Option<u8> {
    unit.get(4).map(|b| (b >> 1) & 0x3f)
}

/// BLA, IDR and CRA pictures. 22 and 23 are reserved IRAP types.
fn is_irap(nal_type: u8) -> bool {
    (NAL_TYPE_BLA_W_LP..=NAL_TYPE_CRA).contains(&nal_type)
}

#[derive(Debug, Default)]
pub struct H265Depacketizer {
    fu: FuAssembler,
}

impl H265Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn depacketize_fu(&mut self, payload: &[u8]) -> Option<Vec<u8>> {
        if payload.len() < 3 {
            tracing::warn!(len = payload.len(), "truncated H.265 FU packet");
            return None;
        }

        let fu_header = payload[2];
        let fu_type = fu_header & 0x3f;
        let nal_header = [(payload[0] & 0x81) | (fu_type << 1), payload[1]];
        let data = &payload[3..];

        match fu_header & 0xc0 {
            0x80 => {
                self.fu.start(&nal_header, data);
                None
            }
            0x00 => {
                self.fu.append(data);
                None
            }
            0x40 => self.fu.finish(data),
            _ => {
                self.fu.start(&nal_header, data);
                self.fu.finish(&[])
            }
        }
    }
}

impl Depacketizer for H265Depacketizer {
    fn depacketize(&mut self, payload: &[u8]) -> Option<Vec<u8>> {
        if payload.len() < 2 {
            return None;
        }
        let nal_type = (payload[0] >> 1) & 0x3f;

        match nal_type {
            0..=47 => Some(annex_b(payload)),
            NAL_TYPE_AP => {
                tracing::debug!("aggregation packet not supported, dropping");
                None
            }
            NAL_TYPE_FU => self.depacketize_fu(payload),
            NAL_TYPE_PACI => {
                tracing::debug!("PACI packet not supported, dropping");
                None
            }
            _ => {
                tracing::debug!(nal_type, "unspecified NAL unit type, dropping");
                None
            }
        }
    }

    fn classify(&self, unit: &[u8]) -> NalClass {
        match nal_type(unit) {
            Some(NAL_TYPE_VPS) => NalClass::Vps,
            Some(NAL_TYPE_SPS) => NalClass::Sps,
            Some(NAL_TYPE_PPS) => NalClass::Pps,
            Some(t) if is_irap(t) => NalClass::Keyframe,
            _ => NalClass::Other,
        }
    }

    fn reset(&mut self) {
        self.fu.reset();
    }
}
