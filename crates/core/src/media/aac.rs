//! AAC depacketizer for the `mpeg4-generic` payload format (RFC 3640).
//!
//! ```text
//! +---------+-----------+-----------+---------------+
//! | RTP     | AU Header | Auxiliary | Access Unit   |
//! | Header  | Section   | Section   | Data Section  |
//! +---------+-----------+-----------+---------------+
//! ```
//!
//! The AU header section starts with a 16-bit AU-headers-length (in bits),
//! followed by one `(size, index)` pair per access unit:
//!
//! | Mode | AU-size bits | AU-index bits |
//! |------|--------------|---------------|
//! | AAC-lbr | 6 | 2 |
//! | AAC-hbr | 13 | 3 |
//!
//! Only the common case of one complete access unit per packet is emitted.
//! Packets carrying several AUs, or a fragment of one, are recognized and
//! dropped.

use super::Depacketizer;

/// AU header layout, selected by the SDP `mode` fmtp parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacMode {
    Lbr,
    Hbr,
}

impl AacMode {
    /// `AAC-lbr` (any case) selects low bit rate; anything else high bit rate.
    pub fn from_sdp(mode: &str) -> Self {
        if mode.eq_ignore_ascii_case("AAC-lbr") {
            AacMode::Lbr
        } else {
            AacMode::Hbr
        }
    }

    fn size_bits(self) -> u32 {
        match self {
            AacMode::Lbr => 6,
            AacMode::Hbr => 13,
        }
    }

    fn index_bits(self) -> u32 {
        match self {
            AacMode::Lbr => 2,
            AacMode::Hbr => 3,
        }
    }
}

/// MSB-first bit cursor over the AU header section.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read(&mut self, bits: u32) -> Option<u32> {
        let mut value = 0u32;
        for _ in 0..bits {
            let byte = *self.data.get(self.pos / 8)?;
            let bit = (byte >> (7 - (self.pos % 8))) & 1;
            value = (value << 1) | bit as u32;
            self.pos += 1;
        }
        Some(value)
    }
}

#[derive(Debug)]
pub struct AacDepacketizer {
    mode: AacMode,
}

impl AacDepacketizer {
    pub fn new(mode: AacMode) -> Self {
        Self { mode }
    }
}

impl Depacketizer for AacDepacketizer {
    fn depacketize(&mut self, payload: &[u8]) -> Option<Vec<u8>> {
        let headers_bits = u16::from_be_bytes([*payload.first()?, *payload.get(1)?]) as usize;
        let headers_bytes = headers_bits.div_ceil(8);
        let data_start = 2 + headers_bytes;
        let Some(headers) = payload.get(2..data_start) else {
            tracing::warn!(headers_bits, len = payload.len(), "truncated AU header section");
            return None;
        };

        let pair_bits = (self.mode.size_bits() + self.mode.index_bits()) as usize;
        let mut count = 1;
        if headers_bits > pair_bits {
            count += (headers_bits - pair_bits) / pair_bits;
        }
        if count != 1 {
            tracing::debug!(count, "multiple AUs per packet not supported, dropping");
            return None;
        }

        let mut bits = BitReader::new(headers);
        let size = bits.read(self.mode.size_bits())? as usize;
        let index = bits.read(self.mode.index_bits())?;
        let data = &payload[data_start..];

        if index != 0 || data.len() != size {
            tracing::debug!(
                size,
                index,
                remaining = data.len(),
                "fragmented AU not supported, dropping"
            );
            return None;
        }

        Some(data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build an hbr packet with one AU header (13-bit size, 3-bit index).
    fn hbr_packet(au: &[u8], declared: usize, index: u16) -> Vec<u8> {
        let header = ((declared as u16) << 3) | index;
        let mut p = vec![0x00, 0x10];
        p.extend_from_slice(&header.to_be_bytes());
        p.extend_from_slice(au);
        p
    }

    #[test]
    fn mode_from_sdp() {
        assert_eq!(AacMode::from_sdp("AAC-hbr"), AacMode::Hbr);
        assert_eq!(AacMode::from_sdp("aac-LBR"), AacMode::Lbr);
        assert_eq!(AacMode::from_sdp(""), AacMode::Hbr);
    }

    #[test]
    fn single_complete_hbr_au() {
        let au = [0x21, 0x10, 0x05, 0x50, 0x01];
        let mut d = AacDepacketizer::new(AacMode::Hbr);
        assert_eq!(d.depacketize(&hbr_packet(&au, au.len(), 0)), Some(au.to_vec()));
    }

    #[test]
    fn single_complete_lbr_au() {
        // 8 header bits: size 3 (000011), index 0 (00).
        let packet = [0x00, 0x08, 0b0000_1100, 0xAA, 0xBB, 0xCC];
        let mut d = AacDepacketizer::new(AacMode::Lbr);
        assert_eq!(d.depacketize(&packet), Some(vec![0xAA, 0xBB, 0xCC]));
    }

    #[test]
    fn size_mismatch_is_fragment() {
        let au = [1, 2, 3, 4];
        let mut d = AacDepacketizer::new(AacMode::Hbr);
        assert!(d.depacketize(&hbr_packet(&au, 100, 0)).is_none());
    }

    #[test]
    fn nonzero_index_dropped() {
        let au = [1, 2, 3];
        let mut d = AacDepacketizer::new(AacMode::Hbr);
        assert!(d.depacketize(&hbr_packet(&au, au.len(), 1)).is_none());
    }

    #[test]
    fn multiple_au_headers_dropped() {
        // Two 16-bit hbr headers: sizes 2 and 2.
        let packet = [0x00, 0x20, 0x00, 0x10, 0x00, 0x10, 1, 2, 3, 4];
        let mut d = AacDepacketizer::new(AacMode::Hbr);
        assert!(d.depacketize(&packet).is_none());
    }

    #[test]
    fn truncated_packets() {
        let mut d = AacDepacketizer::new(AacMode::Hbr);
        assert!(d.depacketize(&[]).is_none());
        assert!(d.depacketize(&[0x00]).is_none());
        assert!(d.depacketize(&[0x00, 0x10, 0x00]).is_none());
    }
}
