use super::fragment::FuAssembler;
use super::{Depacketizer, NalClass, annex_b};

pub const NAL_TYPE_IDR: u8 = 5;
pub const NAL_TYPE_SPS: u8 = 7;
pub const NAL_TYPE_PPS: u8 = 8;
pub const NAL_TYPE_STAP_A: u8 = 24;
pub const NAL_TYPE_STAP_B: u8 = 25;
pub const NAL_TYPE_MTAP16: u8 = 26;
pub const NAL_TYPE_MTAP24: u8 = 27;
pub const NAL_TYPE_FU_A: u8 = 28;
pub const NAL_TYPE_FU_B: u8 = 29;

/// NAL unit type of an Annex-B unit (`00 00 00 01` + NAL header).
pub fn nal_type(unit: &[u8]) -> Option<u8> {
    unit.get(4).map(|b| b & 0x1f)
}

/// H.264 RTP depacketizer (RFC 6184).
///
/// Handles the two modes cameras actually send:
///
/// - **Single NAL Unit** (§5.6): types 1-23, emitted as-is with a start code.
///
/// - **FU-A Fragmentation** (§5.8): one NAL unit split across packets, each
///   carrying a 2-byte FU prefix before the fragment data:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]     (1 byte)
///   FU header:     [S|E|R|NAL_Type]    (1 byte)
///   Fragment data: [...]
///   ```
///
///   The original NAL header is rebuilt from the indicator's F/NRI bits and
///   the FU header's type: `(indicator & 0xE0) | (fu_header & 0x1F)`.
///
/// Aggregation packets (STAP-A/B, MTAP16/24) and FU-B are recognized and
/// dropped.
#[derive(Debug, Default)]
pub struct H264Depacketizer {
    fu: FuAssembler,
}

impl H264Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn depacketize_fu_a(&mut self, payload: &[u8]) -> Option<Vec<u8>> {
        if payload.len() < 2 {
            tracing::warn!(len = payload.len(), "truncated FU-A packet");
            return None;
        }

        let fu_header = payload[1];
        let nal_header = (payload[0] & 0xe0) | (fu_header & 0x1f);
        let data = &payload[2..];

        match fu_header & 0xc0 {
            0x80 => {
                self.fu.start(&[nal_header], data);
                None
            }
            0x00 => {
                self.fu.append(data);
                None
            }
            0x40 => self.fu.finish(data),
            _ => {
                // S and E both set: the whole NAL unit in one fragment.
                self.fu.start(&[nal_header], data);
                self.fu.finish(&[])
            }
        }
    }
}

impl Depacketizer for H264Depacketizer {
    fn depacketize(&mut self, payload: &[u8]) -> Option<Vec<u8>> {
        let first = *payload.first()?;
        let nal_type = first & 0x1f;

        match nal_type {
            1..=23 => Some(annex_b(payload)),
            NAL_TYPE_STAP_A | NAL_TYPE_STAP_B | NAL_TYPE_MTAP16 | NAL_TYPE_MTAP24 => {
                tracing::debug!(nal_type, "aggregation packet not supported, dropping");
                None
            }
            NAL_TYPE_FU_A => self.depacketize_fu_a(payload),
            NAL_TYPE_FU_B => {
                tracing::debug!("FU-B packet not supported, dropping");
                None
            }
            _ => {
                tracing::debug!(nal_type, "reserved NAL unit type, dropping");
                None
            }
        }
    }

    fn classify(&self, unit: &[u8]) -> NalClass {
        match nal_type(unit) {
            Some(NAL_TYPE_SPS) => NalClass::Sps,
            Some(NAL_TYPE_PPS) => NalClass::Pps,
            Some(NAL_TYPE_IDR) => NalClass::Keyframe,
            _ => NalClass::Other,
        }
    }

    fn reset(&mut self) {
        self.fu.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Split a NAL unit into FU-A packets at the given data boundaries.
    fn fragment(nal: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
        let indicator = (nal[0] & 0xe0) | NAL_TYPE_FU_A;
        let nal_type = nal[0] & 0x1f;
        let data = &nal[1..];

        let mut bounds = vec![0];
        bounds.extend(cuts.iter().copied().filter(|&c| c > 0 && c < data.len()));
        bounds.push(data.len());
        bounds.dedup();

        let last = bounds.len() - 2;
        (0..=last)
            .map(|i| {
                let mut header = nal_type;
                if i == 0 {
                    header |= 0x80;
                }
                if i == last {
                    header |= 0x40;
                }
                let mut packet = vec![indicator, header];
                packet.extend_from_slice(&data[bounds[i]..bounds[i + 1]]);
                packet
            })
            .collect()
    }

    fn feed(d: &mut H264Depacketizer, packets: &[Vec<u8>]) -> Vec<Vec<u8>> {
        packets.iter().filter_map(|p| d.depacketize(p)).collect()
    }

    #[test]
    fn single_nal_gets_start_code() {
        let mut d = H264Depacketizer::new();
        let unit = d.depacketize(&[0x67, 0x42, 0x00, 0x1e]).unwrap();
        assert_eq!(unit, vec![0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1e]);
        assert_eq!(d.classify(&unit), NalClass::Sps);
    }

    #[test]
    fn fu_a_three_fragments() {
        let mut d = H264Depacketizer::new();
        let nal = [0x65, 1, 2, 3, 4, 5, 6];
        let out = feed(&mut d, &fragment(&nal, &[2, 4]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0], [&[0, 0, 0, 1][..], &nal[..]].concat());
        assert_eq!(d.classify(&out[0]), NalClass::Keyframe);
    }

    #[test]
    fn reconstructed_header_keeps_nri() {
        let mut d = H264Depacketizer::new();
        // F=0 NRI=3 type=28 indicator, FU header S+E type 1
        let unit = d.depacketize(&[0x7c, 0xc1, 0xAA]).unwrap();
        assert_eq!(unit, vec![0, 0, 0, 1, 0x61, 0xAA]);
    }

    #[test]
    fn end_without_start_emits_nothing() {
        let mut d = H264Depacketizer::new();
        assert!(d.depacketize(&[0x7c, 0x45, 1, 2, 3]).is_none());
        assert!(d.depacketize(&[0x7c, 0x05, 1, 2, 3]).is_none());
    }

    #[test]
    fn aggregation_and_fu_b_dropped() {
        let mut d = H264Depacketizer::new();
        for t in [24u8, 25, 26, 27, 29] {
            assert!(d.depacketize(&[t, 0, 2, 0x67, 0x42]).is_none(), "type {t}");
        }
        assert!(d.depacketize(&[]).is_none());
    }

    #[test]
    fn random_fragmentation_round_trip() {
        let mut d = H264Depacketizer::new();

        for round in 0..200 {
            let len = rand::random_range(3..3000usize);
            let mut nal: Vec<u8> = (0..len).map(|_| rand::random::<u8>()).collect();
            // Keep F clear and pick a slice type so the unit is a real NAL.
            nal[0] = 0x60 | if round % 2 == 0 { NAL_TYPE_IDR } else { 1 };

            let pieces = rand::random_range(1..=len.min(64));
            let mut cuts: Vec<usize> = (1..pieces)
                .map(|_| rand::random_range(1..len - 1))
                .collect();
            cuts.sort_unstable();

            let out = feed(&mut d, &fragment(&nal, &cuts));
            assert_eq!(out.len(), 1, "round {round}: exactly one unit");
            assert_eq!(&out[0][..4], &[0, 0, 0, 1]);
            assert_eq!(&out[0][4..], &nal[..], "round {round}: bytes differ");
        }
    }

    #[test]
    fn reset_drops_partial_unit() {
        let mut d = H264Depacketizer::new();
        let packets = fragment(&[0x65, 1, 2, 3, 4], &[2]);
        assert!(d.depacketize(&packets[0]).is_none());
        d.reset();
        assert!(d.depacketize(&packets[1]).is_none());
    }
}
