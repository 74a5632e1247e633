//! Fragmentation-unit reassembly shared by the H.264 and H.265 depacketizers.

use super::START_CODE;

/// Upper bound on fragments per NAL unit. Hitting it means the end fragment
/// was lost and the pending unit can never complete.
pub const MAX_FRAGMENTS: usize = 1024;

/// Accumulates FU payloads into one Annex-B NAL unit.
#[derive(Debug, Default)]
pub struct FuAssembler {
    buf: Vec<u8>,
    fragments: usize,
    pending: bool,
}

impl FuAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Begin a new unit with its reconstructed NAL header.
    ///
    /// An unfinished previous unit is discarded.
    pub fn start(&mut self, nal_header: &[u8], data: &[u8]) {
        if self.pending {
            tracing::warn!(
                fragments = self.fragments,
                "start fragment before end of previous unit, discarding it"
            );
        }
        self.buf.clear();
        self.buf.extend_from_slice(&START_CODE);
        self.buf.extend_from_slice(nal_header);
        self.buf.extend_from_slice(data);
        self.fragments = 1;
        self.pending = true;
    }

    /// Append a middle fragment. Returns `false` when it was dropped.
    pub fn append(&mut self, data: &[u8]) -> bool {
        if !self.pending {
            tracing::warn!("middle fragment without start fragment, dropping");
            return false;
        }
        self.fragments += 1;
        if self.fragments > MAX_FRAGMENTS {
            tracing::error!(
                max = MAX_FRAGMENTS,
                "too many fragments without end fragment, discarding unit"
            );
            self.reset();
            return false;
        }
        self.buf.extend_from_slice(data);
        true
    }

    /// Append the end fragment and hand out the complete unit.
    pub fn finish(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        if !self.pending {
            tracing::warn!("end fragment without start fragment, dropping");
            return None;
        }
        self.buf.extend_from_slice(data);
        let unit = std::mem::take(&mut self.buf);
        tracing::trace!(
            fragments = self.fragments + 1,
            size = unit.len(),
            "fragmented unit reassembled"
        );
        self.fragments = 0;
        self.pending = false;
        Some(unit)
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.fragments = 0;
        self.pending = false;
    }
}
