//! Timestamp Domain Bridge
//!
//! Converts producer CPU-cycle timestamps into consumer sample indices with a
//! 32-bit fixed-point product, and rebases stored timestamps once per video
//! frame so they never grow without bound.
//!
//! The product is allowed to wrap: `(timestamp * scale + offset) >> 21` keeps
//! the low 11 bits of the true sample index, which is exactly the slot index
//! in the synthesizer's 2048-entry buffers. Subtracting a whole multiple of
//! 2^21 from the timestamp and adding `multiple * scale` to the offset leaves
//! every index unchanged.

use crate::config::Region;
use crate::tables::SAMPLE_FRACTION_BITS;

const WHOLE_MASK: u32 = !((1 << SAMPLE_FRACTION_BITS) - 1);

/// Cycle-to-sample converter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampBridge {
    scale: u32,
    offset: u32,
}

impl TimestampBridge {
    /// Bridge for a timing region with zero offset
    pub fn new(region: Region) -> Self {
        Self::with_scale(region.time_scale())
    }

    /// Bridge with an explicit fixed-point scale
    pub fn with_scale(scale: u32) -> Self {
        TimestampBridge { scale, offset: 0 }
    }

    /// Sample index (modulo the slot count) for a producer timestamp
    pub fn sample_index(&self, timestamp: u32) -> u16 {
        (timestamp.wrapping_mul(self.scale).wrapping_add(self.offset) >> SAMPLE_FRACTION_BITS)
            as u16
    }

    /// Fold the whole-2^21 part of `timestamp` into the offset.
    ///
    /// Returns the adjustment every stored absolute timestamp (and the
    /// producer's own clock) must subtract.
    pub fn rebase(&mut self, timestamp: u32) -> u32 {
        let adjustment = timestamp & WHOLE_MASK;
        self.offset = self
            .offset
            .wrapping_add(adjustment.wrapping_mul(self.scale));
        adjustment
    }

    /// Fixed-point scale (21 fractional bits)
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Accumulated offset
    pub fn offset(&self) -> u32 {
        self.offset
    }
}
