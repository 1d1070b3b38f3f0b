//! Noise mode byte shaping
//!
//! The noise channel's envelope and length counter are the shared units; what
//! is specific to it is the mode byte of Cache word 3 (`M0SSffff`). The two
//! `SS` bits pick one of the synthesizer's short-mode noise variants and are
//! drawn from a 64-bit LCG that advances only when short mode is switched on.

/// LCG driving the short-mode variant selector
#[derive(Debug, Clone, Copy)]
pub struct NoiseShaper {
    lcg: u64,
}

const LCG_MULTIPLIER: u64 = 6_364_136_223_846_793_005;

impl NoiseShaper {
    /// Create a shaper from a power-on seed
    pub fn new(seed: u64) -> Self {
        NoiseShaper { lcg: seed }
    }

    /// Compute the new mode byte for a mode/period register write.
    ///
    /// The generator advances only on a 0→1 edge of the mode bit, after the
    /// variant bits for this write have been taken.
    pub fn mode_byte(&mut self, previous: u8, value: u8) -> u8 {
        let next = (value & 0x8F) | ((self.lcg >> 32) as u8 & 0x30);
        if (previous ^ next) & next & 0x80 != 0 {
            self.lcg = self.lcg.wrapping_mul(LCG_MULTIPLIER).wrapping_add(1);
        }
        next
    }

    /// Raw generator state
    pub fn state(&self) -> u64 {
        self.lcg
    }
}
