//! Pulse Sweep Unit
//!
//! Periodically adjusts a pulse channel's period by a shifted copy of itself.
//! The shift is expressed as a fixed-point multiplier (see
//! [`SWEEP_MULTIPLIERS`]) applied directly to the packed Cache word, so all
//! arithmetic here works on `period << 4 | volume` words.

use super::{MUTE_THRESHOLD, PERIOD_MASK};
use crate::tables::SWEEP_MULTIPLIERS;

/// Sweep unit state for one pulse channel
#[derive(Debug, Clone, Copy)]
pub struct Sweep {
    period: u8,
    divider: i8,
    enabled: bool,
    multiplier: i32,
    reload: bool,
}

impl Sweep {
    /// Create a disabled sweep with the shift-0 multiplier
    pub fn new() -> Self {
        Sweep {
            period: 0,
            divider: 0,
            enabled: false,
            multiplier: SWEEP_MULTIPLIERS[0],
            reload: false,
        }
    }

    /// Apply a sweep register write (`EPPPNSSS`)
    pub fn write(&mut self, value: u8) {
        self.multiplier = SWEEP_MULTIPLIERS[(value & 0x0F) as usize];
        self.period = (value >> 4) & 0x07;
        // Enabled only with a non-zero shift
        self.enabled = (value & 0x87) > 0x80;
        self.reload = true;
    }

    /// Half-frame clock. `word` is the channel's Cache word.
    pub fn clock(&mut self, word: &mut u32, channel: usize) {
        self.divider -= 1;
        if self.divider < 0 {
            self.divider = self.period as i8;
            if self.enabled && *word > MUTE_THRESHOLD {
                *word = sweep_step(*word, self.multiplier, channel);
            }
        }

        if self.reload {
            self.divider = self.period as i8;
            self.reload = false;
        }
    }

    /// Signed multiplier in 1/256 units
    pub fn multiplier(&self) -> i32 {
        self.multiplier
    }

    /// Whether the unit adjusts the period when its divider expires
    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for Sweep {
    fn default() -> Self {
        Self::new()
    }
}

fn scaled_delta(word: u32, magnitude: u32) -> u32 {
    ((word & PERIOD_MASK).wrapping_mul(magnitude) >> 8) & PERIOD_MASK
}

/// Apply one sweep adjustment to a Cache word.
///
/// Negative sweeps subtract the delta, plus one extra period unit on channel 0
/// (ones' complement negate). Positive sweeps that would carry into bit 15 are
/// discarded and leave the word unchanged.
pub fn sweep_step(word: u32, multiplier: i32, channel: usize) -> u32 {
    if multiplier < 0 {
        let delta = scaled_delta(word, multiplier.unsigned_abs());
        let ones_complement = if channel == 0 { 0x10 } else { 0 };
        word.wrapping_sub(delta + ones_complement)
    } else {
        let result = word.wrapping_add(scaled_delta(word, multiplier as u32)) as i16;
        if result >= 0 {
            result as u32
        } else {
            word
        }
    }
}

/// Whether the sweep target of a Cache word overflows the 11-bit period,
/// which mutes the channel whether or not the sweep is enabled.
///
/// The multiplier is applied as a wrapping unsigned product so that negative
/// multipliers produce the same truncation the hardware comparison sees.
pub fn sweep_overflows(word: u32, multiplier: i32) -> bool {
    let delta = ((word & PERIOD_MASK).wrapping_mul(multiplier as u32) >> 8) & PERIOD_MASK;
    (word.wrapping_add(delta) as i16) < 0
}
