//! Triangle Channel
//!
//! Holds the triangle's 11-bit period, its linear counter and the delayed
//! period update: the audible period (and silence) changes
//! [`TRIANGLE_UPDATE_DELAY`] cycles after the event that caused it.

use crate::tables::TRIANGLE_UPDATE_DELAY;

/// Triangle channel state
#[derive(Debug, Clone, Copy, Default)]
pub struct Triangle {
    period: u16,
    control: u8,
    linear: u8,
    linear_reload: bool,
    update_delay: i32,
    update_prev_timestamp: u32,
}

impl Triangle {
    /// Create a silent triangle
    pub fn new() -> Self {
        Self::default()
    }

    /// Power-on reset. The delay tracker keeps its timestamp.
    pub fn power(&mut self) {
        *self = Triangle {
            update_prev_timestamp: self.update_prev_timestamp,
            ..Self::default()
        };
    }

    /// Apply the control register (`CRRRRRRR`: halt/control, linear reload value)
    pub fn write_control(&mut self, value: u8) {
        self.control = value;
    }

    /// Apply the period-low register
    pub fn write_period_lo(&mut self, value: u8) {
        self.period = (self.period & 0x0700) | value as u16;
        self.arm_update();
    }

    /// Apply the period-high register (length index handled by the caller)
    pub fn write_period_hi(&mut self, value: u8) {
        self.period = (self.period & 0x00FF) | (((value & 0x07) as u16) << 8);
        self.arm_update();
        self.linear_reload = true;
    }

    /// Schedule a Cache update [`TRIANGLE_UPDATE_DELAY`] cycles from now
    pub fn arm_update(&mut self) {
        self.update_delay = TRIANGLE_UPDATE_DELAY;
    }

    /// Quarter-frame clock of the linear counter
    pub fn clock_linear(&mut self) {
        if self.linear_reload {
            let reload = self.control & 0x7F;
            if (self.linear != 0) != (reload != 0) {
                self.arm_update();
            }
            self.linear = reload;
        } else if self.linear != 0 {
            self.linear -= 1;
            if self.linear == 0 {
                self.arm_update();
            }
        }

        if !self.halted() {
            self.linear_reload = false;
        }
    }

    /// Advance the delay tracker to `timestamp`. Returns the exact timestamp
    /// at which a pending update landed, if it landed in this interval.
    pub fn advance(&mut self, timestamp: u32) -> Option<u32> {
        let mut landed = None;
        if self.update_delay > 0 {
            let elapsed = timestamp.wrapping_sub(self.update_prev_timestamp) as i64;
            let remaining = self.update_delay as i64 - elapsed;
            if remaining <= 0 {
                landed = Some((timestamp as i64 + remaining) as u32);
                self.update_delay = 0;
            } else {
                self.update_delay = remaining as i32;
            }
        }
        self.update_prev_timestamp = timestamp;
        landed
    }

    /// Period field for Cache word 2, zero when the channel is silent
    pub fn cache_period(&self, length_active: bool) -> u32 {
        if length_active && self.linear != 0 {
            (self.period as u32) << 4
        } else {
            0
        }
    }

    /// Length counter halt / linear counter control flag
    pub fn halted(&self) -> bool {
        self.control & 0x80 != 0
    }

    /// 11-bit period
    pub fn period(&self) -> u16 {
        self.period
    }

    /// Linear counter value
    pub fn linear(&self) -> u8 {
        self.linear
    }

    /// Whether the linear counter reloads on the next clock
    pub fn linear_reload_pending(&self) -> bool {
        self.linear_reload
    }

    /// Cycles left before a pending update lands (0 when idle)
    pub fn update_delay(&self) -> i32 {
        self.update_delay.max(0)
    }

    /// Timestamp the delay tracker last advanced to
    pub fn tracked_timestamp(&self) -> u32 {
        self.update_prev_timestamp
    }

    /// Subtract a rebase adjustment from the stored timestamp
    pub fn rebase(&mut self, adjustment: u32) {
        self.update_prev_timestamp = self.update_prev_timestamp.wrapping_sub(adjustment);
    }
}
