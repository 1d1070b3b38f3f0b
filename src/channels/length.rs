//! Length Counters
//!
//! One 8-bit down-counter per length-gated channel (pulse 0, pulse 1,
//! triangle, noise). Reaching zero silences the channel.

use crate::tables::length_for;

/// The four channel length counters
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthCounters {
    counters: [u8; 4],
}

impl LengthCounters {
    /// All counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload a counter from the length table using a period-high register value
    pub fn load(&mut self, channel: usize, register_value: u8) {
        self.counters[channel] = length_for(register_value);
    }

    /// Force a counter to zero. Returns whether it was running.
    pub fn clear(&mut self, channel: usize) -> bool {
        let was_running = self.counters[channel] != 0;
        self.counters[channel] = 0;
        was_running
    }

    /// Half-frame clock for one channel. Returns `true` on the clock that
    /// reaches zero.
    pub fn clock(&mut self, channel: usize, halted: bool) -> bool {
        let counter = &mut self.counters[channel];
        if halted || *counter == 0 {
            return false;
        }
        *counter -= 1;
        *counter == 0
    }

    /// Current counter value
    pub fn get(&self, channel: usize) -> u8 {
        self.counters[channel]
    }
}
