//! Parameter FIFO Synchronizer
//!
//! Keeps the register-derived synthesizer parameters in three layers:
//!
//! - **Cache**: four 32-bit words updated immediately on every register
//!   write or sequencer clock.
//! - **Pending**: four 16-bit words recomputed from the Cache on every sync;
//!   the value the synthesizer will see for the current sample.
//! - **Committed**: slots already handed to the synthesizer sink.
//!
//! All changes that resolve to the same output sample coalesce into one
//! Pending value. When a sync lands on a later sample, the Pending value and
//! the staged control bits are committed for the earlier sample first.

use log::trace;

use crate::channels::{sweep::sweep_overflows, MUTE_THRESHOLD, PULSE0, PULSE1, VOLUME_MASK};
use crate::registers::StatusFlags;
use crate::sink::{CommittedSlot, ControlBits, SynthSink};
use crate::tables::{INITIAL_FIFO_CURSOR, SLOT_MASK};

/// Noise volume bits cleared from word 2 while the noise channel is inactive
const NOISE_VOLUME_CLEAR: u16 = 0xFFF0;

/// Coalescing write-behind state
#[derive(Debug, Clone)]
pub struct ParameterFifo {
    cache: [u32; 4],
    pending: [u32; 4],
    control: ControlBits,
    cursor: u16,
    pending_sample: u16,
}

impl ParameterFifo {
    /// Zeroed Cache and Pending, write cursor at the middle of the FIFO
    pub fn new() -> Self {
        ParameterFifo {
            cache: [0; 4],
            pending: [0; 4],
            control: ControlBits::empty(),
            cursor: INITIAL_FIFO_CURSOR,
            pending_sample: 0,
        }
    }

    /// Cache words
    pub fn cache(&self) -> &[u32; 4] {
        &self.cache
    }

    /// Mutable Cache words
    pub fn cache_mut(&mut self) -> &mut [u32; 4] {
        &mut self.cache
    }

    /// Replace the volume nibble of a Cache word
    pub fn set_volume(&mut self, word: usize, volume: u8) {
        self.cache[word] = (self.cache[word] & !VOLUME_MASK) | (volume as u32 & VOLUME_MASK);
    }

    /// Pending words as they would be committed
    pub fn pending(&self) -> [u16; 4] {
        self.pending.map(|w| w as u16)
    }

    /// Sample index the Pending value belongs to
    pub fn pending_sample(&self) -> u16 {
        self.pending_sample
    }

    /// Control bits staged for the pending sample
    pub fn staged_control(&self) -> ControlBits {
        self.control
    }

    /// Last FIFO slot written
    pub fn cursor(&self) -> u16 {
        self.cursor
    }

    /// Stage control bits for the pending sample
    pub fn stage(&mut self, bits: ControlBits) {
        self.control |= bits;
    }

    /// Synchronize at output sample `sample`.
    ///
    /// Commits the previous Pending value if `sample` moved on, then
    /// recomputes Pending from the Cache applying the output muting rules:
    /// inactive channels, pulse periods under 8, and sweep targets that
    /// overflow the 11-bit period.
    pub fn sync<S: SynthSink + ?Sized>(
        &mut self,
        sample: u16,
        status: StatusFlags,
        sweep_multipliers: [i32; 2],
        sink: &mut S,
    ) {
        if sample != self.pending_sample {
            self.cursor = (self.cursor + 1) & SLOT_MASK;
            let slot = CommittedSlot {
                cursor: self.cursor,
                sample_index: self.pending_sample,
                words: self.pending(),
                control: self.control,
            };
            trace!(
                "commit slot {} @ sample {}: {:04X?} {:?}",
                slot.cursor,
                slot.sample_index,
                slot.words,
                slot.control
            );
            sink.write_slot(&slot);
            self.control = ControlBits::empty();
            self.pending_sample = sample;
        }

        let mut pulses = [self.cache[PULSE0], self.cache[PULSE1]];
        for (channel, word) in pulses.iter_mut().enumerate() {
            if !status.contains(StatusFlags::channel(channel)) || *word <= MUTE_THRESHOLD {
                *word = 0;
            }
            if sweep_overflows(*word, sweep_multipliers[channel]) {
                *word = 0;
            }
        }

        let mut shared = self.cache[2];
        if !status.contains(StatusFlags::NOISE) {
            shared &= NOISE_VOLUME_CLEAR as u32;
        }

        self.pending = [pulses[0], pulses[1], shared, self.cache[3]];
        self.control |= ControlBits::INC_READ;
    }
}

impl Default for ParameterFifo {
    fn default() -> Self {
        Self::new()
    }
}
