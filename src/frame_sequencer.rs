//! Frame Sequencer Scheduling
//!
//! Tracks when the next sequencer tick is due. The step period is kept in
//! half CPU cycles so the fractional NTSC/PAL periods accumulate exactly; a
//! one-bit divider carries the odd half cycle between steps.
//!
//! Clocking the channel units on a tick is the engine's job. This type only
//! owns the step counter, the mode bits, and the schedule.

use bitflags::bitflags;

bitflags! {
    /// Frame counter register ($4017) bits 6-7
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SequencerMode: u8 {
        /// Suppress the frame interrupt
        const IRQ_INHIBIT = 0x01;
        /// Five-step sequence (one padding step after the fourth tick)
        const FIVE_STEP = 0x02;
    }
}

/// Frame sequencer state
#[derive(Debug, Clone, Copy)]
pub struct FrameSequencer {
    step: u8,
    mode: SequencerMode,
    period: u32,
    divider: u32,
    next_timestamp: u32,
}

impl FrameSequencer {
    /// Power-on sequencer with a step period in half cycles
    pub fn new(period: u32) -> Self {
        FrameSequencer {
            step: 0,
            mode: SequencerMode::empty(),
            period,
            divider: 1,
            next_timestamp: 0,
        }
    }

    /// Return to the power-on state (first tick due at timestamp 0)
    pub fn power(&mut self) {
        *self = Self::new(self.period);
    }

    /// Whether a tick is due at `timestamp`
    pub fn due(&self, timestamp: u32) -> bool {
        timestamp >= self.next_timestamp
    }

    /// Timestamp of the next tick
    pub fn next_timestamp(&self) -> u32 {
        self.next_timestamp
    }

    /// Current step (0..4)
    pub fn step(&self) -> u8 {
        self.step
    }

    /// Mode bits from the last frame counter write
    pub fn mode(&self) -> SequencerMode {
        self.mode
    }

    /// Whether the current step clocks length counters and sweeps
    pub fn is_half_frame(&self) -> bool {
        self.step & 1 == 0
    }

    /// Move the schedule forward by one step period
    pub fn advance_schedule(&mut self) {
        self.divider += self.period;
        self.next_timestamp = self.next_timestamp.wrapping_add(self.divider >> 1);
        self.divider &= 1;
    }

    /// Finish the current tick and move to the next step.
    ///
    /// Returns `true` when the tick raises the frame interrupt (fourth step
    /// of the four-step sequence without inhibit). The five-step sequence
    /// pads its fourth step with one extra period instead.
    pub fn finish_step(&mut self) -> bool {
        let mut irq = false;
        if self.step == 3 {
            irq = self.mode.is_empty();
            if self.mode.contains(SequencerMode::FIVE_STEP) {
                self.advance_schedule();
            }
        }
        self.step = (self.step + 1) & 3;
        irq
    }

    /// Reset the step counter ahead of a frame counter write
    pub fn reset_step(&mut self) {
        self.step = 0;
    }

    /// Restart the schedule from a frame counter write at `timestamp`
    pub fn restart(&mut self, timestamp: u32, value: u8) {
        self.divider = self.period + 1;
        self.next_timestamp = timestamp.wrapping_add(self.divider >> 1);
        self.divider &= 1;
        self.mode = SequencerMode::from_bits_truncate(value >> 6);
    }

    /// Subtract a rebase adjustment from the scheduled tick
    pub fn rebase(&mut self, adjustment: u32) {
        self.next_timestamp = self.next_timestamp.wrapping_sub(adjustment);
    }
}
