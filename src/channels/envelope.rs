//! Envelope Generator
//!
//! One per pulse channel and one for noise. Produces either a constant volume
//! or a 15→0 decay that optionally loops, clocked by the frame sequencer.

use bitflags::bitflags;

bitflags! {
    /// Envelope mode bits (register bits 4-5)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EnvelopeMode: u8 {
        /// Output the period value as a constant volume
        const CONSTANT = 0x01;
        /// Wrap the decay back to 15; doubles as length-counter halt
        const LOOP = 0x02;
    }
}

/// Envelope generator state
#[derive(Debug, Clone, Copy, Default)]
pub struct Envelope {
    period: u8,
    divider: i8,
    level: u8,
    mode: EnvelopeMode,
    reload: bool,
}

impl Envelope {
    /// Create a silent envelope
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a control register write (`--LCVVVV`)
    pub fn write_control(&mut self, value: u8) {
        self.period = value & 0x0F;
        self.mode = EnvelopeMode::from_bits_truncate(value >> 4);
    }

    /// Request a restart on the next sequencer clock
    pub fn restart(&mut self) {
        self.reload = true;
    }

    /// Clock from the frame sequencer
    pub fn clock(&mut self) {
        if self.reload {
            self.level = 0x0F;
            self.divider = self.period as i8;
            self.reload = false;
            return;
        }

        self.divider -= 1;
        if self.divider < 0 {
            self.divider = self.period as i8;
            if self.level != 0 || self.mode.contains(EnvelopeMode::LOOP) {
                self.level = self.level.wrapping_sub(1) & 0x0F;
            }
        }
    }

    /// Current 4-bit output volume
    pub fn volume(&self) -> u8 {
        if self.mode.contains(EnvelopeMode::CONSTANT) {
            self.period
        } else {
            self.level
        }
    }

    /// Whether the channel's length counter is halted
    pub fn halts_length(&self) -> bool {
        self.mode.contains(EnvelopeMode::LOOP)
    }

    /// Decay level regardless of mode
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Whether a restart is pending
    pub fn reload_pending(&self) -> bool {
        self.reload
    }

    /// Current mode bits
    pub fn mode(&self) -> EnvelopeMode {
        self.mode
    }
}
