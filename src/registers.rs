//! APU Register Definitions
//!
//! The producer addresses the APU through the 0x00-0x17 window (0x4000-0x4017
//! on the CPU bus). Each register feeds one channel unit, the DMC, the shared
//! length-enable latch, or the frame sequencer.

use bitflags::bitflags;
use std::fmt;

/// APU register address (offset from 0x4000)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// Pulse 0 duty, length halt, constant volume, envelope period - $4000
    Pulse0Control = 0x00,
    /// Pulse 0 sweep unit - $4001
    Pulse0Sweep = 0x01,
    /// Pulse 0 period (low byte) - $4002
    Pulse0PeriodLo = 0x02,
    /// Pulse 0 period (high 3 bits) and length index - $4003
    Pulse0PeriodHi = 0x03,
    /// Pulse 1 duty, length halt, constant volume, envelope period - $4004
    Pulse1Control = 0x04,
    /// Pulse 1 sweep unit - $4005
    Pulse1Sweep = 0x05,
    /// Pulse 1 period (low byte) - $4006
    Pulse1PeriodLo = 0x06,
    /// Pulse 1 period (high 3 bits) and length index - $4007
    Pulse1PeriodHi = 0x07,
    /// Triangle length halt / linear counter reload value - $4008
    TriangleControl = 0x08,
    /// Triangle period (low byte) - $400A
    TrianglePeriodLo = 0x0A,
    /// Triangle period (high 3 bits) and length index - $400B
    TrianglePeriodHi = 0x0B,
    /// Noise length halt, constant volume, envelope period - $400C
    NoiseControl = 0x0C,
    /// Noise mode and period index - $400E
    NoisePeriod = 0x0E,
    /// Noise length index - $400F
    NoiseLength = 0x0F,
    /// DMC IRQ enable, loop, rate index - $4010
    DmcControl = 0x10,
    /// DMC direct PCM level - $4011
    DmcLevel = 0x11,
    /// DMC sample start address - $4012
    DmcAddress = 0x12,
    /// DMC sample length - $4013
    DmcLength = 0x13,
    /// Channel length-counter enables / status - $4015
    Status = 0x15,
    /// Frame sequencer mode and IRQ inhibit - $4017
    FrameCounter = 0x17,
}

impl Register {
    /// Decode a register offset (masked to 5 bits). Holes in the map
    /// (0x09, 0x0D, 0x14, 0x16) and 0x18-0x1F return `None`.
    pub fn from_addr(addr: u16) -> Option<Self> {
        match addr & 0x1F {
            0x00 => Some(Register::Pulse0Control),
            0x01 => Some(Register::Pulse0Sweep),
            0x02 => Some(Register::Pulse0PeriodLo),
            0x03 => Some(Register::Pulse0PeriodHi),
            0x04 => Some(Register::Pulse1Control),
            0x05 => Some(Register::Pulse1Sweep),
            0x06 => Some(Register::Pulse1PeriodLo),
            0x07 => Some(Register::Pulse1PeriodHi),
            0x08 => Some(Register::TriangleControl),
            0x0A => Some(Register::TrianglePeriodLo),
            0x0B => Some(Register::TrianglePeriodHi),
            0x0C => Some(Register::NoiseControl),
            0x0E => Some(Register::NoisePeriod),
            0x0F => Some(Register::NoiseLength),
            0x10 => Some(Register::DmcControl),
            0x11 => Some(Register::DmcLevel),
            0x12 => Some(Register::DmcAddress),
            0x13 => Some(Register::DmcLength),
            0x15 => Some(Register::Status),
            0x17 => Some(Register::FrameCounter),
            _ => None,
        }
    }

    /// Get the register offset
    pub fn addr(&self) -> u16 {
        *self as u16
    }

    /// Pulse channel index (0 or 1) for pulse registers
    pub fn pulse_index(&self) -> Option<usize> {
        match self.addr() {
            0x00..=0x03 => Some(0),
            0x04..=0x07 => Some(1),
            _ => None,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Register::Pulse0Control => "Pulse 0 Control",
            Register::Pulse0Sweep => "Pulse 0 Sweep",
            Register::Pulse0PeriodLo => "Pulse 0 Period Low",
            Register::Pulse0PeriodHi => "Pulse 0 Period High",
            Register::Pulse1Control => "Pulse 1 Control",
            Register::Pulse1Sweep => "Pulse 1 Sweep",
            Register::Pulse1PeriodLo => "Pulse 1 Period Low",
            Register::Pulse1PeriodHi => "Pulse 1 Period High",
            Register::TriangleControl => "Triangle Control",
            Register::TrianglePeriodLo => "Triangle Period Low",
            Register::TrianglePeriodHi => "Triangle Period High",
            Register::NoiseControl => "Noise Control",
            Register::NoisePeriod => "Noise Period",
            Register::NoiseLength => "Noise Length",
            Register::DmcControl => "DMC Control",
            Register::DmcLevel => "DMC Level",
            Register::DmcAddress => "DMC Address",
            Register::DmcLength => "DMC Length",
            Register::Status => "Status",
            Register::FrameCounter => "Frame Counter",
        };
        write!(f, "${:04X} ({name})", 0x4000 + self.addr())
    }
}

bitflags! {
    /// Status register ($4015) bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatusFlags: u8 {
        /// Pulse 0 length counter active
        const PULSE0 = 0x01;
        /// Pulse 1 length counter active
        const PULSE1 = 0x02;
        /// Triangle length counter active
        const TRIANGLE = 0x04;
        /// Noise length counter active
        const NOISE = 0x08;
        /// DMC sample bytes remaining
        const DMC = 0x10;
        /// Frame sequencer interrupt
        const FRAME_IRQ = 0x40;
        /// DMC end-of-sample interrupt
        const DMC_IRQ = 0x80;
    }
}

impl StatusFlags {
    /// Status bit for a length-counter channel (0=pulse 0 .. 3=noise)
    pub fn channel(index: usize) -> Self {
        StatusFlags::from_bits_truncate(1 << index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_conversion() {
        assert_eq!(Register::from_addr(0x00), Some(Register::Pulse0Control));
        assert_eq!(Register::from_addr(0x0B), Some(Register::TrianglePeriodHi));
        assert_eq!(Register::from_addr(0x17), Some(Register::FrameCounter));
        assert_eq!(Register::from_addr(0x09), None);
        assert_eq!(Register::from_addr(0x14), None);
        assert_eq!(Register::from_addr(0x16), None);
    }

    #[test]
    fn test_pulse_index() {
        assert_eq!(Register::Pulse0PeriodHi.pulse_index(), Some(0));
        assert_eq!(Register::Pulse1Sweep.pulse_index(), Some(1));
        assert_eq!(Register::NoiseControl.pulse_index(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Register::Status.to_string(), "$4015 (Status)");
    }

    #[test]
    fn test_status_channel_bits() {
        assert_eq!(StatusFlags::channel(0), StatusFlags::PULSE0);
        assert_eq!(StatusFlags::channel(2), StatusFlags::TRIANGLE);
        assert_eq!(StatusFlags::channel(3), StatusFlags::NOISE);
    }
}
