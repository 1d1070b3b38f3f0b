//! Video frame clock
//!
//! Splits the producer's CPU clock into video frames. Each frame is delivered
//! as two halves: the engine is force-updated at the end of the first half and
//! synchronized (with backpressure and rebase) at the end of the second.
//!
//! NTSC frames are 341 * 262 / 3 CPU cycles with every other frame one PPU
//! dot short; PAL frames are 341 * 312 / 3.2. The fractional remainders carry
//! from half to half so no cycle is ever lost.

use crate::config::Region;

const NTSC_HALF_DOTS: u32 = 341 * 131;
const PAL_HALF_DOTS_X5: u32 = 341 * 5 * 156;

/// Per-frame CPU cycle budget generator
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    region: Region,
    fraction: u32,
    short_frame: bool,
}

impl FrameClock {
    /// Clock at power-on
    pub fn new(region: Region) -> Self {
        FrameClock {
            region,
            fraction: 0,
            short_frame: false,
        }
    }

    /// CPU cycles in each half of the next video frame
    pub fn next_frame(&mut self) -> [u32; 2] {
        self.short_frame = !self.short_frame;
        let mut halves = [0; 2];
        for (index, half) in halves.iter_mut().enumerate() {
            *half = match self.region {
                Region::Ntsc => {
                    let skipped = u32::from(self.short_frame && index == 0);
                    self.fraction += NTSC_HALF_DOTS - skipped;
                    let cycles = self.fraction / 3;
                    self.fraction %= 3;
                    cycles
                }
                Region::Pal => {
                    self.fraction += PAL_HALF_DOTS_X5;
                    let cycles = self.fraction >> 4;
                    self.fraction &= 0x0F;
                    cycles
                }
            };
        }
        halves
    }

    /// Timing region
    pub fn region(&self) -> Region {
        self.region
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ntsc_alternating_frames() {
        let mut clock = FrameClock::new(Region::Ntsc);
        assert_eq!(clock.next_frame(), [14890, 14890]);
        assert_eq!(clock.next_frame(), [14890, 14891]);
    }

    #[test]
    fn test_average_frame_length() {
        for (region, expected) in [(Region::Ntsc, 29_780.5), (Region::Pal, 33_247.5)] {
            let mut clock = FrameClock::new(region);
            let frames = 600;
            let total: u64 = (0..frames)
                .map(|_| clock.next_frame().iter().map(|&c| c as u64).sum::<u64>())
                .sum();
            assert_relative_eq!(total as f64 / frames as f64, expected, epsilon = 0.01);
        }
    }
}
