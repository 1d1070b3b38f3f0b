//! Delta Modulation Channel
//!
//! Plays 1-bit delta-encoded samples fetched from CPU memory. Each bit period
//! nudges a 7-bit output level up or down by 2; the resulting level changes
//! are emitted as a per-sample PCM delta stream through the synthesizer sink.
//!
//! The player is lazy: nothing happens until an entry point calls
//! [`DeltaModulation::run`] with the current timestamp, at which point every
//! bit period that has elapsed is replayed at its exact timestamp.

use log::debug;

use crate::config::Region;
use crate::memory::SampleMemory;
use crate::registers::StatusFlags;
use crate::sink::SynthSink;
use crate::tables::DMC_SAMPLE_BASE;
use crate::timebase::TimestampBridge;

/// Control bit: raise the DMC interrupt when a sample ends
pub const CONTROL_IRQ: u8 = 0x80;
/// Control bit: restart the sample when it ends
pub const CONTROL_LOOP: u8 = 0x40;

/// Next sample fetch address after `addr`. Wraps from 0xFFFF to 0x8000.
pub fn advance_address(addr: u16) -> u16 {
    addr.wrapping_add(1) | 0x8000
}

/// Collaborators the player touches while catching up
pub struct DmcBus<'a, M: ?Sized, S: ?Sized> {
    /// Sample source
    pub memory: &'a M,
    /// Timestamp to sample-index conversion
    pub bridge: &'a TimestampBridge,
    /// PCM delta destination
    pub sink: &'a mut S,
    /// Status register (DMC active and interrupt bits)
    pub status: &'a mut StatusFlags,
    /// Length-enable register value (bit 4 gates looping)
    pub enables: u8,
}

/// DMC player state and PCM delta emitter
#[derive(Debug, Clone)]
pub struct DeltaModulation {
    periods: &'static [u16; 16],
    period: u32,
    control: u8,
    start_address: u8,
    start_length: u8,
    address: u16,
    bytes_remaining: u16,
    bits_remaining: u8,
    shifter: u8,
    next_timestamp: Option<u32>,
    end_timestamp: Option<u32>,
    level: u8,
    staged_delta: u8,
    last_sample_index: u16,
}

impl DeltaModulation {
    /// Idle player using the region's rate table
    pub fn new(region: Region) -> Self {
        Self::idle(region.dmc_periods())
    }

    fn idle(periods: &'static [u16; 16]) -> Self {
        DeltaModulation {
            periods,
            period: periods[0] as u32,
            control: 0,
            start_address: 0,
            start_length: 0,
            address: 0,
            bytes_remaining: 0,
            bits_remaining: 0,
            shifter: 0,
            next_timestamp: None,
            end_timestamp: None,
            level: 0,
            staged_delta: 0,
            last_sample_index: 0,
        }
    }

    /// Power-on reset. The emitter keeps its last sample index so a delta
    /// written right after power still coalesces correctly.
    pub fn power(&mut self) {
        let last_sample_index = self.last_sample_index;
        *self = Self::idle(self.periods);
        self.last_sample_index = last_sample_index;
    }

    /// Rate/control register write ($4010)
    pub fn write_control(&mut self, value: u8, status: &mut StatusFlags) {
        self.period = self.periods[(value & 0x0F) as usize] as u32;
        self.control = value & (CONTROL_IRQ | CONTROL_LOOP);
        if self.control != CONTROL_IRQ {
            status.remove(StatusFlags::DMC_IRQ);
        }
        self.recalc_end(self.next_timestamp);
    }

    /// Sample address register write ($4012)
    pub fn write_address(&mut self, value: u8) {
        self.start_address = value;
    }

    /// Sample length register write ($4013)
    pub fn write_length(&mut self, value: u8) {
        self.start_length = value;
    }

    /// Enable from the length-enable register. Starts the sample if no
    /// bytes remain.
    pub fn enable(&mut self, timestamp: u32) {
        if self.bytes_remaining == 0 {
            self.load_sample();
            if self.next_timestamp.is_none() {
                self.next_timestamp = Some(timestamp.wrapping_add(self.period >> 1));
            }
            self.recalc_end(self.next_timestamp);
            debug!(
                "DMC start: ${:04X} x {} bytes, period {}",
                self.address, self.bytes_remaining, self.period
            );
        }
    }

    /// Disable from the length-enable register. The bits already in the
    /// shifter still play out, but the sample no longer has an end to reach.
    pub fn disable(&mut self) {
        self.bytes_remaining = 0;
        self.end_timestamp = None;
    }

    fn load_sample(&mut self) {
        self.address = DMC_SAMPLE_BASE + ((self.start_address as u16) << 6);
        self.bytes_remaining = ((self.start_length as u16) << 4) + 1;
    }

    fn recalc_end(&mut self, next: Option<u32>) {
        if let Some(next) = next {
            if self.bytes_remaining != 0 {
                let bits = (self.bytes_remaining as u32 - 1) * 8 + self.bits_remaining as u32;
                self.end_timestamp = Some(next.wrapping_add(bits.wrapping_mul(self.period)));
            }
        }
    }

    /// Replay every bit period due at or before `timestamp`
    pub fn run<M, S>(&mut self, timestamp: u32, bus: &mut DmcBus<'_, M, S>)
    where
        M: SampleMemory + ?Sized,
        S: SynthSink + ?Sized,
    {
        let Some(mut next) = self.next_timestamp else {
            return;
        };
        if timestamp < next {
            return;
        }

        loop {
            let at = next;
            next = next.wrapping_add(self.period);

            if self.bits_remaining == 0 {
                if self.bytes_remaining == 0 {
                    if self.control & CONTROL_LOOP != 0 && bus.enables & 0x10 != 0 {
                        self.load_sample();
                        self.recalc_end(Some(next));
                    } else {
                        self.next_timestamp = None;
                        self.end_timestamp = None;
                        return;
                    }
                }

                self.shifter = bus.memory.read_byte(self.address);
                self.address = advance_address(self.address);
                self.bytes_remaining -= 1;
                self.bits_remaining = 8;

                if self.bytes_remaining == 0 {
                    if self.control & CONTROL_LOOP != 0 {
                        self.load_sample();
                        self.recalc_end(Some(next));
                    } else {
                        debug_assert_eq!(self.end_timestamp, Some(at));
                        bus.status.remove(StatusFlags::DMC);
                        if self.control & CONTROL_IRQ != 0 {
                            bus.status.insert(StatusFlags::DMC_IRQ);
                        }
                        self.end_timestamp = None;
                        debug!("DMC sample end at {at}");
                    }
                }
            }

            let level = if self.shifter & 1 != 0 {
                self.level.wrapping_add(2)
            } else {
                self.level.wrapping_sub(2)
            };
            if level & 0x80 == 0 {
                self.emit_level(at, level, bus.bridge, &mut *bus.sink);
            }

            self.shifter >>= 1;
            self.bits_remaining -= 1;

            if timestamp < next {
                break;
            }
        }

        self.next_timestamp = Some(next);
    }

    /// Record a new output level at `timestamp`.
    ///
    /// Changes landing on the same output sample accumulate, so the entry
    /// written for a sample always reflects its net level change.
    pub fn emit_level<S: SynthSink + ?Sized>(
        &mut self,
        timestamp: u32,
        level: u8,
        bridge: &TimestampBridge,
        sink: &mut S,
    ) {
        let sample = bridge.sample_index(timestamp);
        let mut delta = level.wrapping_sub(self.level);
        if sample == self.last_sample_index {
            delta = delta.wrapping_add(self.staged_delta);
        }
        sink.write_pcm_delta(sample, delta.wrapping_neg());
        self.staged_delta = delta;
        self.last_sample_index = sample;
        self.level = level;
    }

    /// Subtract a rebase adjustment from the scheduled timestamps
    pub fn rebase(&mut self, adjustment: u32) {
        if let Some(next) = self.next_timestamp.as_mut() {
            *next = next.wrapping_sub(adjustment);
        }
        if let Some(end) = self.end_timestamp.as_mut() {
            *end = end.wrapping_sub(adjustment);
        }
    }

    /// Current 7-bit output level
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Next bit-period timestamp, `None` while idle
    pub fn next_timestamp(&self) -> Option<u32> {
        self.next_timestamp
    }

    /// Timestamp the current sample finishes, if known
    pub fn end_timestamp(&self) -> Option<u32> {
        self.end_timestamp
    }

    /// Next fetch address
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Sample bytes not yet fetched
    pub fn bytes_remaining(&self) -> u16 {
        self.bytes_remaining
    }

    /// Bit period in CPU cycles
    pub fn period(&self) -> u32 {
        self.period
    }
}
