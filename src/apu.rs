//! APU parameter engine
//!
//! Ties the channel units, the frame sequencer, the DMC player and the FIFO
//! synchronizer together behind the producer-facing entry points. Every entry
//! point takes the producer's current CPU-cycle timestamp; timestamps must be
//! non-decreasing between rebases.
//!
//! Work is lazy. Sequencer ticks, delayed triangle updates and DMC bit periods
//! that fell due since the last call are replayed at their exact timestamps
//! before the call's own effect is applied, so everything the synthesizer
//! sees is ordered by timestamp.

use log::{debug, trace, warn};
use std::time::{Duration, Instant};

use crate::channels::{
    Envelope, LengthCounters, NoiseShaper, Sweep, Triangle, NOISE, NOISE_ENVELOPE, PULSE0,
    PULSE1, TRIANGLE, WORD_MODE, WORD_TRIANGLE,
};
use crate::config::EngineConfig;
use crate::dmc::{DeltaModulation, DmcBus};
use crate::fifo::ParameterFifo;
use crate::frame_sequencer::FrameSequencer;
use crate::memory::SampleMemory;
use crate::registers::{Register, StatusFlags};
use crate::sink::{ControlBits, SynthSink};
use crate::tables::SLOT_MASK;
use crate::timebase::TimestampBridge;
use crate::Result;

/// Length-enable bit that keeps a looping DMC sample alive
const ENABLE_DMC: u8 = 0x10;

/// APU parameter engine
///
/// `S` receives committed parameter slots and PCM deltas; `M` provides DMC
/// sample bytes.
pub struct Apu<S: SynthSink, M: SampleMemory> {
    config: EngineConfig,
    envelopes: [Envelope; 3],
    sweeps: [Sweep; 2],
    lengths: LengthCounters,
    triangle: Triangle,
    noise: NoiseShaper,
    dmc: DeltaModulation,
    sequencer: FrameSequencer,
    fifo: ParameterFifo,
    bridge: TimestampBridge,
    status: StatusFlags,
    enables: u8,
    last_timestamp: u32,
    sink: S,
    memory: M,
}

impl<S: SynthSink, M: SampleMemory> Apu<S, M> {
    /// Build a powered-on engine. Fails only on an invalid configuration.
    pub fn new(config: EngineConfig, sink: S, memory: M) -> Result<Self> {
        config.validate()?;
        let region = config.region;
        let mut apu = Apu {
            config,
            envelopes: [Envelope::new(); 3],
            sweeps: [Sweep::new(); 2],
            lengths: LengthCounters::new(),
            triangle: Triangle::new(),
            noise: NoiseShaper::new(config.noise_seed),
            dmc: DeltaModulation::new(region),
            sequencer: FrameSequencer::new(region.frame_period()),
            fifo: ParameterFifo::new(),
            bridge: TimestampBridge::new(region),
            status: StatusFlags::empty(),
            enables: 0,
            last_timestamp: 0,
            sink,
            memory,
        };
        apu.power();
        Ok(apu)
    }

    /// Power-on reset of every channel, the status register, the sequencer
    /// and the DMC. The FIFO, the bridge and the sink are left alone.
    pub fn power(&mut self) {
        self.noise = NoiseShaper::new(self.config.noise_seed);
        self.envelopes = [Envelope::new(); 3];
        self.sweeps = [Sweep::new(); 2];
        self.lengths = LengthCounters::new();
        self.enables = 0;
        self.status = StatusFlags::empty();
        self.triangle.power();
        self.dmc.power();
        self.sequencer.power();
        debug!(
            "APU power: {:?}, time scale {}, frame period {} half cycles",
            self.config.region,
            self.bridge.scale(),
            self.config.region.frame_period()
        );
    }

    /// Block until the consumer trails the producer's first sample by
    /// `max_lead_slots` (within the start window), aligning the two before
    /// emulation starts.
    ///
    /// The consumer then needs a full lead's worth of samples to reach the
    /// first committed slot, so no control entry is read before it is written.
    pub fn start_sync(&mut self) {
        let origin = self.fifo.pending_sample();
        let lead = self.config.max_lead_slots;
        let window = self.config.start_sync_window;
        let polls = self.wait_until(|position| {
            (origin.wrapping_sub(position) & SLOT_MASK).wrapping_sub(lead) < window
        });
        debug!("start sync: consumer aligned after {polls} polls");
    }

    /// Register write at `timestamp`. `register` is the offset from 0x4000
    /// (only the low five bits are decoded).
    pub fn write(&mut self, timestamp: u32, register: u16, value: u8) {
        self.enter(timestamp);
        if self.sequencer.due(timestamp) {
            self.run_sequencer(timestamp);
        }
        self.update_triangle(timestamp);

        let Some(reg) = Register::from_addr(register) else {
            warn!("write to unmapped APU register ${register:02X} ignored");
            return;
        };

        match reg {
            Register::Pulse0Control | Register::Pulse1Control => {
                let channel = reg.pulse_index().unwrap_or(PULSE0);
                self.envelopes[channel].write_control(value);
                let cache = self.fifo.cache_mut();
                cache[WORD_MODE] = if channel == PULSE0 {
                    (cache[WORD_MODE] & !0x03) | ((value >> 6) & 0x03) as u32
                } else {
                    (cache[WORD_MODE] & !0x0C) | ((value >> 4) & 0x0C) as u32
                };
                self.refresh_volume(channel);
                self.sync(timestamp);
            }
            Register::Pulse0Sweep | Register::Pulse1Sweep => {
                let channel = reg.pulse_index().unwrap_or(PULSE0);
                self.sweeps[channel].write(value);
                self.sync(timestamp);
            }
            Register::Pulse0PeriodLo | Register::Pulse1PeriodLo => {
                let channel = reg.pulse_index().unwrap_or(PULSE0);
                let word = &mut self.fifo.cache_mut()[channel];
                *word = (*word & 0x700F) | ((value as u32) << 4);
                self.sync(timestamp);
            }
            Register::Pulse0PeriodHi | Register::Pulse1PeriodHi => {
                let channel = reg.pulse_index().unwrap_or(PULSE0);
                let word = &mut self.fifo.cache_mut()[channel];
                *word = (*word & 0x0FFF) | (((value & 0x07) as u32) << 12);
                self.load_length(channel, value);
                self.envelopes[channel].restart();
                self.sync(timestamp);
                // Phase reset belongs to the sample after the one just synced
                self.fifo.stage(ControlBits::phase_reset(channel));
            }
            Register::TriangleControl => self.triangle.write_control(value),
            Register::TrianglePeriodLo => self.triangle.write_period_lo(value),
            Register::TrianglePeriodHi => {
                self.triangle.write_period_hi(value);
                self.load_length(TRIANGLE, value);
            }
            Register::NoiseControl => {
                self.envelopes[NOISE_ENVELOPE].write_control(value);
                self.refresh_volume(NOISE_ENVELOPE);
                self.sync(timestamp);
            }
            Register::NoisePeriod => {
                let cache = self.fifo.cache_mut();
                let previous = (cache[WORD_MODE] >> 8) as u8;
                let mode = self.noise.mode_byte(previous, value);
                cache[WORD_MODE] = (cache[WORD_MODE] & !0xFF00) | ((mode as u32) << 8);
                self.sync(timestamp);
            }
            Register::NoiseLength => {
                self.load_length(NOISE, value);
                self.envelopes[NOISE_ENVELOPE].restart();
                self.sync(timestamp);
            }
            Register::DmcControl => {
                self.run_dmc(timestamp);
                self.dmc.write_control(value, &mut self.status);
            }
            Register::DmcLevel => {
                self.run_dmc(timestamp);
                self.dmc
                    .emit_level(timestamp, value & 0x7F, &self.bridge, &mut self.sink);
            }
            Register::DmcAddress => {
                self.run_dmc(timestamp);
                self.dmc.write_address(value);
            }
            Register::DmcLength => {
                self.run_dmc(timestamp);
                self.dmc.write_length(value);
            }
            Register::Status => {
                self.run_dmc(timestamp);
                self.write_enables(timestamp, value);
                self.sync(timestamp);
            }
            Register::FrameCounter => {
                self.sequencer.reset_step();
                if value & 0x80 != 0 {
                    self.clock_sequencer(timestamp);
                }
                self.sequencer.restart(timestamp, value);
            }
        }
    }

    /// Status register read at `timestamp`. Clears the frame interrupt flag.
    pub fn read_status(&mut self, timestamp: u32) -> u8 {
        self.enter(timestamp);
        if self.sequencer.due(timestamp) {
            self.run_sequencer(timestamp);
        }
        if self
            .dmc
            .end_timestamp()
            .is_some_and(|end| timestamp >= end)
        {
            self.run_dmc(timestamp);
        }

        let value = self.status.bits();
        self.status.remove(StatusFlags::FRAME_IRQ);
        value
    }

    /// Bring every channel up to `timestamp` and flush the FIFO there
    pub fn force_update(&mut self, timestamp: u32) {
        self.enter(timestamp);
        if self.sequencer.due(timestamp) {
            self.run_sequencer(timestamp);
        }
        self.update_triangle(timestamp);
        self.run_dmc(timestamp);
        let level = self.dmc.level();
        self.dmc
            .emit_level(timestamp, level, &self.bridge, &mut self.sink);
        self.sync(timestamp);
    }

    /// Per-video-frame synchronization point.
    ///
    /// Forces an update, waits until the producer leads the consumer by less
    /// than the configured lead, then rebases every stored timestamp. Returns
    /// the adjustment the producer must subtract from its own clock.
    pub fn end_of_frame(&mut self, timestamp: u32) -> u32 {
        self.force_update(timestamp);

        let sample = self.bridge.sample_index(timestamp);
        let max_lead = self.config.max_lead_slots;
        let polls = self.wait_until(|position| sample.wrapping_sub(position) & SLOT_MASK < max_lead);
        if polls > 0 {
            trace!("backpressure: waited {polls} polls for consumer at sample {sample}");
        }

        debug_assert!(self.sequencer.next_timestamp() >= timestamp);
        debug_assert!(self.triangle.tracked_timestamp() >= timestamp);
        debug_assert!(self.dmc.next_timestamp().map_or(true, |next| next >= timestamp));
        debug_assert!(self.dmc.end_timestamp().map_or(true, |end| {
            end >= timestamp && self.dmc.next_timestamp().is_some()
        }));

        let adjustment = self.bridge.rebase(timestamp);
        if adjustment != 0 {
            self.sequencer.rebase(adjustment);
            self.triangle.rebase(adjustment);
            self.dmc.rebase(adjustment);
            self.last_timestamp -= adjustment;
            trace!("rebase by {adjustment} cycles at {timestamp}");
        }
        adjustment
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Status register without read side effects
    pub fn status(&self) -> StatusFlags {
        self.status
    }

    /// Length counter of a channel (0=pulse 0 .. 3=noise)
    pub fn length_counter(&self, channel: usize) -> u8 {
        self.lengths.get(channel)
    }

    /// Envelope unit (0, 1 pulses; 2 noise)
    pub fn envelope(&self, index: usize) -> &Envelope {
        &self.envelopes[index]
    }

    /// Sweep unit of a pulse channel
    pub fn sweep(&self, channel: usize) -> &Sweep {
        &self.sweeps[channel]
    }

    /// Triangle state
    pub fn triangle(&self) -> &Triangle {
        &self.triangle
    }

    /// DMC player state
    pub fn dmc(&self) -> &DeltaModulation {
        &self.dmc
    }

    /// Frame sequencer state
    pub fn sequencer(&self) -> &FrameSequencer {
        &self.sequencer
    }

    /// FIFO state (Cache, Pending, cursor)
    pub fn fifo(&self) -> &ParameterFifo {
        &self.fifo
    }

    /// Timestamp bridge
    pub fn bridge(&self) -> &TimestampBridge {
        &self.bridge
    }

    /// Synthesizer sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable synthesizer sink
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Sample memory
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Mutable sample memory
    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    /// Tear down into the sink and the memory
    pub fn into_parts(self) -> (S, M) {
        (self.sink, self.memory)
    }

    fn enter(&mut self, timestamp: u32) {
        debug_assert!(
            timestamp >= self.last_timestamp,
            "timestamp went backwards: {timestamp} < {}",
            self.last_timestamp
        );
        self.last_timestamp = timestamp;
    }

    fn sync(&mut self, timestamp: u32) {
        let sample = self.bridge.sample_index(timestamp);
        let multipliers = [self.sweeps[0].multiplier(), self.sweeps[1].multiplier()];
        self.fifo
            .sync(sample, self.status, multipliers, &mut self.sink);
    }

    fn refresh_volume(&mut self, index: usize) {
        let volume = self.envelopes[index].volume();
        self.fifo.set_volume(index, volume);
    }

    fn load_length(&mut self, channel: usize, value: u8) {
        if self.enables & (1 << channel) != 0 {
            self.lengths.load(channel, value);
            self.status.insert(StatusFlags::channel(channel));
        }
    }

    fn write_enables(&mut self, timestamp: u32, value: u8) {
        for channel in [PULSE0, PULSE1, TRIANGLE, NOISE] {
            if value & (1 << channel) == 0 {
                let was_running = self.lengths.clear(channel);
                if channel == TRIANGLE && was_running {
                    self.triangle.arm_update();
                }
            }
        }

        self.enables = value;

        if value & ENABLE_DMC != 0 {
            self.dmc.enable(timestamp);
            self.status.insert(StatusFlags::DMC);
        } else {
            self.dmc.disable();
        }

        self.status &= StatusFlags::FRAME_IRQ | StatusFlags::from_bits_truncate(value & 0x1F);
    }

    fn update_triangle(&mut self, timestamp: u32) {
        if let Some(landed) = self.triangle.advance(timestamp) {
            let active = self.status.contains(StatusFlags::TRIANGLE);
            let period = self.triangle.cache_period(active);
            let word = &mut self.fifo.cache_mut()[WORD_TRIANGLE];
            *word = (*word & 0x0F) | period;
            self.sync(landed);
        }
    }

    fn run_sequencer(&mut self, timestamp: u32) {
        loop {
            let tick = self.sequencer.next_timestamp();
            self.update_triangle(tick);
            self.clock_sequencer(tick);
            self.sequencer.advance_schedule();
            if !self.sequencer.due(timestamp) {
                break;
            }
        }
        self.update_triangle(timestamp);
    }

    fn clock_sequencer(&mut self, timestamp: u32) {
        for index in 0..self.envelopes.len() {
            self.envelopes[index].clock();
            self.refresh_volume(index);
        }

        self.triangle.clock_linear();

        if self.sequencer.is_half_frame() {
            for channel in [PULSE0, PULSE1] {
                let halted = self.envelopes[channel].halts_length();
                if self.lengths.clock(channel, halted) {
                    self.status.remove(StatusFlags::channel(channel));
                }
            }

            if self.lengths.clock(TRIANGLE, self.triangle.halted()) {
                self.status.remove(StatusFlags::TRIANGLE);
                self.triangle.arm_update();
            }

            let noise_halted = self.envelopes[NOISE_ENVELOPE].halts_length();
            if self.lengths.clock(NOISE, noise_halted) {
                self.status.remove(StatusFlags::NOISE);
            }

            for channel in [PULSE0, PULSE1] {
                let word = &mut self.fifo.cache_mut()[channel];
                self.sweeps[channel].clock(word, channel);
            }
        }

        if self.sequencer.finish_step() {
            self.status.insert(StatusFlags::FRAME_IRQ);
        }

        self.sync(timestamp);
    }

    fn run_dmc(&mut self, timestamp: u32) {
        let mut bus = DmcBus {
            memory: &self.memory,
            bridge: &self.bridge,
            sink: &mut self.sink,
            status: &mut self.status,
            enables: self.enables,
        };
        self.dmc.run(timestamp, &mut bus);
    }

    /// Poll the consumer position until `ready` holds. Returns the number of
    /// waits taken. Debug builds assert if the consumer stalls.
    fn wait_until(&self, ready: impl Fn(u16) -> bool) -> u64 {
        let stall_limit = Duration::from_millis(self.config.stall_timeout_ms);
        let started = Instant::now();
        let mut polls = 0u64;
        while !ready(self.sink.read_consumer_position()) {
            debug_assert!(
                started.elapsed() < stall_limit,
                "synthesizer consumer stalled for {stall_limit:?}"
            );
            self.sink.wait_for_consumer();
            polls += 1;
        }
        polls
    }
}

impl<S: SynthSink + std::fmt::Debug, M: SampleMemory> std::fmt::Debug for Apu<S, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Apu")
            .field("region", &self.config.region)
            .field("status", &self.status)
            .field("enables", &self.enables)
            .field("fifo", &self.fifo)
            .field("sequencer", &self.sequencer)
            .field("sink", &self.sink)
            .finish()
    }
}
