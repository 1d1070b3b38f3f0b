//! Synthesizer Sink
//!
//! The engine never owns the synthesizer. Committed parameter slots and PCM
//! level changes are pushed through the [`SynthSink`] capability, and the
//! consumer's playback position is read back through it for backpressure.
//!
//! Two implementations ship with the crate:
//! - [`MemorySink`] records everything and reports a consumer that keeps pace
//!   with the producer. Used by tests and the trace replayer.
//! - [`SlotRing`] is a thread-shared pair of slot buffers with a consumer side
//!   that a synthesizer thread drains one sample at a time.

use bitflags::bitflags;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::tables::{DEFAULT_MAX_LEAD, INITIAL_FIFO_CURSOR, SLOT_COUNT, SLOT_MASK};

/// Backoff while waiting for the consumer to make progress (microseconds)
pub const CONSUMER_BACKOFF_MICROS: u64 = 200;

bitflags! {
    /// Per-sample control bits committed alongside a parameter slot
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct ControlBits: u8 {
        /// Consumer advances its parameter read cursor at this sample
        const INC_READ = 0x01;
        /// Pulse 0 waveform phase restarts at this sample
        const PULSE0_PHASE_RESET = 0x02;
        /// Pulse 1 waveform phase restarts at this sample
        const PULSE1_PHASE_RESET = 0x04;
    }
}

impl ControlBits {
    /// Phase-reset bit for a pulse channel (0 or 1)
    pub fn phase_reset(channel: usize) -> Self {
        if channel == 0 {
            ControlBits::PULSE0_PHASE_RESET
        } else {
            ControlBits::PULSE1_PHASE_RESET
        }
    }
}

/// One parameter commit
///
/// `words` lands in the parameter FIFO at `cursor`; `control` lands in the
/// per-sample control buffer at `sample_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedSlot {
    /// Parameter FIFO write cursor (0..2048)
    pub cursor: u16,
    /// Sample index the slot takes effect at (0..2048)
    pub sample_index: u16,
    /// Pulse 0, pulse 1, triangle/noise volume and mode words
    pub words: [u16; 4],
    /// Staged control bits
    pub control: ControlBits,
}

/// Capability the engine uses to talk to the synthesizer
pub trait SynthSink {
    /// Store a committed parameter slot
    fn write_slot(&mut self, slot: &CommittedSlot);

    /// Store the PCM delta for a sample index, replacing any earlier value
    fn write_pcm_delta(&mut self, sample_index: u16, delta: u8);

    /// Consumer's current sample position (0..2048)
    fn read_consumer_position(&self) -> u16;

    /// Called between polls while the producer waits for the consumer
    fn wait_for_consumer(&self) {
        std::hint::spin_loop();
    }
}

/// Recording sink with a consumer that follows the producer
///
/// The reported consumer position is one past the sample index of the most
/// recently committed slot, so backpressure never blocks. Before the first
/// commit it reports a consumer a default lead behind sample 0, which is
/// where [`crate::Apu::start_sync`] expects a freshly started consumer.
///
/// Every slot and PCM write is kept, so memory grows with the length of the
/// run. Use it for tests and bounded trace replays, and call
/// [`MemorySink::clear`] between frames when recording indefinitely.
#[derive(Debug, Clone)]
pub struct MemorySink {
    slots: Vec<CommittedSlot>,
    pcm_writes: Vec<(u16, u8)>,
    pcm: Vec<u8>,
    consumer_override: Option<u16>,
}

impl MemorySink {
    /// Empty recorder
    pub fn new() -> Self {
        MemorySink {
            slots: Vec::new(),
            pcm_writes: Vec::new(),
            pcm: vec![0; SLOT_COUNT as usize],
            consumer_override: None,
        }
    }

    /// Every committed slot, in commit order
    pub fn slots(&self) -> &[CommittedSlot] {
        &self.slots
    }

    /// Most recently committed slot
    pub fn last_slot(&self) -> Option<&CommittedSlot> {
        self.slots.last()
    }

    /// Every PCM delta write, in order
    pub fn pcm_writes(&self) -> &[(u16, u8)] {
        &self.pcm_writes
    }

    /// Current content of the PCM delta buffer
    pub fn pcm_buffer(&self) -> &[u8] {
        &self.pcm
    }

    /// Pin the reported consumer position instead of following the producer
    pub fn set_consumer_position(&mut self, position: Option<u16>) {
        self.consumer_override = position.map(|p| p & SLOT_MASK);
    }

    /// Forget everything recorded so far
    pub fn clear(&mut self) {
        self.slots.clear();
        self.pcm_writes.clear();
        self.pcm.fill(0);
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthSink for MemorySink {
    fn write_slot(&mut self, slot: &CommittedSlot) {
        self.slots.push(*slot);
    }

    fn write_pcm_delta(&mut self, sample_index: u16, delta: u8) {
        self.pcm_writes.push((sample_index, delta));
        self.pcm[(sample_index & SLOT_MASK) as usize] = delta;
    }

    fn read_consumer_position(&self) -> u16 {
        if let Some(position) = self.consumer_override {
            return position;
        }
        self.slots.last().map_or(SLOT_COUNT - DEFAULT_MAX_LEAD, |slot| {
            slot.sample_index.wrapping_add(1) & SLOT_MASK
        })
    }
}

/// What the consumer sees at one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumedSample {
    /// Sample index that was consumed
    pub position: u16,
    /// Parameter words in effect for this sample
    pub words: [u16; 4],
    /// Control bits that were committed for this sample
    pub control: ControlBits,
    /// PCM delta for this sample (two's-complement negated level change)
    pub pcm_delta: u8,
}

#[derive(Debug)]
struct SlotBuffers {
    params: Vec<[u16; 4]>,
    control: Vec<ControlBits>,
    pcm: Vec<u8>,
    read_cursor: u16,
}

/// Slot buffers shared between the producer and a synthesizer thread
///
/// # Thread Safety
/// - One producer (the engine, through `Arc<SlotRing>` as its sink)
/// - One consumer calling [`SlotRing::consume`] once per output sample
/// - Buffers are guarded by a `parking_lot::Mutex`; the consumer position is
///   atomic so the producer can poll it without taking the lock
#[derive(Debug)]
pub struct SlotRing {
    buffers: Mutex<SlotBuffers>,
    position: AtomicU16,
    progress: Condvar,
    backoff: Duration,
}

impl SlotRing {
    /// Create an empty ring with the default wait backoff
    pub fn new() -> Arc<Self> {
        Self::with_backoff(Duration::from_micros(CONSUMER_BACKOFF_MICROS))
    }

    /// Create an empty ring with a custom wait backoff
    pub fn with_backoff(backoff: Duration) -> Arc<Self> {
        Arc::new(SlotRing {
            buffers: Mutex::new(SlotBuffers {
                params: vec![[0; 4]; SLOT_COUNT as usize],
                control: vec![ControlBits::empty(); SLOT_COUNT as usize],
                pcm: vec![0; SLOT_COUNT as usize],
                read_cursor: INITIAL_FIFO_CURSOR,
            }),
            position: AtomicU16::new(0),
            progress: Condvar::new(),
            backoff,
        })
    }

    /// Consumer position (0..2048)
    pub fn position(&self) -> u16 {
        self.position.load(Ordering::Acquire)
    }

    /// Place the consumer at an arbitrary sample position
    pub fn seek(&self, position: u16) {
        let _guard = self.buffers.lock();
        self.position.store(position & SLOT_MASK, Ordering::Release);
        self.progress.notify_all();
    }

    /// Consume one sample.
    ///
    /// Control and PCM entries are cleared as they are read so a lapped
    /// buffer never replays stale events.
    pub fn consume(&self) -> ConsumedSample {
        let mut buffers = self.buffers.lock();
        let position = self.position.load(Ordering::Acquire);
        let index = position as usize;

        let control = std::mem::take(&mut buffers.control[index]);
        if control.contains(ControlBits::INC_READ) {
            buffers.read_cursor = (buffers.read_cursor + 1) & SLOT_MASK;
        }
        let words = buffers.params[buffers.read_cursor as usize];
        let pcm_delta = std::mem::take(&mut buffers.pcm[index]);

        self.position
            .store((position + 1) & SLOT_MASK, Ordering::Release);
        drop(buffers);
        self.progress.notify_all();

        ConsumedSample {
            position,
            words,
            control,
            pcm_delta,
        }
    }

    /// Consume `count` samples, returning them in order
    pub fn consume_many(&self, count: usize) -> Vec<ConsumedSample> {
        (0..count).map(|_| self.consume()).collect()
    }
}

impl SynthSink for Arc<SlotRing> {
    fn write_slot(&mut self, slot: &CommittedSlot) {
        let mut buffers = self.buffers.lock();
        buffers.params[(slot.cursor & SLOT_MASK) as usize] = slot.words;
        buffers.control[(slot.sample_index & SLOT_MASK) as usize] = slot.control;
    }

    fn write_pcm_delta(&mut self, sample_index: u16, delta: u8) {
        self.buffers.lock().pcm[(sample_index & SLOT_MASK) as usize] = delta;
    }

    fn read_consumer_position(&self) -> u16 {
        self.position()
    }

    fn wait_for_consumer(&self) {
        let mut buffers = self.buffers.lock();
        self.progress.wait_for(&mut buffers, self.backoff);
    }
}
