//! 2A03 APU parameter engine with a write-behind synthesizer bridge
//!
//! Emulates the register-level behavior of the NES/Famicom sound unit
//! (envelopes, sweeps, length counters, the frame sequencer, the triangle's
//! linear counter and the delta-modulation sample player) and forwards the
//! resulting channel parameters, sample-for-sample, to an independent
//! fixed-rate synthesizer.
//!
//! The producer (a CPU emulator) calls into the engine with CPU-cycle
//! timestamps. The engine converts them to 44.1 kHz sample indices and
//! coalesces every change that lands on the same output sample into one
//! committed parameter slot, so the synthesizer only ever sees complete,
//! timestamp-ordered state.
//!
//! # Features
//! - Cycle-exact frame sequencer (four- and five-step modes, frame IRQ)
//! - Pulse sweep arithmetic on packed period words, including overflow muting
//! - Delayed triangle period updates and linear-counter silencing
//! - DMC playback with looping, end-of-sample IRQ and a PCM delta stream
//! - Backpressure and timestamp rebasing once per video frame
//!
//! # Crate feature flags
//! - `trace` (default): register trace parsing and replay, CSV export, and the
//!   `apu-trace` binary
//!
//! # Quick start
//! ```no_run
//! use apu_bridge::{Apu, EngineConfig, FlatMemory, MemorySink};
//!
//! let mut apu = Apu::new(EngineConfig::ntsc(), MemorySink::new(), FlatMemory::new()).unwrap();
//! apu.write(0, 0x15, 0x01); // enable pulse 0
//! apu.write(0, 0x00, 0xBF); // 50% duty, constant volume 15
//! apu.write(0, 0x02, 0xFD); // period low
//! apu.write(0, 0x03, 0x08); // period high, length load
//! let adj = apu.end_of_frame(29_781);
//! assert_eq!(adj, 0);
//! println!("{} slots committed", apu.sink().slots().len());
//! ```

#![warn(missing_docs)]

pub mod apu;
pub mod channels;
pub mod config;
pub mod dmc;
pub mod fifo;
pub mod frame_clock;
pub mod frame_sequencer;
pub mod memory;
pub mod registers;
pub mod sink;
pub mod tables;
pub mod timebase;
#[cfg(feature = "trace")]
pub mod trace; // Trace replay and CSV export

/// Error types for the engine's fallible edges
#[derive(thiserror::Error, Debug)]
pub enum ApuError {
    /// IO error from filesystem or output
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// A trace line could not be parsed
    #[error("Trace parse error on line {line}: {msg}")]
    TraceParse {
        /// 1-based line number
        line: usize,
        /// What went wrong
        msg: String,
    },

    /// CSV export failure
    #[error("CSV error: {0}")]
    Csv(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for ApuError {
    /// Converts a String into `ApuError::Other`.
    ///
    /// Prefer the specific variants (`ConfigError`, `TraceParse`) where the
    /// failure has a known kind.
    fn from(msg: String) -> Self {
        ApuError::Other(msg)
    }
}

impl From<&str> for ApuError {
    /// Converts a string slice into `ApuError::Other`.
    fn from(msg: &str) -> Self {
        ApuError::Other(msg.to_string())
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, ApuError>;

// Public API exports
pub use apu::Apu;
pub use config::{EngineConfig, Region};
pub use frame_clock::FrameClock;
pub use memory::{FlatMemory, SampleMemory};
pub use registers::{Register, StatusFlags};
pub use sink::{CommittedSlot, ConsumedSample, ControlBits, MemorySink, SlotRing, SynthSink};
pub use timebase::TimestampBridge;

#[cfg(feature = "trace")]
pub use trace::{parse_trace, Replayer, ReplaySummary, TraceEvent, TraceOp};
