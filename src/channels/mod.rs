//! Channel Units
//!
//! Per-channel register state for the two pulse channels, the triangle and the
//! noise channel. Units hold only the state that is not already packed into a
//! FIFO Cache word; the engine routes register writes and sequencer clocks to
//! them and folds their outputs back into the Cache.
//!
//! Cache word layout:
//! - word 0: `0fffffffffffVVVV` pulse 0 period and volume
//! - word 1: `0fffffffffffVVVV` pulse 1 period and volume
//! - word 2: `0fffffffffffVVVV` triangle period and noise volume
//! - word 3: `M0SSffff0000CCCC` noise mode, short variant, noise period index,
//!   pulse 1 duty (bits 2-3) and pulse 0 duty (bits 0-1)

pub mod envelope;
pub mod length;
pub mod noise;
pub mod sweep;
pub mod triangle;

pub use envelope::{Envelope, EnvelopeMode};
pub use length::LengthCounters;
pub use noise::NoiseShaper;
pub use sweep::Sweep;
pub use triangle::Triangle;

/// Length counter / status index of pulse 0
pub const PULSE0: usize = 0;
/// Length counter / status index of pulse 1
pub const PULSE1: usize = 1;
/// Length counter / status index of the triangle
pub const TRIANGLE: usize = 2;
/// Length counter / status index of the noise channel
pub const NOISE: usize = 3;

/// Envelope slot of the noise channel (pulses use 0 and 1)
pub const NOISE_ENVELOPE: usize = 2;

/// Cache word holding the triangle period and the noise volume
pub const WORD_TRIANGLE: usize = 2;
/// Cache word holding noise mode bits and pulse duties
pub const WORD_MODE: usize = 3;

/// Mask selecting the period field (everything above the volume nibble)
pub const PERIOD_MASK: u32 = 0xFFFF_FFF0;
/// Mask selecting the volume nibble
pub const VOLUME_MASK: u32 = 0x0000_000F;
/// Words at or below this value carry a period under 8 and are muted
pub const MUTE_THRESHOLD: u32 = 0x7F;
