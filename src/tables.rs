//! Device calibration tables
//!
//! Lookup tables and fixed-point constants that encode real 2A03 behavior.
//! Every value here is preserved exactly; none of them are tuning knobs.

/// Length counter reload values, indexed by the top 5 bits of a
/// period-high register write.
pub const LENGTH_TABLE: [u8; 0x20] = [
    0x0A, 0xFE, 0x14, 0x02, 0x28, 0x04, 0x50, 0x06, //
    0xA0, 0x08, 0x3C, 0x0A, 0x0E, 0x0C, 0x1A, 0x0E, //
    0x0C, 0x10, 0x18, 0x12, 0x30, 0x14, 0x60, 0x16, //
    0xC0, 0x18, 0x48, 0x1A, 0x10, 0x1C, 0x20, 0x1E, //
];

/// DMC bit periods in CPU cycles, NTSC timing.
pub const DMC_PERIODS_NTSC: [u16; 0x10] = [
    0x1AC, 0x17C, 0x154, 0x140, 0x11E, 0x0FE, 0x0E2, 0x0D6, //
    0x0BE, 0x0A0, 0x08E, 0x080, 0x06A, 0x054, 0x048, 0x036, //
];

/// DMC bit periods in CPU cycles, PAL timing.
pub const DMC_PERIODS_PAL: [u16; 0x10] = [
    0x18E, 0x162, 0x13C, 0x12A, 0x114, 0x0EC, 0x0D2, 0x0C6, //
    0x0B0, 0x094, 0x084, 0x076, 0x062, 0x04E, 0x042, 0x032, //
];

/// Sweep multipliers in 1/256 units, indexed by the low nibble of the sweep
/// register (negate bit << 3 | shift amount).
///
/// `period * SWEEP_MULTIPLIERS[i] >> 8` equals `period >> shift`, negated when
/// the negate bit is set. Shift 0 maps to a full-magnitude multiplier.
pub const SWEEP_MULTIPLIERS: [i32; 0x10] = [
    256, 128, 64, 32, 16, 8, 4, 2, //
    -256, -128, -64, -32, -16, -8, -4, -2, //
];

/// Frame sequencer step period in half CPU cycles (NTSC: 7457.5 cycles).
pub const FRAME_PERIOD_NTSC: u32 = 14915;

/// Frame sequencer step period in half CPU cycles (PAL: 8313.5 cycles).
pub const FRAME_PERIOD_PAL: u32 = 16627;

/// Fractional bits of the timestamp-to-sample fixed-point conversion.
pub const SAMPLE_FRACTION_BITS: u32 = 21;

/// `round(44100 * 2^21 / ntsc_cpu_hz)`
pub const TIME_SCALE_NTSC: u32 = 51674;

/// `round(44100 * 2^21 / pal_cpu_hz)`
pub const TIME_SCALE_PAL: u32 = 55626;

/// Output sample rate of the synthesizer.
pub const SAMPLE_RATE: u32 = 44_100;

/// Ideal NTSC CPU clock (315/88 MHz / 2).
pub const CPU_HZ_NTSC: f64 = 315.0 / 88.0 * 1_000_000.0 / 2.0;

/// Ideal PAL CPU clock.
pub const CPU_HZ_PAL: f64 = 625.0 * (50.0 / 2.0) * (1135.0 / 4.0 + 1.0 / 625.0) * 6.0 / 16.0;

/// Cycles between a triangle period (or silence) change and the moment it
/// becomes audible.
pub const TRIANGLE_UPDATE_DELAY: i32 = 100;

/// Number of slots in the synthesizer's circular buffers.
///
/// Fixed by the conversion format: a 32-bit fixed-point product shifted right
/// by [`SAMPLE_FRACTION_BITS`] leaves exactly 11 bits of sample index.
pub const SLOT_COUNT: u16 = 1 << (32 - SAMPLE_FRACTION_BITS);

/// Mask for wrapping sample indices and cursors.
pub const SLOT_MASK: u16 = SLOT_COUNT - 1;

/// Default maximum producer lead over the consumer before a rebase may proceed.
pub const DEFAULT_MAX_LEAD: u16 = SLOT_COUNT / 2;

/// Default window for the initial producer/consumer alignment.
pub const DEFAULT_START_SYNC_WINDOW: u16 = 4;

/// Slot the parameter FIFO write cursor starts from after construction.
pub const INITIAL_FIFO_CURSOR: u16 = SLOT_COUNT / 2;

/// DMC sample fetch base: `0xC000 + (start << 6)`.
pub const DMC_SAMPLE_BASE: u16 = 0xC000;

/// Length counter reload for a period-high register value.
pub fn length_for(value: u8) -> u8 {
    LENGTH_TABLE[((value >> 3) & 0x1F) as usize]
}
