//! Engine configuration
//!
//! Timing region and the producer/consumer synchronization knobs. The
//! configuration can be built in code or loaded from JSON.

use serde::{Deserialize, Serialize};

use crate::tables::{
    CPU_HZ_NTSC, CPU_HZ_PAL, DEFAULT_MAX_LEAD, DEFAULT_START_SYNC_WINDOW, DMC_PERIODS_NTSC,
    DMC_PERIODS_PAL, FRAME_PERIOD_NTSC, FRAME_PERIOD_PAL, SLOT_COUNT, TIME_SCALE_NTSC,
    TIME_SCALE_PAL,
};
use crate::{ApuError, Result};

/// Default noise LCG seed at power-on.
pub const DEFAULT_NOISE_SEED: u64 = 0xDEAD_BEEF_CAFE_F00D;

/// Default time a debug build waits on a silent consumer before asserting.
pub const DEFAULT_STALL_TIMEOUT_MS: u64 = 5_000;

/// Console timing region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    /// 60Hz, 1.789773 MHz CPU
    #[default]
    Ntsc,
    /// 50Hz, 1.662607 MHz CPU
    Pal,
}

impl Region {
    /// Cycles-to-sample fixed-point scale (21 fractional bits)
    pub fn time_scale(self) -> u32 {
        match self {
            Region::Ntsc => TIME_SCALE_NTSC,
            Region::Pal => TIME_SCALE_PAL,
        }
    }

    /// Frame sequencer step period in half cycles
    pub fn frame_period(self) -> u32 {
        match self {
            Region::Ntsc => FRAME_PERIOD_NTSC,
            Region::Pal => FRAME_PERIOD_PAL,
        }
    }

    /// DMC rate table
    pub fn dmc_periods(self) -> &'static [u16; 16] {
        match self {
            Region::Ntsc => &DMC_PERIODS_NTSC,
            Region::Pal => &DMC_PERIODS_PAL,
        }
    }

    /// Ideal CPU clock in Hz
    pub fn cpu_hz(self) -> f64 {
        match self {
            Region::Ntsc => CPU_HZ_NTSC,
            Region::Pal => CPU_HZ_PAL,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Timing region
    pub region: Region,
    /// Noise short-variant LCG seed applied at power-on
    pub noise_seed: u64,
    /// Maximum slots the producer may lead the consumer before a rebase
    pub max_lead_slots: u16,
    /// Alignment window used by [`crate::Apu::start_sync`]
    pub start_sync_window: u16,
    /// Debug builds assert if the consumer makes no progress for this long
    pub stall_timeout_ms: u64,
}

impl EngineConfig {
    /// NTSC timing with default synchronization settings
    pub fn ntsc() -> Self {
        Self::for_region(Region::Ntsc)
    }

    /// PAL timing with default synchronization settings
    pub fn pal() -> Self {
        Self::for_region(Region::Pal)
    }

    /// Default settings for a region
    pub fn for_region(region: Region) -> Self {
        EngineConfig {
            region,
            noise_seed: DEFAULT_NOISE_SEED,
            max_lead_slots: DEFAULT_MAX_LEAD,
            start_sync_window: DEFAULT_START_SYNC_WINDOW,
            stall_timeout_ms: DEFAULT_STALL_TIMEOUT_MS,
        }
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(text)
            .map_err(|e| ApuError::ConfigError(format!("invalid engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the synchronization settings against the buffer geometry
    pub fn validate(&self) -> Result<()> {
        if self.max_lead_slots == 0 || self.max_lead_slots >= SLOT_COUNT {
            return Err(ApuError::ConfigError(format!(
                "max_lead_slots must be in 1..{SLOT_COUNT}, got {}",
                self.max_lead_slots
            )));
        }
        let window_limit = self.max_lead_slots.min(SLOT_COUNT - self.max_lead_slots);
        if self.start_sync_window == 0 || self.start_sync_window > window_limit {
            return Err(ApuError::ConfigError(format!(
                "start_sync_window must be in 1..={window_limit}, got {}",
                self.start_sync_window
            )));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::ntsc()
    }
}
