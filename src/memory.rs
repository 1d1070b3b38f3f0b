//! Sample Memory
//!
//! Read-only byte source for DMC sample fetches. Addresses are CPU addresses
//! in the 0x8000-0xFFFF window.

use crate::{ApuError, Result};

/// Size of the mapped sample window
pub const WINDOW_SIZE: usize = 0x8000;

/// Base CPU address of the mapped sample window
pub const WINDOW_BASE: u16 = 0x8000;

/// Byte reader used by the DMC
pub trait SampleMemory {
    /// Read one byte. Must not fail; unmapped addresses read as anything.
    fn read_byte(&self, addr: u16) -> u8;
}

impl<F> SampleMemory for F
where
    F: Fn(u16) -> u8,
{
    fn read_byte(&self, addr: u16) -> u8 {
        self(addr)
    }
}

/// 32 KiB flat image covering 0x8000-0xFFFF
#[derive(Clone)]
pub struct FlatMemory {
    data: Vec<u8>,
}

impl FlatMemory {
    /// All-zero window
    pub fn new() -> Self {
        FlatMemory {
            data: vec![0; WINDOW_SIZE],
        }
    }

    /// Window with `image` copied in at CPU address `load_addr`
    pub fn with_image(image: &[u8], load_addr: u16) -> Result<Self> {
        let mut memory = Self::new();
        memory.load(image, load_addr)?;
        Ok(memory)
    }

    /// Copy `image` into the window at CPU address `load_addr`
    pub fn load(&mut self, image: &[u8], load_addr: u16) -> Result<()> {
        if load_addr < WINDOW_BASE {
            return Err(ApuError::Other(format!(
                "load address ${load_addr:04X} is below ${WINDOW_BASE:04X}"
            )));
        }
        let start = (load_addr - WINDOW_BASE) as usize;
        let end = start + image.len();
        if end > WINDOW_SIZE {
            return Err(ApuError::Other(format!(
                "{} byte image at ${load_addr:04X} overruns $FFFF",
                image.len()
            )));
        }
        self.data[start..end].copy_from_slice(image);
        Ok(())
    }

    /// Store a single byte (addresses below 0x8000 are ignored)
    pub fn poke(&mut self, addr: u16, value: u8) {
        if addr >= WINDOW_BASE {
            self.data[(addr - WINDOW_BASE) as usize] = value;
        }
    }
}

impl Default for FlatMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FlatMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatMemory")
            .field("size", &self.data.len())
            .finish()
    }
}

impl SampleMemory for FlatMemory {
    fn read_byte(&self, addr: u16) -> u8 {
        self.data[(addr as usize) & (WINDOW_SIZE - 1)]
    }
}
