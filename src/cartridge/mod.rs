#[cfg(test)]
mod tests;

use std::fs;
use std::io;
use std::path::Path;

use log::{info, warn};
use thiserror::Error;

use crate::addr::Address;
use crate::bus::BusDevice;

pub const BANK_SIZE: usize = 0x400000; // 4 MB per bank
pub const MAX_BANKS: usize = 16;
pub const MAX_ROM_SIZE: usize = BANK_SIZE * MAX_BANKS; // 64 MB

pub const ROM_WINDOW_START: u32 = 0xC00000;
pub const ROM_WINDOW_END: u32 = 0xFFFFFF;
pub const BANK_REGISTER: u32 = 0x420000;
pub const SAVE_RAM_START: u32 = 0x700000;
pub const SAVE_RAM_END: u32 = 0x70FFFF;
pub const SAVE_RAM_SIZE: usize = 0x10000; // 64 KB

const MIRROR_START: u32 = 0x008000;
const MIRROR_END: u32 = 0x00FFFF;
const HEADER_SIZE: usize = 256;

#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("ROM image is empty")]
    Empty,
    #[error("ROM image too large: {0} bytes (max {MAX_ROM_SIZE})")]
    TooLarge(usize),
    #[error("failed to read ROM: {0}")]
    Io(#[from] io::Error),
}

/// Parsed 256-byte cartridge header.
///
/// All pointer fields are 24-bit little-endian. An all-zero header is legal:
/// a zero entry point means the corresponding coprocessor stays in reset
/// until the main CPU boots it through its mailbox.
#[derive(Debug, Clone, Default)]
pub struct RomHeader {
    pub main_entry: u32,
    pub graphics_entry: u32,
    pub sound_entry: u32,
    pub palette_data: u32,
    pub tile_data: u32,
    pub audio_data: u32,
    pub title: String,
    pub version: u8,
}

impl RomHeader {
    fn parse(rom: &[u8]) -> Self {
        if rom.len() < HEADER_SIZE {
            warn!("ROM of {} bytes is too small for a header", rom.len());
            return Self::default();
        }
        let ptr24 = |at: usize| -> u32 {
            rom[at] as u32 | (rom[at + 1] as u32) << 8 | (rom[at + 2] as u32) << 16
        };
        let title_bytes = &rom[18..50];
        let title_len = title_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(title_bytes.len());
        Self {
            main_entry: ptr24(0),
            graphics_entry: ptr24(3),
            sound_entry: ptr24(6),
            palette_data: ptr24(9),
            tile_data: ptr24(12),
            audio_data: ptr24(15),
            title: String::from_utf8_lossy(&title_bytes[..title_len]).into_owned(),
            version: rom[50],
        }
    }
}

/// Cartridge: ROM blob, bank-switched 4 MB window and optional save RAM.
///
/// Shared by all three CPU buses; the bank register is the only mutable
/// state and only the main CPU's memory map reaches it.
pub struct Cartridge {
    rom: Vec<u8>,
    save_ram: Vec<u8>,
    current_bank: u8,
    header: RomHeader,
}

impl Cartridge {
    pub fn load_rom<P: AsRef<Path>>(path: P) -> Result<Self, CartridgeError> {
        let bytes = fs::read(path)?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        if rom.is_empty() {
            return Err(CartridgeError::Empty);
        }
        if rom.len() > MAX_ROM_SIZE {
            return Err(CartridgeError::TooLarge(rom.len()));
        }
        let header = RomHeader::parse(&rom);
        info!(
            "cartridge: {} bytes, {} bank(s), title {:?}, version {}",
            rom.len(),
            (rom.len() + BANK_SIZE - 1) / BANK_SIZE,
            header.title,
            header.version
        );
        Ok(Self {
            rom,
            save_ram: Vec::new(),
            current_bank: 0,
            header,
        })
    }

    pub fn header(&self) -> &RomHeader {
        &self.header
    }

    pub fn rom_size(&self) -> usize {
        self.rom.len()
    }

    pub fn bank_count(&self) -> usize {
        (self.rom.len() + BANK_SIZE - 1) / BANK_SIZE
    }

    pub fn current_bank(&self) -> u8 {
        self.current_bank
    }

    pub fn set_bank(&mut self, bank: u8) {
        // 4-bit register; anything past the last bank wraps to 0.
        let bank = bank & 0x0F;
        self.current_bank = if (bank as usize) < MAX_BANKS { bank } else { 0 };
    }

    pub fn has_save_ram(&self) -> bool {
        !self.save_ram.is_empty()
    }

    /// Allocate the 64 KB save RAM if it does not exist yet. Battery-backed
    /// RAM reads as 0xFF when never written.
    pub fn create_save_ram(&mut self) {
        if self.save_ram.is_empty() {
            self.save_ram = vec![0xFF; SAVE_RAM_SIZE];
        }
    }

    /// Load save RAM from disk. Bytes past the end of the file keep 0xFF.
    pub fn load_save<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CartridgeError> {
        let data = fs::read(path)?;
        self.create_save_ram();
        let len = data.len().min(SAVE_RAM_SIZE);
        self.save_ram[..len].copy_from_slice(&data[..len]);
        info!("cartridge: loaded {} save RAM byte(s)", len);
        Ok(())
    }

    pub fn save_save<P: AsRef<Path>>(&self, path: P) -> Result<(), CartridgeError> {
        if self.save_ram.is_empty() {
            return Ok(());
        }
        fs::write(path, &self.save_ram)?;
        Ok(())
    }

    fn in_rom_window(flat: u32) -> bool {
        (ROM_WINDOW_START..=ROM_WINDOW_END).contains(&flat)
    }

    fn in_save_ram(flat: u32) -> bool {
        (SAVE_RAM_START..=SAVE_RAM_END).contains(&flat)
    }

    /// Physical ROM offset for a ROM-window address under the current bank.
    fn map_window(&self, flat: u32) -> usize {
        let offset = (flat - ROM_WINDOW_START) as usize;
        self.current_bank as usize * BANK_SIZE + offset
    }
}

impl BusDevice for Cartridge {
    fn decode(&self, addr: Address) -> bool {
        let flat = addr.flat();
        (MIRROR_START..=MIRROR_END).contains(&flat)
            || Self::in_rom_window(flat)
            || flat == BANK_REGISTER
            || Self::in_save_ram(flat)
    }

    fn read(&mut self, addr: Address) -> u8 {
        let flat = addr.flat();

        // Bank-0 mirror of the first 32 KB, reset vector included: the
        // mirror indexes ROM by the flat address itself.
        if (MIRROR_START..=MIRROR_END).contains(&flat) {
            return self.rom.get(flat as usize).copied().unwrap_or(0xFF);
        }

        if Self::in_rom_window(flat) {
            return self.rom.get(self.map_window(flat)).copied().unwrap_or(0xFF);
        }

        if Self::in_save_ram(flat) {
            let offset = (flat - SAVE_RAM_START) as usize;
            return self.save_ram.get(offset).copied().unwrap_or(0xFF);
        }

        0xFF
    }

    fn write(&mut self, addr: Address, value: u8) {
        let flat = addr.flat();

        if flat == BANK_REGISTER {
            self.set_bank(value);
            return;
        }

        if Self::in_save_ram(flat) {
            self.create_save_ram();
            let offset = (flat - SAVE_RAM_START) as usize;
            if let Some(slot) = self.save_ram.get_mut(offset) {
                *slot = value;
            }
            return;
        }

        // ROM is read-only; everything else here is ignored.
    }
}
