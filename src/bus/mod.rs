#[cfg(test)]
mod tests;

use crate::addr::Address;
use crate::cartridge::Cartridge;
use crate::cpld1::Cpld1Audio;
use crate::cpld2::Cpld2Video;
use crate::cpld3::Cpld3Raster;
use crate::mailbox::Mailbox;
use crate::ram::Ram;

pub const MAIN_RAM_SIZE: usize = 0x20000; // 128 KB
pub const GRAPHICS_RAM_SIZE: usize = 0x40000; // 256 KB, covers the VRAM layout
pub const SOUND_RAM_SIZE: usize = 0x10000; // 64 KB

pub const MAILBOX_SIZE: usize = 0x400; // 1 KB
pub const MAILBOX_A_BASE: u32 = 0x400000;
pub const MAILBOX_B_BASE: u32 = 0x410000;

/// The three bus-device operations every mapped peripheral shares.
///
/// `read` is only meaningful for addresses the device claims via `decode`;
/// out-of-claim reads return open bus and writes are dropped.
pub trait BusDevice {
    fn decode(&self, addr: Address) -> bool;
    fn read(&mut self, addr: Address) -> u8;
    fn write(&mut self, addr: Address, value: u8);
}

/// Identity of a device in the chipset. A `SystemBus` is an ordered list of
/// these; dispatch is a match on the variant, so the hot bus path never goes
/// through a vtable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceKind {
    MainRam,
    GraphicsRam,
    SoundRam,
    MailboxA,
    MailboxB,
    Cpld1,
    Cpld2,
    Cpld3,
    Cartridge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MailboxSide {
    A,
    B,
}

/// Upward signal from the bus fabric, drained by the machine after every
/// instruction so a mailbox notification reaches its CPLD before the writing
/// CPU executes anything else.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusEvent {
    MailboxWritten(MailboxSide),
}

/// Every addressable component of the console in one place.
///
/// The cartridge slot and both mailboxes appear on more than one CPU bus;
/// owning them all here (and dispatching by `DeviceKind`) is what lets three
/// buses share devices without reference cycles or interior mutability.
pub struct Chipset {
    pub main_ram: Ram,
    pub graphics_ram: Ram,
    pub sound_ram: Ram,
    pub mailbox_a: Mailbox,
    pub mailbox_b: Mailbox,
    pub cartridge: Option<Cartridge>,
    pub cpld1: Cpld1Audio,
    pub cpld2: Cpld2Video,
    pub cpld3: Cpld3Raster,
    events: Vec<BusEvent>,
}

impl Chipset {
    pub fn new() -> Self {
        Self {
            main_ram: Ram::new(0x000000, MAIN_RAM_SIZE, "main RAM"),
            graphics_ram: Ram::new(0x000000, GRAPHICS_RAM_SIZE, "graphics RAM"),
            sound_ram: Ram::new(0x000000, SOUND_RAM_SIZE, "sound RAM"),
            mailbox_a: Mailbox::new(MAILBOX_A_BASE, MAILBOX_SIZE, "mailbox A"),
            mailbox_b: Mailbox::new(MAILBOX_B_BASE, MAILBOX_SIZE, "mailbox B"),
            cartridge: None,
            cpld1: Cpld1Audio::new(),
            cpld2: Cpld2Video::new(),
            cpld3: Cpld3Raster::new(),
            events: Vec::new(),
        }
    }

    pub fn decode(&self, kind: DeviceKind, addr: Address) -> bool {
        match kind {
            DeviceKind::MainRam => self.main_ram.decode(addr),
            DeviceKind::GraphicsRam => self.graphics_ram.decode(addr),
            DeviceKind::SoundRam => self.sound_ram.decode(addr),
            DeviceKind::MailboxA => self.mailbox_a.decode(addr),
            DeviceKind::MailboxB => self.mailbox_b.decode(addr),
            DeviceKind::Cpld1 => self.cpld1.decode(addr),
            DeviceKind::Cpld2 => self.cpld2.decode(addr),
            DeviceKind::Cpld3 => self.cpld3.decode(addr),
            DeviceKind::Cartridge => {
                self.cartridge.as_ref().is_some_and(|cart| cart.decode(addr))
            }
        }
    }

    pub fn read(&mut self, kind: DeviceKind, addr: Address) -> u8 {
        match kind {
            DeviceKind::MainRam => self.main_ram.read(addr),
            DeviceKind::GraphicsRam => self.graphics_ram.read(addr),
            DeviceKind::SoundRam => self.sound_ram.read(addr),
            DeviceKind::MailboxA => self.mailbox_a.read(addr),
            DeviceKind::MailboxB => self.mailbox_b.read(addr),
            DeviceKind::Cpld1 => self.cpld1.read(addr),
            DeviceKind::Cpld2 => self.cpld2.read(addr),
            DeviceKind::Cpld3 => self.cpld3.read(addr),
            DeviceKind::Cartridge => match self.cartridge.as_mut() {
                Some(cart) => cart.read(addr),
                None => 0xFF,
            },
        }
    }

    pub fn write(&mut self, kind: DeviceKind, addr: Address, value: u8) {
        match kind {
            DeviceKind::MainRam => self.main_ram.write(addr, value),
            DeviceKind::GraphicsRam => self.graphics_ram.write(addr, value),
            DeviceKind::SoundRam => self.sound_ram.write(addr, value),
            DeviceKind::MailboxA => {
                self.mailbox_a.write(addr, value);
                self.events.push(BusEvent::MailboxWritten(MailboxSide::A));
            }
            DeviceKind::MailboxB => {
                self.mailbox_b.write(addr, value);
                self.events.push(BusEvent::MailboxWritten(MailboxSide::B));
            }
            DeviceKind::Cpld1 => self.cpld1.write(addr, value),
            DeviceKind::Cpld2 => self.cpld2.write(addr, value),
            DeviceKind::Cpld3 => self.cpld3.write(addr, value),
            DeviceKind::Cartridge => {
                if let Some(cart) = self.cartridge.as_mut() {
                    cart.write(addr, value);
                }
            }
        }
    }

    /// Drain pending bus events in write order.
    pub fn take_events(&mut self) -> Vec<BusEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }
}

impl Default for Chipset {
    fn default() -> Self {
        Self::new()
    }
}

/// One CPU's view of the machine: an ordered device list.
///
/// Registration is append-only and happens during machine initialization.
/// Lookup walks the list in registration order and takes the first
/// claimant; with at most eight devices a linear scan beats anything
/// cleverer, and the common case (RAM in the low banks) hits on the first
/// probe.
pub struct SystemBus {
    name: &'static str,
    devices: Vec<DeviceKind>,
}

impl SystemBus {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            devices: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn register(&mut self, kind: DeviceKind) {
        self.devices.push(kind);
    }

    pub fn devices(&self) -> &[DeviceKind] {
        &self.devices
    }

    fn find(&self, chips: &Chipset, addr: Address) -> Option<DeviceKind> {
        self.devices
            .iter()
            .copied()
            .find(|&kind| chips.decode(kind, addr))
    }

    pub fn read(&self, chips: &mut Chipset, addr: Address) -> u8 {
        match self.find(chips, addr) {
            Some(kind) => chips.read(kind, addr),
            // Open bus.
            None => 0xFF,
        }
    }

    pub fn write(&self, chips: &mut Chipset, addr: Address, value: u8) {
        if let Some(kind) = self.find(chips, addr) {
            chips.write(kind, addr, value);
        }
        // Writes to unmapped space are dropped.
    }

    pub fn read16(&self, chips: &mut Chipset, addr: Address) -> u16 {
        let lo = self.read(chips, addr) as u16;
        let hi = self.read(chips, addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    pub fn write16(&self, chips: &mut Chipset, addr: Address, value: u16) {
        self.write(chips, addr, (value & 0xFF) as u8);
        self.write(chips, addr.wrapping_add(1), (value >> 8) as u8);
    }
}

/// What a CPU core is handed for the duration of one instruction: its own
/// bus wiring plus mutable access to the chipset behind it.
pub struct BusPort<'a> {
    pub bus: &'a SystemBus,
    pub chips: &'a mut Chipset,
}

impl BusPort<'_> {
    pub fn read(&mut self, addr: Address) -> u8 {
        self.bus.read(self.chips, addr)
    }

    pub fn write(&mut self, addr: Address, value: u8) {
        self.bus.write(self.chips, addr, value)
    }

    pub fn read16(&mut self, addr: Address) -> u16 {
        self.bus.read16(self.chips, addr)
    }

    pub fn write16(&mut self, addr: Address, value: u16) {
        self.bus.write16(self.chips, addr, value)
    }
}
