use super::*;
use crate::cartridge::{Cartridge, BANK_REGISTER};
use crate::cpld1::CPLD1_BASE;
use crate::cpld2::CPLD2_BASE;
use crate::cpld3::CPLD3_BASE;

fn main_bus() -> SystemBus {
    let mut bus = SystemBus::new("main");
    bus.register(DeviceKind::MainRam);
    bus.register(DeviceKind::Cpld2);
    bus.register(DeviceKind::Cpld3);
    bus.register(DeviceKind::MailboxA);
    bus.register(DeviceKind::MailboxB);
    bus.register(DeviceKind::Cartridge);
    bus
}

fn chipset_with_rom(rom: Vec<u8>) -> Chipset {
    let mut chips = Chipset::new();
    chips.cartridge = Some(Cartridge::from_bytes(rom).unwrap());
    chips
}

#[test]
fn first_registered_claimant_wins() {
    // Main RAM and the cartridge mirror both claim $008000; RAM is
    // registered first, so RAM wins.
    let bus = main_bus();
    let mut rom = vec![0u8; 0x10000];
    rom[0x8000] = 0xC9;
    let mut chips = chipset_with_rom(rom);

    let addr = Address::from_flat(0x008000);
    assert_eq!(bus.read(&mut chips, addr), 0x00); // RAM, zero-initialised
    bus.write(&mut chips, addr, 0x77);
    assert_eq!(bus.read(&mut chips, addr), 0x77);
    // The cartridge still sees its own byte when asked directly.
    assert_eq!(chips.read(DeviceKind::Cartridge, addr), 0xC9);
}

#[test]
fn unmapped_reads_are_open_bus_and_writes_dropped() {
    let bus = main_bus();
    let mut chips = Chipset::new(); // no cartridge

    let hole = Address::from_flat(0x500000);
    assert_eq!(bus.read(&mut chips, hole), 0xFF);
    bus.write(&mut chips, hole, 0x12);
    assert_eq!(bus.read(&mut chips, hole), 0xFF);

    // The ROM window decodes to nothing while the slot is empty.
    assert_eq!(bus.read(&mut chips, Address::from_flat(0xC00000)), 0xFF);
}

#[test]
fn cpld_windows_decode_ahead_of_mailbox_a() {
    let bus = main_bus();
    let mut chips = Chipset::new();

    // CPLD2 register $00 (video mode) lives inside mailbox A's range.
    let mode = Address::from_flat(CPLD2_BASE);
    bus.write(&mut chips, mode, 0x02);
    assert_eq!(chips.cpld2.render_mode(), 0x02);
    assert!(!chips.mailbox_a.has_new_data());

    // CPLD3 likewise.
    let scroll = Address::from_flat(CPLD3_BASE);
    bus.write(&mut chips, scroll, 0x15);
    assert_eq!(bus.read(&mut chips, scroll), 0x15);

    // Outside the CPLD windows, mailbox A still answers.
    let slot = Address::from_flat(MAILBOX_A_BASE + 0x10);
    bus.write(&mut chips, slot, 0xAB);
    assert!(chips.mailbox_a.has_new_data());
    assert_eq!(bus.read(&mut chips, slot), 0xAB);
}

#[test]
fn mailbox_writes_raise_events_in_order() {
    let bus = main_bus();
    let mut chips = Chipset::new();

    bus.write(&mut chips, Address::from_flat(MAILBOX_A_BASE), 0x11);
    bus.write(&mut chips, Address::from_flat(MAILBOX_B_BASE), 0x22);
    bus.write(&mut chips, Address::from_flat(MAILBOX_A_BASE + 1), 0x33);

    assert_eq!(
        chips.take_events(),
        vec![
            BusEvent::MailboxWritten(MailboxSide::A),
            BusEvent::MailboxWritten(MailboxSide::B),
            BusEvent::MailboxWritten(MailboxSide::A),
        ]
    );
    assert!(!chips.has_events());

    // Reads raise nothing.
    bus.read(&mut chips, Address::from_flat(MAILBOX_A_BASE));
    assert!(!chips.has_events());
}

#[test]
fn bank_register_reaches_the_cartridge_through_the_bus() {
    let bus = main_bus();
    let mut rom = vec![0u8; 2 * crate::cartridge::BANK_SIZE];
    rom[0x000000] = 0xAA;
    rom[0x400000] = 0xBB;
    let mut chips = chipset_with_rom(rom);

    let window = Address::from_flat(0xC00000);
    assert_eq!(bus.read(&mut chips, window), 0xAA);
    bus.write(&mut chips, Address::from_flat(BANK_REGISTER), 0x01);
    assert_eq!(bus.read(&mut chips, window), 0xBB);
}

#[test]
fn sixteen_bit_helpers_are_little_endian() {
    let bus = main_bus();
    let mut chips = Chipset::new();

    bus.write16(&mut chips, Address::from_flat(0x001000), 0x1234);
    assert_eq!(bus.read(&mut chips, Address::from_flat(0x001000)), 0x34);
    assert_eq!(bus.read(&mut chips, Address::from_flat(0x001001)), 0x12);
    assert_eq!(bus.read16(&mut chips, Address::from_flat(0x001000)), 0x1234);
}

#[test]
fn graphics_bus_only_sees_its_own_devices() {
    let mut bus = SystemBus::new("graphics");
    bus.register(DeviceKind::GraphicsRam);
    bus.register(DeviceKind::MailboxA);
    bus.register(DeviceKind::Cartridge);
    let mut chips = Chipset::new();

    // Graphics RAM spans 256 KB.
    bus.write(&mut chips, Address::from_flat(0x03FFFF), 0x9C);
    assert_eq!(chips.graphics_ram.peek(0x3FFFF), 0x9C);

    // Mailbox B and the main-bus CPLD windows are not wired here.
    assert_eq!(bus.read(&mut chips, Address::from_flat(MAILBOX_B_BASE)), 0xFF);
    assert_eq!(bus.read(&mut chips, Address::from_flat(CPLD2_BASE)), 0x00);
    // ^ CPLD2's window is inside mailbox A's range, so mailbox A answers.
    assert!(chips.mailbox_a.decode(Address::from_flat(CPLD2_BASE)));
}

#[test]
fn sound_bus_reaches_the_fifo_serializer() {
    let mut bus = SystemBus::new("sound");
    bus.register(DeviceKind::SoundRam);
    bus.register(DeviceKind::Cpld1);
    bus.register(DeviceKind::MailboxB);
    bus.register(DeviceKind::Cartridge);
    let mut chips = Chipset::new();

    bus.write(&mut chips, Address::from_flat(CPLD1_BASE), 0x40);
    assert_eq!(chips.cpld1.fifo_level(0), 1);
    assert_eq!(bus.read(&mut chips, Address::from_flat(CPLD1_BASE + 0x10)), 1);
}
