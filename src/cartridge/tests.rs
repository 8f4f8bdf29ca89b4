use super::*;

/// Minimal ROM with a parseable header.
fn rom_with_header(size: usize) -> Vec<u8> {
    let mut rom = vec![0u8; size];
    // Entry points.
    rom[0] = 0x00;
    rom[1] = 0x80;
    rom[2] = 0x00; // main: $008000
    rom[3] = 0x00;
    rom[4] = 0x10;
    rom[5] = 0x00; // graphics: $001000
    rom[6] = 0x00;
    rom[7] = 0x00;
    rom[8] = 0x00; // sound: held in reset
    // Title + version.
    rom[18..18 + 4].copy_from_slice(b"SANO");
    rom[50] = 3;
    rom
}

#[test]
fn header_fields_parse() {
    let cart = Cartridge::from_bytes(rom_with_header(0x10000)).unwrap();
    let header = cart.header();
    assert_eq!(header.main_entry, 0x008000);
    assert_eq!(header.graphics_entry, 0x001000);
    assert_eq!(header.sound_entry, 0);
    assert_eq!(header.title, "SANO");
    assert_eq!(header.version, 3);
}

#[test]
fn empty_rom_is_rejected() {
    assert!(matches!(
        Cartridge::from_bytes(Vec::new()),
        Err(CartridgeError::Empty)
    ));
}

#[test]
fn undersized_rom_gets_default_header() {
    let cart = Cartridge::from_bytes(vec![0xEA; 16]).unwrap();
    assert_eq!(cart.header().main_entry, 0);
    assert_eq!(cart.header().title, "");
}

#[test]
fn reset_vector_reads_from_rom() {
    let mut rom = rom_with_header(0x10000);
    rom[0xFFFC] = 0x34;
    rom[0xFFFD] = 0x12;
    let mut cart = Cartridge::from_bytes(rom).unwrap();

    assert!(cart.decode(Address::from_flat(0x00FFFC)));
    assert_eq!(cart.read(Address::from_flat(0x00FFFC)), 0x34);
    assert_eq!(cart.read(Address::from_flat(0x00FFFD)), 0x12);
}

#[test]
fn mirror_reads_rom_by_flat_address() {
    let mut rom = rom_with_header(0x10000);
    rom[0x8000] = 0xC9;
    let mut cart = Cartridge::from_bytes(rom).unwrap();
    assert_eq!(cart.read(Address::from_flat(0x008000)), 0xC9);
    // Low RAM area is not claimed by the cartridge.
    assert!(!cart.decode(Address::from_flat(0x000000)));
    assert!(!cart.decode(Address::from_flat(0x007FFF)));
}

#[test]
fn bank_switching_selects_window_contents() {
    // 8 MB ROM: first byte of bank 0 and bank 1 differ.
    let mut rom = vec![0u8; 2 * BANK_SIZE];
    rom[0x000000] = 0xAA;
    rom[0x400000] = 0xBB;
    let mut cart = Cartridge::from_bytes(rom).unwrap();

    cart.write(Address::from_flat(BANK_REGISTER), 0);
    assert_eq!(cart.read(Address::from_flat(0xC00000)), 0xAA);
    cart.write(Address::from_flat(BANK_REGISTER), 1);
    assert_eq!(cart.read(Address::from_flat(0xC00000)), 0xBB);
}

#[test]
fn bank_register_takes_low_nibble() {
    let mut rom = vec![0u8; 2 * BANK_SIZE];
    rom[0x400000] = 0xBB;
    let mut cart = Cartridge::from_bytes(rom).unwrap();

    // 0x13 & 0x0F == 3; bank 3 is past the end of a 2-bank ROM, so the
    // window reads open bus, but the register itself holds 3.
    cart.write(Address::from_flat(BANK_REGISTER), 0x13);
    assert_eq!(cart.current_bank(), 3);
    assert_eq!(cart.read(Address::from_flat(0xC00000)), 0xFF);

    cart.write(Address::from_flat(BANK_REGISTER), 0x11);
    assert_eq!(cart.current_bank(), 1);
    assert_eq!(cart.read(Address::from_flat(0xC00000)), 0xBB);
}

#[test]
fn rom_window_reads_past_end_are_open_bus() {
    let mut cart = Cartridge::from_bytes(rom_with_header(0x10000)).unwrap();
    assert_eq!(cart.read(Address::from_flat(0xC10000)), 0xFF);
}

#[test]
fn rom_writes_are_ignored() {
    let mut cart = Cartridge::from_bytes(rom_with_header(0x10000)).unwrap();
    cart.write(Address::from_flat(0xC00000), 0x55);
    assert_eq!(cart.read(Address::from_flat(0xC00000)), 0x00);
}

#[test]
fn save_ram_is_lazy_and_persists_writes() {
    let mut cart = Cartridge::from_bytes(rom_with_header(0x10000)).unwrap();
    assert!(!cart.has_save_ram());
    // Untouched battery RAM reads as 0xFF even before allocation.
    assert_eq!(cart.read(Address::from_flat(SAVE_RAM_START)), 0xFF);

    cart.write(Address::from_flat(SAVE_RAM_START + 0x10), 0x42);
    assert!(cart.has_save_ram());
    assert_eq!(cart.read(Address::from_flat(SAVE_RAM_START + 0x10)), 0x42);
    assert_eq!(cart.read(Address::from_flat(SAVE_RAM_START + 0x11)), 0xFF);
}

#[test]
fn bank_count_rounds_up() {
    let cart = Cartridge::from_bytes(vec![0; BANK_SIZE + 1]).unwrap();
    assert_eq!(cart.bank_count(), 2);
    assert_eq!(cart.rom_size(), BANK_SIZE + 1);
    let cart = Cartridge::from_bytes(vec![0; 0x10000]).unwrap();
    assert_eq!(cart.bank_count(), 1);
}

#[test]
fn save_ram_file_round_trip_keeps_tail_at_ff() {
    let path = std::env::temp_dir().join("sano-cart-save.sav");
    let mut cart = Cartridge::from_bytes(rom_with_header(0x10000)).unwrap();
    cart.write(Address::from_flat(SAVE_RAM_START), 0x42);
    cart.save_save(&path).unwrap();

    // A short save file fills only its prefix; the rest stays 0xFF.
    std::fs::write(&path, [0x7A, 0x7B]).unwrap();
    let mut other = Cartridge::from_bytes(rom_with_header(0x10000)).unwrap();
    other.load_save(&path).unwrap();
    assert_eq!(other.read(Address::from_flat(SAVE_RAM_START)), 0x7A);
    assert_eq!(other.read(Address::from_flat(SAVE_RAM_START + 1)), 0x7B);
    assert_eq!(other.read(Address::from_flat(SAVE_RAM_START + 2)), 0xFF);
    std::fs::remove_file(&path).ok();
}
