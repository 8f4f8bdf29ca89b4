use log::debug;

use crate::addr::Address;
use crate::bus::BusDevice;
use crate::mailbox::{Mailbox, MailboxAction, CMD_BOOT_COPY};
use crate::ram::Ram;

pub const CPLD2_BASE: u32 = 0x400200;
pub const CPLD2_SIZE: u32 = 0x40;

pub const PIXELS_PER_LINE: u16 = 857;
pub const LINES_PER_FRAME_240P: u16 = 262;
pub const LINES_PER_FRAME_480I: u16 = 525;

const HBLANK_END: u16 = 137;
const VBLANK_LINES: u16 = 22;

pub const TILE_LAYERS: usize = 6;
const LAYER_CONFIG_BASE: u32 = 0x10;
const LAYER_CONFIG_STRIDE: u32 = 8;

/// Video mode register bits: low two bits select the render mode, bit 2
/// selects interlaced (480i) timing.
pub const MODE_RENDER_MASK: u8 = 0x03;
pub const MODE_INTERLACE: u8 = 0x04;

/// Per-layer configuration decoded from the CPLD2 register file.
#[derive(Clone, Copy, Debug, Default)]
pub struct LayerConfig {
    pub scroll_x: u16,
    pub scroll_y: u16,
    pub control: u8,
    pub priority: u8,
}

impl LayerConfig {
    /// Bits 0-1 of control: 0 = 2 bpp, 1 = 4 bpp, 2 = 8 bpp.
    pub fn bpp_index(self) -> u8 {
        self.control & 0x03
    }

    /// Tile edge in pixels: 8 or 16.
    pub fn tile_size(self) -> u16 {
        if self.control & 0x04 != 0 { 16 } else { 8 }
    }

    /// Map edge in tiles: 32 or 64.
    pub fn map_width(self) -> u16 {
        if self.control & 0x08 != 0 { 64 } else { 32 }
    }

    pub fn palette_bank(self) -> u8 {
        (self.control >> 4) & 0x0F
    }
}

/// CPLD #2: video timing generator and VRAM arbiter.
///
/// Tracks the raster beam at pixel-clock rate, raises the vblank interrupt
/// at frame wrap, arbitrates Graphics-CPU VRAM access against the raster
/// engine, and runs the mailbox-A boot handler that copies boot code into
/// Graphics RAM and releases the Graphics CPU.
///
/// Register window `$400200-$40023F` (main CPU bus): mode and layer-enable,
/// read-only raster position and blanking status, vblank IRQ clear, global
/// brightness/tint, and six 8-byte per-layer configuration slots at `$10`.
pub struct Cpld2Video {
    video_mode: u8,
    layer_enable: u8,
    brightness: u8,
    tint: [i8; 3],
    layer_config: [u8; TILE_LAYERS * LAYER_CONFIG_STRIDE as usize],
    raster_line: u16,
    raster_x: u16,
    in_vblank: bool,
    in_hblank: bool,
    vblank_irq_pending: bool,
}

impl Cpld2Video {
    pub fn new() -> Self {
        Self {
            video_mode: 0,
            layer_enable: 0,
            brightness: 31,
            tint: [0; 3],
            layer_config: [0; TILE_LAYERS * LAYER_CONFIG_STRIDE as usize],
            raster_line: 0,
            raster_x: 0,
            in_vblank: true,
            in_hblank: true,
            vblank_irq_pending: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn video_mode(&self) -> u8 {
        self.video_mode
    }

    pub fn render_mode(&self) -> u8 {
        self.video_mode & MODE_RENDER_MASK
    }

    pub fn is_interlaced(&self) -> bool {
        self.video_mode & MODE_INTERLACE != 0
    }

    pub fn layer_enable(&self) -> u8 {
        self.layer_enable
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn tint(&self) -> [i8; 3] {
        self.tint
    }

    pub fn layer_config(&self, layer: usize) -> LayerConfig {
        let base = layer * LAYER_CONFIG_STRIDE as usize;
        let reg = |i: usize| self.layer_config[base + i];
        LayerConfig {
            scroll_x: reg(0) as u16 | (reg(1) as u16) << 8,
            scroll_y: reg(2) as u16 | (reg(3) as u16) << 8,
            control: reg(4),
            priority: reg(5),
        }
    }

    pub fn raster_line(&self) -> u16 {
        self.raster_line
    }

    pub fn raster_x(&self) -> u16 {
        self.raster_x
    }

    pub fn is_in_vblank(&self) -> bool {
        self.in_vblank
    }

    pub fn is_in_hblank(&self) -> bool {
        self.in_hblank
    }

    /// The Graphics CPU may touch VRAM only while the beam is blanked. The
    /// flag is advisory: the renderer reads VRAM at frame end, after the
    /// Graphics CPU has exhausted its budget.
    pub fn allow_gcpu_vram_access(&self) -> bool {
        self.in_hblank || self.in_vblank
    }

    pub fn total_lines(&self) -> u16 {
        if self.is_interlaced() {
            LINES_PER_FRAME_480I
        } else {
            LINES_PER_FRAME_240P
        }
    }

    /// Advance one pixel clock. Returns true when the frame wrapped and the
    /// vblank interrupt fired (once per pending period).
    pub fn tick(&mut self) -> bool {
        let mut fired = false;

        self.raster_x += 1;
        if self.raster_x >= PIXELS_PER_LINE {
            self.raster_x = 0;
            self.raster_line += 1;
            if self.raster_line >= self.total_lines() {
                self.raster_line = 0;
                if !self.vblank_irq_pending {
                    self.vblank_irq_pending = true;
                    fired = true;
                }
            }
        }

        self.update_blanking();
        fired
    }

    fn update_blanking(&mut self) {
        self.in_hblank = self.raster_x <= HBLANK_END;
        self.in_vblank = if self.is_interlaced() {
            // Per-field blanking.
            self.raster_line < VBLANK_LINES
                || (self.raster_line >= LINES_PER_FRAME_240P
                    && self.raster_line < LINES_PER_FRAME_240P + VBLANK_LINES)
        } else {
            self.raster_line < VBLANK_LINES
        };
    }

    /// Mailbox A was written. Execute a boot-copy into Graphics RAM, or
    /// report plain traffic for the machine to turn into a Graphics CPU IRQ.
    pub fn on_mailbox_write(
        &mut self,
        mailbox: &mut Mailbox,
        graphics_ram: &mut Ram,
    ) -> MailboxAction {
        if mailbox.read_offset(0) != CMD_BOOT_COPY {
            return MailboxAction::Notify;
        }

        mailbox.set_busy(true);
        let dest = mailbox.read_offset(1) as u16 | (mailbox.read_offset(2) as u16) << 8;
        let len = mailbox.read_offset(3) as u16 | (mailbox.read_offset(4) as u16) << 8;
        for i in 0..len {
            let byte = mailbox.read_offset(5 + i as usize);
            graphics_ram.poke(dest.wrapping_add(i) as usize, byte);
        }
        mailbox.set_busy(false);

        debug!("cpld2: boot copy of {len} byte(s) into graphics RAM ${dest:04X}");
        MailboxAction::BootCopied { dest, len }
    }
}

impl Default for Cpld2Video {
    fn default() -> Self {
        Self::new()
    }
}

impl BusDevice for Cpld2Video {
    fn decode(&self, addr: Address) -> bool {
        let flat = addr.flat();
        flat >= CPLD2_BASE && flat < CPLD2_BASE + CPLD2_SIZE
    }

    fn read(&mut self, addr: Address) -> u8 {
        let offset = addr.flat() - CPLD2_BASE;
        match offset {
            0x00 => self.video_mode,
            0x01 => self.layer_enable,
            0x02 => (self.raster_line & 0xFF) as u8,
            0x03 => (self.raster_line >> 8) as u8,
            0x04 => (self.raster_x & 0xFF) as u8,
            0x05 => (self.raster_x >> 8) as u8,
            0x06 => self.in_vblank as u8,
            0x08 => self.in_hblank as u8,
            0x0C => self.brightness,
            0x0D => self.tint[0] as u8,
            0x0E => self.tint[1] as u8,
            0x0F => self.tint[2] as u8,
            LAYER_CONFIG_BASE..=0x3F => self.layer_config[(offset - LAYER_CONFIG_BASE) as usize],
            _ => 0x00,
        }
    }

    fn write(&mut self, addr: Address, value: u8) {
        let offset = addr.flat() - CPLD2_BASE;
        match offset {
            0x00 => {
                self.video_mode = value & (MODE_RENDER_MASK | MODE_INTERLACE);
                self.update_blanking();
            }
            0x01 => self.layer_enable = value,
            0x0A => {
                if value != 0 {
                    self.vblank_irq_pending = false;
                }
            }
            0x0C => self.brightness = value & 0x1F,
            0x0D => self.tint[0] = value as i8,
            0x0E => self.tint[1] = value as i8,
            0x0F => self.tint[2] = value as i8,
            LAYER_CONFIG_BASE..=0x3F => {
                self.layer_config[(offset - LAYER_CONFIG_BASE) as usize] = value;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(offset: u32) -> Address {
        Address::from_flat(CPLD2_BASE + offset)
    }

    #[test]
    fn full_240p_frame_of_ticks_returns_to_origin_with_one_vblank() {
        let mut cpld = Cpld2Video::new();
        let mut vblanks = 0;
        for _ in 0..(PIXELS_PER_LINE as u32 * LINES_PER_FRAME_240P as u32) {
            if cpld.tick() {
                vblanks += 1;
            }
        }
        assert_eq!(cpld.raster_line(), 0);
        assert_eq!(cpld.raster_x(), 0);
        assert_eq!(vblanks, 1);
    }

    #[test]
    fn vblank_irq_does_not_refire_until_cleared() {
        let mut cpld = Cpld2Video::new();
        let frame = PIXELS_PER_LINE as u32 * LINES_PER_FRAME_240P as u32;
        let mut vblanks = 0;
        for _ in 0..frame * 2 {
            if cpld.tick() {
                vblanks += 1;
            }
        }
        assert_eq!(vblanks, 1);

        cpld.write(reg(0x0A), 0x01);
        for _ in 0..frame {
            if cpld.tick() {
                vblanks += 1;
            }
        }
        assert_eq!(vblanks, 2);
    }

    #[test]
    fn blanking_flags_track_the_beam() {
        let mut cpld = Cpld2Video::new();
        assert!(cpld.is_in_vblank());
        assert!(cpld.is_in_hblank());

        // Advance to the first active-line pixel past hblank.
        for _ in 0..(PIXELS_PER_LINE as u32 * 22 + 138) {
            cpld.tick();
        }
        assert_eq!(cpld.raster_line(), 22);
        assert_eq!(cpld.raster_x(), 138);
        assert!(!cpld.is_in_vblank());
        assert!(!cpld.is_in_hblank());
        assert!(!cpld.allow_gcpu_vram_access());

        // Wrap to the next line: back in hblank.
        for _ in 0..(PIXELS_PER_LINE - 138) {
            cpld.tick();
        }
        assert_eq!(cpld.raster_x(), 0);
        assert!(cpld.is_in_hblank());
        assert!(cpld.allow_gcpu_vram_access());
    }

    #[test]
    fn interlaced_mode_doubles_the_frame() {
        let mut cpld = Cpld2Video::new();
        cpld.write(reg(0x00), MODE_INTERLACE | 0x01);
        assert!(cpld.is_interlaced());
        assert_eq!(cpld.render_mode(), 1);
        assert_eq!(cpld.total_lines(), LINES_PER_FRAME_480I);

        // Second field's blanking window.
        for _ in 0..(PIXELS_PER_LINE as u32 * 262) {
            cpld.tick();
        }
        assert_eq!(cpld.raster_line(), 262);
        assert!(cpld.is_in_vblank());
    }

    #[test]
    fn raster_position_registers_read_little_endian() {
        let mut cpld = Cpld2Video::new();
        for _ in 0..(PIXELS_PER_LINE as u32 * 300 + 5) {
            cpld.tick();
        }
        // 300 lines wraps at 262 in progressive timing.
        let line = cpld.read(reg(0x02)) as u16 | (cpld.read(reg(0x03)) as u16) << 8;
        let x = cpld.read(reg(0x04)) as u16 | (cpld.read(reg(0x05)) as u16) << 8;
        assert_eq!(line, 300 - 262);
        assert_eq!(x, 5);
    }

    #[test]
    fn layer_config_round_trips_through_registers() {
        let mut cpld = Cpld2Video::new();
        let base = 0x10 + 8 * 2; // layer 2 (FG0)
        cpld.write(reg(base), 0x34);
        cpld.write(reg(base + 1), 0x01); // scroll X = 0x134
        cpld.write(reg(base + 2), 0x08); // scroll Y = 8
        cpld.write(reg(base + 4), 0b1010_0110); // 8bpp? control bits
        cpld.write(reg(base + 5), 7);

        let config = cpld.layer_config(2);
        assert_eq!(config.scroll_x, 0x134);
        assert_eq!(config.scroll_y, 0x008);
        assert_eq!(config.bpp_index(), 2);
        assert_eq!(config.tile_size(), 16);
        assert_eq!(config.map_width(), 32);
        assert_eq!(config.palette_bank(), 0x0A);
        assert_eq!(config.priority, 7);
        assert_eq!(cpld.read(reg(base)), 0x34);
    }

    #[test]
    fn boot_copy_lands_in_graphics_ram_and_reports_release() {
        let mut cpld = Cpld2Video::new();
        let mut mailbox = Mailbox::new(0x400000, 0x400, "mailbox A");
        let mut ram = Ram::new(0, 0x40000, "graphics RAM");

        for (i, byte) in [0x01, 0x00, 0x10, 0x03, 0x00, 0xDE, 0xAD, 0xBE]
            .into_iter()
            .enumerate()
        {
            mailbox.write(Address::from_flat(0x400000 + i as u32), byte);
        }

        let action = cpld.on_mailbox_write(&mut mailbox, &mut ram);
        assert_eq!(action, MailboxAction::BootCopied { dest: 0x1000, len: 3 });
        assert_eq!(ram.peek(0x1000), 0xDE);
        assert_eq!(ram.peek(0x1001), 0xAD);
        assert_eq!(ram.peek(0x1002), 0xBE);
    }
}
