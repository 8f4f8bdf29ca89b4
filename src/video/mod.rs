mod render;


use crate::bus::Chipset;
use crate::machine::env;
use crate::ram::Ram;

pub const WIDTH: usize = 320;
pub const HEIGHT: usize = 240;

/// VRAM layout (byte offsets into Graphics RAM).
pub const FRAMEBUFFER_BASE: u32 = 0x000000;
pub const SPRITE_OAM: u32 = 0x013000;
pub const PALETTE_RAM: u32 = 0x014000;
pub const TILEMAP_BG0: u32 = 0x015000;
pub const TILEMAP_BG1: u32 = 0x017000;
pub const TILEMAP_FG0: u32 = 0x019000;
pub const TILEMAP_FG1: u32 = 0x01B000;
pub const TILEMAP_HUD: u32 = 0x01D000;
/// Sixth tilemap, used by the max-layers render mode in place of sprites.
pub const TILEMAP_EXT: u32 = 0x01F000;
pub const TILE_DATA: u32 = 0x020000;

pub const SPRITE_COUNT: usize = 512;
pub const MAX_SPRITES_PER_LINE: usize = 128;

/// Buffer slot the sprite line shares with the EXT tilemap.
pub(crate) const SPRITE_SLOT: usize = 5;

/// One OAM entry, 8 bytes, cached out of VRAM once per frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sprite {
    pub x: u16,
    pub y: u16,
    pub tile: u8,
    /// Low nibble alpha (0-15), high nibble palette bank.
    pub attributes: u8,
    /// Bit 0 enable, bit 1 rotate, bit 2 hflip, bit 3 vflip, bits 4-5 size.
    pub flags: u8,
    pub priority: u8,
}

impl Sprite {
    pub fn enabled(self) -> bool {
        self.flags & 0x01 != 0
    }

    pub fn rotate(self) -> bool {
        self.flags & 0x02 != 0
    }

    pub fn hflip(self) -> bool {
        self.flags & 0x04 != 0
    }

    pub fn vflip(self) -> bool {
        self.flags & 0x08 != 0
    }

    /// Edge length in pixels: 8, 16, 32 or 64. Sprites are square.
    pub fn size(self) -> u16 {
        8 << ((self.flags >> 4) & 0x03)
    }

    pub fn pal_bank(self) -> u8 {
        (self.attributes >> 4) & 0x0F
    }

    pub fn alpha(self) -> u8 {
        self.attributes & 0x0F
    }
}

/// One scanline's worth of a layer before compositing: palette index,
/// priority and alpha per pixel. Color 0 means nothing was drawn.
pub(crate) struct LineBuffer {
    pub color: [u8; WIDTH],
    pub priority: [u8; WIDTH],
    pub alpha: [u8; WIDTH],
}

impl LineBuffer {
    const fn new() -> Self {
        Self {
            color: [0; WIDTH],
            priority: [0; WIDTH],
            alpha: [16; WIDTH],
        }
    }

    fn clear(&mut self) {
        self.color.fill(0);
        self.priority.fill(0);
        self.alpha.fill(16);
    }
}

/// Scanline compositor for the raster pipeline: five tilemap layers plus
/// sprites (or six tilemaps), palette and sprite caches, global post
/// effects, and a direct-framebuffer mode.
///
/// The renderer replays a whole frame from VRAM after the CPUs have spent
/// their budgets; the CPLD2 VRAM-arbitration flag is advisory.
pub struct VideoRenderer {
    framebuffer: Vec<u32>,
    layers: [LineBuffer; 6],
    palette_rgba: [u32; 256],
    palette_dirty: bool,
    sprites: [Sprite; SPRITE_COUNT],
    sprite_cache_dirty: bool,
}

impl VideoRenderer {
    pub fn new() -> Self {
        let mut renderer = Self {
            framebuffer: vec![0xFF000000; WIDTH * HEIGHT],
            layers: [
                LineBuffer::new(),
                LineBuffer::new(),
                LineBuffer::new(),
                LineBuffer::new(),
                LineBuffer::new(),
                LineBuffer::new(),
            ],
            palette_rgba: [0; 256],
            palette_dirty: true,
            sprites: [Sprite::default(); SPRITE_COUNT],
            sprite_cache_dirty: true,
        };
        renderer.reset();
        renderer
    }

    pub fn reset(&mut self) {
        self.framebuffer.fill(0xFF000000);
        // Grayscale ramp until the guest uploads a palette.
        for (i, slot) in self.palette_rgba.iter_mut().enumerate() {
            let v = i as u32;
            *slot = 0xFF000000 | (v << 16) | (v << 8) | v;
        }
        self.palette_dirty = true;
        self.sprite_cache_dirty = true;
        for layer in &mut self.layers {
            layer.clear();
        }
    }

    pub fn framebuffer(&self) -> &[u32] {
        &self.framebuffer
    }

    pub fn width(&self) -> usize {
        WIDTH
    }

    pub fn height(&self) -> usize {
        HEIGHT
    }

    /// Drop the palette and sprite caches; the next scanline rebuilds them
    /// from VRAM. Called once per frame before rendering, since the guest
    /// may have rewritten either table during the frame.
    pub fn invalidate_caches(&mut self) {
        self.palette_dirty = true;
        self.sprite_cache_dirty = true;
    }

    pub fn render_frame(&mut self, chips: &Chipset) {
        for line in 0..HEIGHT as u16 {
            self.render_scanline(chips, line);
        }
    }

    pub fn render_scanline(&mut self, chips: &Chipset, line: u16) {
        let vram = &chips.graphics_ram;

        // The palette cache is refreshed regardless of mode.
        if self.palette_dirty {
            self.update_palette_cache(vram);
            self.palette_dirty = false;
        }

        let mode = env::force_video_mode().unwrap_or_else(|| chips.cpld2.render_mode());
        if mode == 0 {
            self.render_framebuffer_mode(vram, line);
            return;
        }

        if self.sprite_cache_dirty {
            self.update_sprite_cache(vram);
            self.sprite_cache_dirty = false;
        }

        for layer in &mut self.layers {
            layer.clear();
        }

        let layer_enable = chips.cpld2.layer_enable();
        let effects = chips.cpld3.effects_for_line(line);

        // Tilemap layers BG0, BG1, FG0, FG1, HUD; the mode decides how many
        // are live and whether slot 5 carries sprites or the EXT tilemap.
        let tile_layers: usize = match mode {
            3 => 2,
            _ => 5,
        };
        for layer in 0..tile_layers {
            if layer_enable & (1 << layer) != 0 {
                self.render_tile_layer(chips, line, layer, layer, effects);
            }
        }
        match mode {
            1 => {
                if layer_enable & 0x20 != 0 {
                    self.render_sprites_on_line(vram, line);
                }
            }
            2 => {
                if layer_enable & 0x20 != 0 {
                    self.render_tile_layer(chips, line, SPRITE_SLOT, SPRITE_SLOT, effects);
                }
            }
            _ => {}
        }

        self.composite_line(line);
        self.apply_effects(chips, line);
    }

    fn update_palette_cache(&mut self, vram: &Ram) {
        for i in 0..256 {
            let rgb565 = vram.peek16((PALETTE_RAM as usize) + i * 2);
            self.palette_rgba[i] = rgb565_to_rgba8888(rgb565);
        }
    }

    fn update_sprite_cache(&mut self, vram: &Ram) {
        for (i, sprite) in self.sprites.iter_mut().enumerate() {
            let base = SPRITE_OAM as usize + i * 8;
            *sprite = Sprite {
                x: vram.peek16(base),
                y: vram.peek16(base + 2),
                tile: vram.peek(base + 4),
                attributes: vram.peek(base + 5),
                flags: vram.peek(base + 6),
                priority: vram.peek(base + 7),
            };
        }
    }
}

impl Default for VideoRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Expand RGB565 to RGBA8888. Five-bit channels widen as `(c << 3) | (c >> 2)`,
/// the six-bit green as `(g << 2) | (g >> 4)`. The packed word carries red in
/// the low byte, so the in-memory byte order on little-endian hosts is RGBA.
pub fn rgb565_to_rgba8888(rgb565: u16) -> u32 {
    let r5 = (rgb565 >> 11) & 0x1F;
    let g6 = (rgb565 >> 5) & 0x3F;
    let b5 = rgb565 & 0x1F;

    let r = ((r5 << 3) | (r5 >> 2)) as u32;
    let g = ((g6 << 2) | (g6 >> 4)) as u32;
    let b = ((b5 << 3) | (b5 >> 2)) as u32;

    0xFF000000 | (b << 16) | (g << 8) | r
}
