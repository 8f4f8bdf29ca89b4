use super::*;
use crate::cpld3::LineEffects;

const TILEMAP_BASES: [u32; 6] = [
    TILEMAP_BG0,
    TILEMAP_BG1,
    TILEMAP_FG0,
    TILEMAP_FG1,
    TILEMAP_HUD,
    TILEMAP_EXT,
];

impl VideoRenderer {
    /// Mode 0: the low 76,800 bytes of VRAM are an 8 bpp indexed
    /// framebuffer, copied straight through the palette.
    pub(super) fn render_framebuffer_mode(&mut self, vram: &Ram, line: u16) {
        let src = FRAMEBUFFER_BASE as usize + line as usize * WIDTH;
        let dst = line as usize * WIDTH;
        for x in 0..WIDTH {
            let index = vram.peek(src + x);
            self.framebuffer[dst + x] = self.palette_rgba[index as usize];
        }
    }

    pub(super) fn render_tile_layer(
        &mut self,
        chips: &Chipset,
        line: u16,
        config_index: usize,
        slot: usize,
        effects: LineEffects,
    ) {
        let vram = &chips.graphics_ram;
        let config = chips.cpld2.layer_config(config_index);
        let tilemap_base = TILEMAP_BASES[config_index] as usize;

        let tile_size = config.tile_size();
        let map_width = config.map_width();
        let bpp = config.bpp_index();
        let priority = config.priority;

        // Tile geometry for the fetch: packed rows, so the byte stride per
        // row shrinks with the bit depth.
        let bytes_per_tile = match bpp {
            0 => (tile_size * tile_size / 4) as usize,
            1 => (tile_size * tile_size / 2) as usize,
            _ => (tile_size * tile_size) as usize,
        };

        let world_y = line.wrapping_add(config.scroll_y) & 0x1FF;
        let tile_y = (world_y / tile_size) as usize;
        let pixel_y = world_y % tile_size;

        let buffer = &mut self.layers[slot];

        for screen_x in 0..WIDTH {
            // The raster CPLD's per-line offset rides on top of the layer
            // scroll; the world wraps at 512 pixels.
            let world_x = (screen_x as i32
                + config.scroll_x as i32
                + effects.scroll_offset as i32)
                & 0x1FF;
            let world_x = world_x as u16;
            let tile_x = (world_x / tile_size) as usize;
            let pixel_x = world_x % tile_size;

            let entry_addr = tilemap_base + (tile_y * map_width as usize + tile_x) * 2;
            let entry = vram.peek16(entry_addr);
            let tile_num = (entry & 0x3FF) as usize;
            let hflip = entry & 0x0400 != 0;
            let vflip = entry & 0x0800 != 0;
            let tile_bank = ((entry >> 12) & 0x0F) as u8;

            let px = (if hflip { tile_size - 1 - pixel_x } else { pixel_x }) as usize;
            let py = (if vflip { tile_size - 1 - pixel_y } else { pixel_y }) as usize;

            let tile_addr = TILE_DATA as usize + tile_num * bytes_per_tile;
            let width = tile_size as usize;

            let pixel = match bpp {
                0 => {
                    let byte = vram.peek(tile_addr + py * (width / 4) + px / 4);
                    (byte >> ((3 - (px % 4)) * 2)) & 0x03
                }
                1 => {
                    let byte = vram.peek(tile_addr + py * (width / 2) + px / 2);
                    if px & 1 != 0 {
                        byte & 0x0F
                    } else {
                        byte >> 4
                    }
                }
                _ => vram.peek(tile_addr + py * width + px),
            };

            // Pixel value 0 is transparent, before any bank is applied.
            if pixel == 0 {
                continue;
            }

            let color = if bpp == 2 {
                // 8 bpp indexes the full palette directly.
                pixel
            } else {
                let bank = if effects.palette_select != 0 {
                    effects.palette_select & 0x0F
                } else if tile_bank != 0 {
                    tile_bank
                } else {
                    config.palette_bank()
                };
                pixel | (bank << 4)
            };

            buffer.color[screen_x] = color;
            buffer.priority[screen_x] = priority;
            buffer.alpha[screen_x] = 16;
        }
    }

    /// Sprites walk OAM from index 511 down to 0 so that, with the `>=`
    /// priority test, low OAM indices win ties. At most 128 sprites land on
    /// any one line; the rest are dropped.
    pub(super) fn render_sprites_on_line(&mut self, vram: &Ram, line: u16) {
        let buffer = &mut self.layers[SPRITE_SLOT];
        let mut sprites_on_line = 0;

        for index in (0..SPRITE_COUNT).rev() {
            let sprite = self.sprites[index];
            if !sprite.enabled() {
                continue;
            }

            let size = sprite.size();
            let top = sprite.y as u32;
            if (line as u32) < top || (line as u32) >= top + size as u32 {
                continue;
            }
            if sprites_on_line >= MAX_SPRITES_PER_LINE {
                break;
            }
            sprites_on_line += 1;

            let mut sprite_y = line - sprite.y;
            if sprite.vflip() {
                sprite_y = size - 1 - sprite_y;
            }

            // Fixed 8x8 8 bpp cell stride; larger sprites repeat the cell.
            let tile_addr = TILE_DATA as usize + sprite.tile as usize * 64;

            for sx in 0..size {
                let screen_x = sprite.x as usize + sx as usize;
                if screen_x >= WIDTH {
                    continue;
                }

                let sprite_x = if sprite.hflip() { size - 1 - sx } else { sx };

                let pixel_addr =
                    tile_addr + (sprite_y % 8) as usize * 8 + (sprite_x % 8) as usize;
                let raw = vram.peek(pixel_addr);
                if raw & 0x0F == 0 {
                    continue;
                }
                let color = (raw & 0x0F) | (sprite.pal_bank() << 4);

                if sprite.priority >= buffer.priority[screen_x] {
                    buffer.color[screen_x] = color;
                    buffer.priority[screen_x] = sprite.priority;
                    buffer.alpha[screen_x] = sprite.alpha();
                }
            }
        }
    }

    /// Resolve the six line buffers into RGBA. The backdrop is palette
    /// index 0; an opaque winner replaces the accumulator, a translucent
    /// one blends over it.
    pub(super) fn composite_line(&mut self, line: u16) {
        let row = line as usize * WIDTH;
        for x in 0..WIDTH {
            let mut resolved = self.palette_rgba[0];
            let mut priority = 0u8;

            for layer in &self.layers {
                let color = layer.color[x];
                if color == 0 {
                    continue;
                }
                if layer.priority[x] >= priority {
                    let front = self.palette_rgba[color as usize];
                    resolved = if layer.alpha[x] >= 16 {
                        front
                    } else {
                        blend_alpha(front, resolved, layer.alpha[x])
                    };
                    priority = layer.priority[x];
                }
            }

            self.framebuffer[row + x] = resolved;
        }
    }

    /// Global brightness (31 = identity) and per-channel signed tint.
    pub(super) fn apply_effects(&mut self, chips: &Chipset, line: u16) {
        let brightness = chips.cpld2.brightness();
        let [tint_r, tint_g, tint_b] = chips.cpld2.tint();
        if brightness == 31 && tint_r == 0 && tint_g == 0 && tint_b == 0 {
            return;
        }

        let row = line as usize * WIDTH;
        for pixel in &mut self.framebuffer[row..row + WIDTH] {
            let mut color = *pixel;
            if brightness != 31 {
                color = apply_brightness(color, brightness);
            }
            if tint_r != 0 || tint_g != 0 || tint_b != 0 {
                color = apply_tint(color, tint_r, tint_g, tint_b);
            }
            *pixel = color;
        }
    }
}

fn unpack(color: u32) -> (u32, u32, u32, u32) {
    let r = color & 0xFF;
    let g = (color >> 8) & 0xFF;
    let b = (color >> 16) & 0xFF;
    let a = (color >> 24) & 0xFF;
    (r, g, b, a)
}

fn pack(r: u32, g: u32, b: u32, a: u32) -> u32 {
    (a << 24) | (b << 16) | (g << 8) | r
}

fn apply_brightness(color: u32, brightness: u8) -> u32 {
    let (r, g, b, a) = unpack(color);
    let scale = |c: u32| c * brightness as u32 / 31;
    pack(scale(r), scale(g), scale(b), a)
}

fn apply_tint(color: u32, tint_r: i8, tint_g: i8, tint_b: i8) -> u32 {
    let (r, g, b, a) = unpack(color);
    let add = |c: u32, tint: i8| (c as i32 + tint as i32).clamp(0, 255) as u32;
    pack(add(r, tint_r), add(g, tint_g), add(b, tint_b), a)
}

/// Alpha is 0-16 with 16 fully opaque.
fn blend_alpha(front: u32, back: u32, alpha: u8) -> u32 {
    let (fr, fg, fb, _) = unpack(front);
    let (br, bg, bb, _) = unpack(back);
    let a = alpha as u32;
    let mix = |f: u32, b: u32| (f * a + b * (16 - a)) / 16;
    pack(mix(fr, br), mix(fg, bg), mix(fb, bb), 0xFF)
}
