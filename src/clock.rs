use std::time::Instant;

/// Clock frequencies in Hz.
pub const MAIN_CPU_FREQ: u32 = 7_159_000;
pub const GRAPHICS_CPU_FREQ: u32 = 13_500_000;
pub const SOUND_CPU_FREQ: u32 = 4_773_000;

pub const FRAME_RATE: u32 = 60;
pub const AUDIO_SAMPLE_RATE: u32 = 32_000;

pub const ACTIVE_SCANLINES: u16 = 240;
pub const TOTAL_SCANLINES: u16 = 262;
pub const PIXELS_PER_SCANLINE: u32 = 858;

pub const CYCLES_PER_FRAME_MAIN: u32 = MAIN_CPU_FREQ / FRAME_RATE;
pub const CYCLES_PER_FRAME_GRAPHICS: u32 = GRAPHICS_CPU_FREQ / FRAME_RATE;
pub const CYCLES_PER_FRAME_SOUND: u32 = SOUND_CPU_FREQ / FRAME_RATE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpuId {
    Main,
    Graphics,
    Sound,
}

/// Timing signal produced while crediting CPU cycles; the machine drains
/// these and fans them out (HSYNC to the raster CPLD, sample ticks to the
/// audio chain).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockEvent {
    /// The beam entered this scanline.
    Scanline(u16),
    /// The beam entered vertical blanking.
    VBlank,
    /// One 32 kHz audio sample is due.
    AudioSample,
}

/// Master clock: per-CPU cycle accounting against per-frame budgets, video
/// position derived from Graphics CPU cycles (1 cycle = 1 pixel clock), and
/// the audio sample cadence.
///
/// The Graphics CPU is the highest-frequency component and serves as the
/// master cycle counter.
pub struct MasterClock {
    main_cycles: u64,
    graphics_cycles: u64,
    sound_cycles: u64,
    master_cycles: u64,
    frame_count: u64,
    current_scanline: u16,
    current_pixel: u16,
    target_main: u64,
    target_graphics: u64,
    target_sound: u64,
    audio_sample_counter: u64,
    audio_samples_this_frame: u32,
    emitted_lines: u64,
    events: Vec<ClockEvent>,
    reset_at: Instant,
}

impl MasterClock {
    pub fn new() -> Self {
        Self {
            main_cycles: 0,
            graphics_cycles: 0,
            sound_cycles: 0,
            master_cycles: 0,
            frame_count: 0,
            current_scanline: 0,
            current_pixel: 0,
            target_main: CYCLES_PER_FRAME_MAIN as u64,
            target_graphics: CYCLES_PER_FRAME_GRAPHICS as u64,
            target_sound: CYCLES_PER_FRAME_SOUND as u64,
            audio_sample_counter: 0,
            audio_samples_this_frame: 0,
            emitted_lines: 0,
            events: Vec::new(),
            reset_at: Instant::now(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn main_cycles(&self) -> u64 {
        self.main_cycles
    }

    pub fn graphics_cycles(&self) -> u64 {
        self.graphics_cycles
    }

    pub fn sound_cycles(&self) -> u64 {
        self.sound_cycles
    }

    pub fn master_cycles(&self) -> u64 {
        self.master_cycles
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn current_scanline(&self) -> u16 {
        self.current_scanline
    }

    pub fn current_pixel(&self) -> u16 {
        self.current_pixel
    }

    pub fn is_vblank(&self) -> bool {
        self.current_scanline >= ACTIVE_SCANLINES
    }

    pub fn is_hblank(&self) -> bool {
        self.current_pixel >= 720
    }

    pub fn audio_samples_this_frame(&self) -> u32 {
        self.audio_samples_this_frame
    }

    /// Arm the budgets for the next frame.
    pub fn run_frame(&mut self) {
        self.target_main = self.main_cycles + CYCLES_PER_FRAME_MAIN as u64;
        self.target_graphics = self.graphics_cycles + CYCLES_PER_FRAME_GRAPHICS as u64;
        self.target_sound = self.sound_cycles + CYCLES_PER_FRAME_SOUND as u64;
        self.audio_samples_this_frame = 0;
        self.frame_count += 1;
    }

    pub fn should_run(&self, cpu: CpuId) -> bool {
        match cpu {
            CpuId::Main => self.main_cycles < self.target_main,
            CpuId::Graphics => self.graphics_cycles < self.target_graphics,
            CpuId::Sound => self.sound_cycles < self.target_sound,
        }
    }

    /// Cycles still owed to a CPU this frame.
    pub fn remaining_budget(&self, cpu: CpuId) -> u64 {
        let (cycles, target) = match cpu {
            CpuId::Main => (self.main_cycles, self.target_main),
            CpuId::Graphics => (self.graphics_cycles, self.target_graphics),
            CpuId::Sound => (self.sound_cycles, self.target_sound),
        };
        target.saturating_sub(cycles)
    }

    pub fn add_cycles(&mut self, cpu: CpuId, cycles: u32) {
        match cpu {
            CpuId::Main => self.main_cycles += cycles as u64,
            CpuId::Graphics => {
                self.graphics_cycles += cycles as u64;
                // The Graphics CPU is the master clock.
                self.master_cycles = self.graphics_cycles;
                self.update_video_timing();
            }
            CpuId::Sound => self.sound_cycles += cycles as u64,
        }
        self.update_audio_timing();
    }

    /// Drain pending timing events in occurrence order.
    pub fn take_events(&mut self) -> Vec<ClockEvent> {
        std::mem::take(&mut self.events)
    }

    fn line_of(cycles: u64) -> (u16, u16) {
        let in_frame = cycles % (GRAPHICS_CPU_FREQ / FRAME_RATE) as u64;
        (
            (in_frame / PIXELS_PER_SCANLINE as u64) as u16,
            (in_frame % PIXELS_PER_SCANLINE as u64) as u16,
        )
    }

    fn update_video_timing(&mut self) {
        let (new_line, new_pixel) = Self::line_of(self.graphics_cycles);
        self.current_scanline = new_line;
        self.current_pixel = new_pixel;

        // Walk the crossed line boundaries one by one so every scanline gets
        // its HSYNC even when a whole budget is credited in a single call.
        // The counter is absolute: a frame-wrap within one credit loses
        // nothing.
        let total_lines = self.graphics_cycles / PIXELS_PER_SCANLINE as u64;
        while self.emitted_lines < total_lines {
            self.emitted_lines += 1;
            let (line, _) = Self::line_of(self.emitted_lines * PIXELS_PER_SCANLINE as u64);
            self.events.push(ClockEvent::Scanline(line));
            if line == ACTIVE_SCANLINES {
                self.events.push(ClockEvent::VBlank);
            }
        }
    }

    fn update_audio_timing(&mut self) {
        let expected =
            self.master_cycles * AUDIO_SAMPLE_RATE as u64 / GRAPHICS_CPU_FREQ as u64;
        while self.audio_sample_counter < expected {
            self.events.push(ClockEvent::AudioSample);
            self.audio_sample_counter += 1;
            self.audio_samples_this_frame += 1;
        }
    }

    /// Emulated time over wall time since reset; 1.0 means real-time.
    pub fn emulation_speed(&self) -> f64 {
        let real_us = self.reset_at.elapsed().as_micros() as u64;
        if real_us == 0 {
            return 1.0;
        }
        let emulated_us = self.graphics_cycles * 1_000_000 / GRAPHICS_CPU_FREQ as u64;
        emulated_us as f64 / real_us as f64
    }
}

impl Default for MasterClock {
    fn default() -> Self {
        Self::new()
    }
}
