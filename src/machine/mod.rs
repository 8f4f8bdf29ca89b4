pub(crate) mod env;


use std::collections::VecDeque;
use std::path::Path;

use log::{debug, info, trace, warn};
use thiserror::Error;

use crate::addr::Address;
use crate::bus::{BusEvent, BusPort, Chipset, DeviceKind, MailboxSide, SystemBus};
use crate::cartridge::{Cartridge, CartridgeError};
use crate::clock::{ClockEvent, CpuId, MasterClock, AUDIO_SAMPLE_RATE};
use crate::cpu::{CpuCore, CpuSocket};
use crate::mailbox::MailboxAction;
use crate::mixer::AudioMixer;
use crate::video::VideoRenderer;

/// One second of buffered stereo output; anything beyond is dropped.
const AUDIO_QUEUE_LIMIT: usize = AUDIO_SAMPLE_RATE as usize * 2;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("no ROM loaded")]
    NoRomLoaded,
    #[error(transparent)]
    Cartridge(#[from] CartridgeError),
}

/// The whole console: three CPU sockets with private buses, the shared
/// chipset behind them, the master clock, the renderer and the mixer.
///
/// A frame runs the CPUs serially in main, graphics, sound order so the
/// main CPU's mailbox writes are visible to the coprocessors within the
/// same frame; the renderer then replays the frame from VRAM.
pub struct Machine {
    chips: Chipset,
    main_bus: SystemBus,
    graphics_bus: SystemBus,
    sound_bus: SystemBus,
    pub(crate) main_cpu: CpuSocket,
    pub(crate) graphics_cpu: CpuSocket,
    pub(crate) sound_cpu: CpuSocket,
    clock: MasterClock,
    renderer: VideoRenderer,
    mixer: AudioMixer,
    audio_queue: VecDeque<i16>,
    running: bool,
    paused: bool,
}

impl Machine {
    pub fn new() -> Self {
        let mut main_bus = SystemBus::new("main");
        let mut graphics_bus = SystemBus::new("graphics");
        let mut sound_bus = SystemBus::new("sound");

        // Registration order is decode priority. RAM must come first so it
        // wins the low banks; the CPLD register windows sit inside mailbox
        // A's range and must decode ahead of it; the cartridge always comes
        // last.
        main_bus.register(DeviceKind::MainRam);
        main_bus.register(DeviceKind::Cpld2);
        main_bus.register(DeviceKind::Cpld3);
        main_bus.register(DeviceKind::MailboxA);
        main_bus.register(DeviceKind::MailboxB);
        main_bus.register(DeviceKind::Cartridge);

        graphics_bus.register(DeviceKind::GraphicsRam);
        graphics_bus.register(DeviceKind::MailboxA);
        graphics_bus.register(DeviceKind::Cartridge);

        sound_bus.register(DeviceKind::SoundRam);
        sound_bus.register(DeviceKind::Cpld1);
        sound_bus.register(DeviceKind::MailboxB);
        sound_bus.register(DeviceKind::Cartridge);

        for bus in [&main_bus, &graphics_bus, &sound_bus] {
            debug!("{} bus: {} device(s) mapped", bus.name(), bus.devices().len());
        }

        let mut mixer = AudioMixer::new();
        if env::disable_agc() {
            mixer.set_auto_gain(false);
        }
        if let Some(volume) = env::master_volume() {
            mixer.set_master_volume(volume);
        }

        Self {
            chips: Chipset::new(),
            main_bus,
            graphics_bus,
            sound_bus,
            main_cpu: CpuSocket::new("main CPU"),
            graphics_cpu: CpuSocket::new("graphics CPU"),
            sound_cpu: CpuSocket::new("sound CPU"),
            clock: MasterClock::new(),
            renderer: VideoRenderer::new(),
            mixer,
            audio_queue: VecDeque::new(),
            running: false,
            paused: false,
        }
    }

    /// Plug an interpreter into one of the three sockets.
    pub fn attach_cpu(&mut self, id: CpuId, core: Box<dyn CpuCore>) {
        self.socket_mut(id).attach(core);
    }

    fn socket_mut(&mut self, id: CpuId) -> &mut CpuSocket {
        match id {
            CpuId::Main => &mut self.main_cpu,
            CpuId::Graphics => &mut self.graphics_cpu,
            CpuId::Sound => &mut self.sound_cpu,
        }
    }

    pub fn load_rom<P: AsRef<Path>>(&mut self, path: P) -> Result<(), MachineError> {
        let cartridge = Cartridge::load_rom(path)?;
        self.chips.cartridge = Some(cartridge);
        self.reset();
        Ok(())
    }

    pub fn load_rom_bytes(&mut self, bytes: Vec<u8>) -> Result<(), MachineError> {
        let cartridge = Cartridge::from_bytes(bytes)?;
        self.chips.cartridge = Some(cartridge);
        self.reset();
        Ok(())
    }

    pub fn unload_rom(&mut self) {
        self.stop();
        self.chips.cartridge = None;
    }

    pub fn is_rom_loaded(&self) -> bool {
        self.chips.cartridge.is_some()
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.chips.cartridge.as_ref()
    }

    /// Power-on reset. The main CPU starts at the header entry point; a
    /// coprocessor with a zero entry point stays held in reset until the
    /// mailbox boot protocol releases it.
    pub fn reset(&mut self) {
        self.clock.reset();
        self.chips.cpld1.reset();
        self.chips.cpld2.reset();
        self.chips.cpld3.reset();
        self.chips.mailbox_a.clear();
        self.chips.mailbox_b.clear();
        self.renderer.reset();
        self.mixer.reset();
        self.audio_queue.clear();

        let Some(cartridge) = self.chips.cartridge.as_ref() else {
            self.main_cpu.set_res(true);
            self.graphics_cpu.set_res(true);
            self.sound_cpu.set_res(true);
            return;
        };
        let header = cartridge.header().clone();

        self.main_cpu.pulse_res();
        self.main_cpu
            .set_program_address(Address::from_flat(header.main_entry));
        info!("main CPU starts at {}", Address::from_flat(header.main_entry));

        for (socket, entry) in [
            (&mut self.graphics_cpu, header.graphics_entry),
            (&mut self.sound_cpu, header.sound_entry),
        ] {
            if entry != 0 {
                socket.set_program_address(Address::from_flat(entry));
                socket.set_res(false);
                info!("{} starts at {}", socket.name(), Address::from_flat(entry));
            } else {
                socket.set_res(true);
                info!("{} held in reset until mailbox boot", socket.name());
            }
        }
    }

    pub fn run(&mut self) {
        if !self.is_rom_loaded() {
            warn!("cannot run without a ROM");
            return;
        }
        if !self.main_cpu.is_populated() {
            warn!("main CPU socket is empty; frames will only advance the chipset");
        }
        self.running = true;
        self.paused = false;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Run one 60 Hz frame: arm the budgets, run the CPUs serially in
    /// main → graphics → sound order, then replay the frame from VRAM.
    pub fn run_frame(&mut self) {
        if !self.running || self.paused {
            return;
        }

        self.clock.run_frame();
        self.run_cpu(CpuId::Main);
        self.run_cpu(CpuId::Graphics);
        self.run_cpu(CpuId::Sound);

        self.renderer.invalidate_caches();
        self.renderer.render_frame(&self.chips);
    }

    /// Execute a single instruction on the main CPU.
    pub fn step(&mut self) {
        if !self.is_rom_loaded() {
            return;
        }
        let cycles = self.execute_one(CpuId::Main);
        self.clock.add_cycles(CpuId::Main, cycles);
        self.dispatch_clock_events();
        self.dispatch_bus_events();
    }

    fn run_cpu(&mut self, id: CpuId) {
        while self.clock.should_run(id) {
            let cycles = self.execute_one(id);
            if id == CpuId::Graphics {
                self.tick_video(cycles);
            }
            self.clock.add_cycles(id, cycles);
            self.dispatch_clock_events();
            self.dispatch_bus_events();
        }
    }

    fn execute_one(&mut self, id: CpuId) -> u32 {
        let Self {
            chips,
            main_bus,
            graphics_bus,
            sound_bus,
            main_cpu,
            graphics_cpu,
            sound_cpu,
            clock,
            ..
        } = self;
        let (socket, bus) = match id {
            CpuId::Main => (main_cpu, &*main_bus),
            CpuId::Graphics => (graphics_cpu, &*graphics_bus),
            CpuId::Sound => (sound_cpu, &*sound_bus),
        };
        match socket.core_mut() {
            Some(core) => {
                let mut port = BusPort { bus, chips };
                // A zero-cycle instruction would stall the frame loop.
                core.execute_next_instruction(&mut port).max(1)
            }
            // Empty socket: burn the rest of the budget in one credit so
            // the raster and audio chains still advance.
            None => clock.remaining_budget(id).min(u32::MAX as u64) as u32,
        }
    }

    /// CPLD2 sees one pixel clock per Graphics CPU cycle.
    fn tick_video(&mut self, cycles: u32) {
        for _ in 0..cycles {
            if self.chips.cpld2.tick() {
                trace!("cpld2: vblank IRQ");
                self.graphics_cpu.pulse_irq();
            }
        }
    }

    fn dispatch_clock_events(&mut self) {
        for event in self.clock.take_events() {
            match event {
                ClockEvent::Scanline(line) => {
                    if self.chips.cpld3.on_hsync(line) {
                        trace!("cpld3: split-line IRQ at line {line}");
                        self.graphics_cpu.pulse_irq();
                    }
                }
                ClockEvent::VBlank => trace!("clock: vertical blanking"),
                ClockEvent::AudioSample => self.pump_audio_sample(),
            }
        }
    }

    fn dispatch_bus_events(&mut self) {
        if !self.chips.has_events() {
            return;
        }
        for event in self.chips.take_events() {
            match event {
                BusEvent::MailboxWritten(MailboxSide::A) => {
                    let Chipset {
                        cpld2,
                        mailbox_a,
                        graphics_ram,
                        ..
                    } = &mut self.chips;
                    match cpld2.on_mailbox_write(mailbox_a, graphics_ram) {
                        MailboxAction::BootCopied { .. } => {
                            self.graphics_cpu.set_res(false);
                            self.graphics_cpu.set_program_address(Address::new(0, 0));
                            info!("graphics CPU released from reset");
                        }
                        MailboxAction::Notify => self.graphics_cpu.pulse_irq(),
                    }
                }
                BusEvent::MailboxWritten(MailboxSide::B) => {
                    let Chipset {
                        cpld1,
                        mailbox_b,
                        sound_ram,
                        ..
                    } = &mut self.chips;
                    match cpld1.on_mailbox_write(mailbox_b, sound_ram) {
                        MailboxAction::BootCopied { .. } => {
                            self.sound_cpu.set_res(false);
                            self.sound_cpu.set_program_address(Address::new(0, 0));
                            info!("sound CPU released from reset");
                        }
                        MailboxAction::Notify => self.sound_cpu.pulse_irq(),
                    }
                }
            }
        }
    }

    fn pump_audio_sample(&mut self) {
        let mut frame = [0i16; 2];
        let irq = self.mixer.generate_samples(&mut self.chips.cpld1, &mut frame);
        if self.audio_queue.len() + 2 <= AUDIO_QUEUE_LIMIT {
            self.audio_queue.extend(frame);
        } else {
            trace!("audio queue full, frame dropped");
        }
        if irq {
            self.sound_cpu.pulse_irq();
        }
    }

    pub fn framebuffer(&self) -> &[u32] {
        self.renderer.framebuffer()
    }

    pub fn framebuffer_width(&self) -> usize {
        self.renderer.width()
    }

    pub fn framebuffer_height(&self) -> usize {
        self.renderer.height()
    }

    /// Drain buffered interleaved stereo samples into `out`; returns how
    /// many values were written.
    pub fn audio_pull(&mut self, out: &mut [i16]) -> usize {
        let mut written = 0;
        for slot in out.iter_mut() {
            match self.audio_queue.pop_front() {
                Some(sample) => {
                    *slot = sample;
                    written += 1;
                }
                None => break,
            }
        }
        written
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.mixer.set_master_volume(volume);
    }

    pub fn frame_count(&self) -> u64 {
        self.clock.frame_count()
    }

    pub fn emulation_speed(&self) -> f64 {
        self.clock.emulation_speed()
    }

    /// Load battery RAM, creating an empty save when the file is missing or
    /// unreadable; a failed load never stops the machine.
    pub fn load_save_ram<P: AsRef<Path>>(&mut self, path: P) {
        let Some(cartridge) = self.chips.cartridge.as_mut() else {
            warn!("no cartridge to load save RAM into");
            return;
        };
        if let Err(err) = cartridge.load_save(&path) {
            warn!("save RAM load failed ({err}); starting with an empty save");
            cartridge.create_save_ram();
        }
    }

    pub fn save_save_ram<P: AsRef<Path>>(&self, path: P) -> Result<(), MachineError> {
        let cartridge = self.chips.cartridge.as_ref().ok_or(MachineError::NoRomLoaded)?;
        cartridge.save_save(path)?;
        Ok(())
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}
