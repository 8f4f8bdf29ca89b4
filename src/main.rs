use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use sano::Machine;

/// Headless runner: load a ROM, emulate, optionally dump the last frame
/// and persist save RAM.
#[derive(Parser)]
#[command(name = "sano", version)]
struct Args {
    /// ROM image (.sno / .bin)
    rom: PathBuf,

    /// Number of frames to run
    #[arg(long, default_value_t = 600)]
    frames: u64,

    /// Save RAM file; defaults to the ROM path with a .sav extension
    #[arg(long)]
    save_ram: Option<PathBuf>,

    /// Write the final framebuffer to this file as a binary PPM
    #[arg(long)]
    dump_frame: Option<PathBuf>,

    /// Suppress the per-run summary
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut machine = Machine::new();
    machine
        .load_rom(&args.rom)
        .with_context(|| format!("loading {}", args.rom.display()))?;

    let save_path = args
        .save_ram
        .clone()
        .unwrap_or_else(|| args.rom.with_extension("sav"));
    if save_path.exists() {
        machine.load_save_ram(&save_path);
    }

    machine.run();

    let mut audio = vec![0i16; 2048];
    for _ in 0..args.frames {
        machine.run_frame();
        // Drain the audio queue the way a host sink would.
        while machine.audio_pull(&mut audio) > 0 {}
    }
    machine.stop();

    if let Some(path) = args.dump_frame.as_ref() {
        write_ppm(path, machine.framebuffer(), machine.framebuffer_width())
            .with_context(|| format!("writing {}", path.display()))?;
    }

    if machine
        .cartridge()
        .is_some_and(|cartridge| cartridge.has_save_ram())
    {
        machine
            .save_save_ram(&save_path)
            .with_context(|| format!("writing {}", save_path.display()))?;
    }

    if !args.quiet {
        println!(
            "ran {} frame(s) at {:.2}x real-time",
            machine.frame_count(),
            machine.emulation_speed()
        );
    }

    Ok(())
}

/// The framebuffer words carry red in the low byte.
fn write_ppm(path: &PathBuf, framebuffer: &[u32], width: usize) -> Result<()> {
    let height = framebuffer.len() / width;
    let mut file = File::create(path)?;
    writeln!(file, "P6\n{width} {height}\n255")?;
    let mut pixels = Vec::with_capacity(framebuffer.len() * 3);
    for &word in framebuffer {
        pixels.push((word & 0xFF) as u8);
        pixels.push((word >> 8) as u8);
        pixels.push((word >> 16) as u8);
    }
    file.write_all(&pixels)?;
    Ok(())
}
