//! Emulator core for the SANo, a fictional cartridge console built around
//! three 65C816-family CPUs with private address spaces, two dual-port
//! mailboxes, and three CPLDs handling audio serialization, video timing
//! and raster effects.
//!
//! The crate models the bus fabric, inter-CPU coordination and raster
//! pipeline; the CPU interpreter itself is a pluggable component described
//! by [`cpu::CpuCore`]. Output is a 320x240 RGBA framebuffer at 60 Hz and
//! 32 kHz interleaved stereo PCM.

pub mod addr;
pub mod bus;
pub mod cartridge;
pub mod clock;
pub mod cpld1;
pub mod cpld2;
pub mod cpld3;
pub mod cpu;
pub mod machine;
pub mod mailbox;
pub mod mixer;
pub mod ram;
pub mod video;

pub use addr::Address;
pub use machine::{Machine, MachineError};
