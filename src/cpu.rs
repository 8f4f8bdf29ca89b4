use crate::addr::Address;
use crate::bus::BusPort;

/// Emulation-mode interrupt vector table for a 65C816-family core.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmulationVectors {
    pub co_processor_enable: u16,
    pub unused: u16,
    pub abort: u16,
    pub non_maskable_interrupt: u16,
    pub reset: u16,
    pub brk_irq: u16,
}

/// Native-mode interrupt vector table for a 65C816-family core.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NativeVectors {
    pub co_processor_enable: u16,
    pub brk: u16,
    pub abort: u16,
    pub non_maskable_interrupt: u16,
    pub reset: u16,
    pub interrupt_request: u16,
}

/// The pin and bus contract a CPU interpreter must honor to sit in one of
/// the three sockets. The machine only ever talks to a core through these
/// operations; the interpreter itself is a replaceable external component,
/// built against a socket's [`EmulationVectors`] / [`NativeVectors`] pair.
///
/// `execute_next_instruction` performs all memory traffic through the
/// supplied [`BusPort`] and reports how many cycles the instruction took.
/// A core with RES asserted is expected to idle (return a small non-zero
/// cycle count without touching the bus).
pub trait CpuCore {
    fn set_res_pin(&mut self, asserted: bool);
    fn set_rdy_pin(&mut self, ready: bool);
    fn set_irq_pin(&mut self, asserted: bool);
    fn set_program_address(&mut self, addr: Address);
    fn program_address(&self) -> Address;
    fn execute_next_instruction(&mut self, bus: &mut BusPort<'_>) -> u32;
}

/// One CPU socket on the board. Pin state lives here so reset sequencing
/// works whether or not an interpreter is plugged in; pin changes are
/// forwarded to the core when one is present.
pub struct CpuSocket {
    name: &'static str,
    core: Option<Box<dyn CpuCore>>,
    res_asserted: bool,
    irq_asserted: bool,
}

impl CpuSocket {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            core: None,
            res_asserted: true,
            irq_asserted: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn attach(&mut self, mut core: Box<dyn CpuCore>) {
        core.set_rdy_pin(true);
        core.set_res_pin(self.res_asserted);
        core.set_irq_pin(self.irq_asserted);
        self.core = Some(core);
    }

    pub fn is_populated(&self) -> bool {
        self.core.is_some()
    }

    pub fn core_mut(&mut self) -> Option<&mut Box<dyn CpuCore>> {
        self.core.as_mut()
    }

    pub fn res_asserted(&self) -> bool {
        self.res_asserted
    }

    pub fn set_res(&mut self, asserted: bool) {
        self.res_asserted = asserted;
        if let Some(core) = self.core.as_mut() {
            core.set_res_pin(asserted);
        }
    }

    /// Pulse RES: assert then release, the power-on reset sequence.
    pub fn pulse_res(&mut self) {
        self.set_res(true);
        self.set_res(false);
    }

    pub fn set_irq(&mut self, asserted: bool) {
        self.irq_asserted = asserted;
        if let Some(core) = self.core.as_mut() {
            core.set_irq_pin(asserted);
        }
    }

    /// Edge-trigger an interrupt: raise IRQ and drop it again. The handler
    /// is expected to acknowledge at the device (e.g. read the mailbox).
    pub fn pulse_irq(&mut self) {
        self.set_irq(true);
        self.set_irq(false);
    }

    pub fn set_program_address(&mut self, addr: Address) {
        if let Some(core) = self.core.as_mut() {
            core.set_program_address(addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sockets_power_on_held_in_reset() {
        let socket = CpuSocket::new("main CPU");
        assert!(socket.res_asserted());
        assert!(!socket.is_populated());
    }

    #[test]
    fn vector_tables_default_to_zero() {
        // A zeroed table is the pre-ROM state; the host fills these from
        // the cartridge before constructing an interpreter.
        assert_eq!(EmulationVectors::default().reset, 0);
        assert_eq!(NativeVectors::default().interrupt_request, 0);
    }
}

