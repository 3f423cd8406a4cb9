//! Trap sources, their buffers and the priority arbiter.

use crate::constants::trap_code;
use crate::PrivilegeLevel;

/// Everything that can cause a trap, in decreasing priority.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TrapSource {
    InstructionAccessFault,
    IllegalInstruction,
    InstructionMisaligned,
    EnvironmentCall,
    Breakpoint,
    StoreMisaligned,
    LoadMisaligned,
    StoreAccessFault,
    LoadAccessFault,
    DebugHalt,
    DebugHardwareTrigger,
    DebugBreakpoint,
    DebugStep,
    /// Fast interrupt channel `0..16`.
    Fast(u8),
    MachineExternal,
    MachineSoftware,
    MachineTimer,
}

impl TrapSource {
    /// The 7-bit trap code. Environment calls encode the privilege level they were made from.
    pub fn code(self, privilege: PrivilegeLevel) -> u8 {
        use trap_code::*;
        match self {
            Self::InstructionAccessFault => INSTRUCTION_ACCESS_FAULT,
            Self::IllegalInstruction => ILLEGAL_INSTRUCTION,
            Self::InstructionMisaligned => INSTRUCTION_MISALIGNED,
            Self::EnvironmentCall => match privilege {
                PrivilegeLevel::User => ENVIRONMENT_CALL_USER,
                PrivilegeLevel::Machine => ENVIRONMENT_CALL_MACHINE,
            },
            Self::Breakpoint => BREAKPOINT,
            Self::StoreMisaligned => STORE_MISALIGNED,
            Self::LoadMisaligned => LOAD_MISALIGNED,
            Self::StoreAccessFault => STORE_ACCESS_FAULT,
            Self::LoadAccessFault => LOAD_ACCESS_FAULT,
            Self::DebugHalt => DEBUG_HALT,
            Self::DebugHardwareTrigger => DEBUG_TRIGGER,
            Self::DebugBreakpoint => DEBUG_BREAKPOINT,
            Self::DebugStep => DEBUG_STEP,
            Self::Fast(channel) => FAST_INTERRUPT0 + channel,
            Self::MachineExternal => MACHINE_EXTERNAL,
            Self::MachineSoftware => MACHINE_SOFTWARE,
            Self::MachineTimer => MACHINE_TIMER,
        }
    }

    pub fn is_interrupt(self) -> bool {
        self.code(PrivilegeLevel::Machine) & trap_code::INTERRUPT_BIT != 0
    }

    pub fn enters_debug_mode(self) -> bool {
        self.code(PrivilegeLevel::Machine) & trap_code::DEBUG_BIT != 0
    }
}

/// Bits of the synchronous exception buffer.
pub mod exception {
    pub const INSTRUCTION_ACCESS_FAULT: u16 = 1 << 0;
    pub const ILLEGAL_INSTRUCTION: u16 = 1 << 1;
    pub const INSTRUCTION_MISALIGNED: u16 = 1 << 2;
    pub const ENVIRONMENT_CALL: u16 = 1 << 3;
    pub const BREAKPOINT: u16 = 1 << 4;
    pub const STORE_MISALIGNED: u16 = 1 << 5;
    pub const LOAD_MISALIGNED: u16 = 1 << 6;
    pub const STORE_ACCESS_FAULT: u16 = 1 << 7;
    pub const LOAD_ACCESS_FAULT: u16 = 1 << 8;
    pub const DEBUG_HARDWARE_TRIGGER: u16 = 1 << 9;
    pub const DEBUG_BREAKPOINT: u16 = 1 << 10;
}

/// Interrupt buffer bits, laid out as in `mip`.
pub mod interrupt {
    pub const MACHINE_SOFTWARE: u32 = 1 << 3;
    pub const MACHINE_TIMER: u32 = 1 << 7;
    pub const MACHINE_EXTERNAL: u32 = 1 << 11;
    pub const FAST0: u32 = 1 << 16;
}

/// Sources eligible for arbitration in a cycle.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Candidates {
    pub exceptions: u16,
    /// Standard and fast interrupts, `mip` layout.
    pub interrupts: u32,
    pub debug_halt: bool,
    pub debug_step: bool,
}

/// Pick the single highest priority source.
pub fn arbitrate(candidates: &Candidates) -> Option<TrapSource> {
    let exceptions = candidates.exceptions;
    let raised = |bit: u16| exceptions & bit != 0;
    let interrupts = candidates.interrupts;
    let ordered = [
        (exception::INSTRUCTION_ACCESS_FAULT, TrapSource::InstructionAccessFault),
        (exception::ILLEGAL_INSTRUCTION, TrapSource::IllegalInstruction),
        (exception::INSTRUCTION_MISALIGNED, TrapSource::InstructionMisaligned),
        (exception::ENVIRONMENT_CALL, TrapSource::EnvironmentCall),
        (exception::BREAKPOINT, TrapSource::Breakpoint),
        (exception::STORE_MISALIGNED, TrapSource::StoreMisaligned),
        (exception::LOAD_MISALIGNED, TrapSource::LoadMisaligned),
        (exception::STORE_ACCESS_FAULT, TrapSource::StoreAccessFault),
        (exception::LOAD_ACCESS_FAULT, TrapSource::LoadAccessFault),
    ];
    if let Some(&(_, source)) = ordered.iter().find(|(bit, _)| raised(*bit)) {
        return Some(source);
    }
    if candidates.debug_halt {
        return Some(TrapSource::DebugHalt);
    }
    if raised(exception::DEBUG_HARDWARE_TRIGGER) {
        return Some(TrapSource::DebugHardwareTrigger);
    }
    if raised(exception::DEBUG_BREAKPOINT) {
        return Some(TrapSource::DebugBreakpoint);
    }
    if candidates.debug_step {
        return Some(TrapSource::DebugStep);
    }
    let fast = (interrupts >> 16) as u16;
    if fast != 0 {
        return Some(TrapSource::Fast(fast.trailing_zeros() as u8));
    }
    [
        (interrupt::MACHINE_EXTERNAL, TrapSource::MachineExternal),
        (interrupt::MACHINE_SOFTWARE, TrapSource::MachineSoftware),
        (interrupt::MACHINE_TIMER, TrapSource::MachineTimer),
    ]
    .into_iter()
    .find(|(bit, _)| interrupts & bit != 0)
    .map(|(_, source)| source)
}

/// Exception and interrupt buffers with the trap environment handshake.
#[derive(Debug, Clone, Default)]
pub struct TrapControl {
    /// Sticky synchronous exceptions.
    pub exceptions: u16,
    /// Registered sample of the interrupt lines, `mip` layout.
    pub irq_pending: u32,
    /// Sticky interrupts, `mip` layout.
    pub irq_buffer: u32,
    pub debug_halt_pending: bool,
    pub debug_halt_buffer: bool,
    pub debug_step_buffer: bool,
    /// A trap was accepted and waits for the execution engine to take it.
    pub env_pending: bool,
    /// The handler of the last trap hasn't reached execute yet.
    pub env_entered: bool,
}

impl TrapControl {
    pub fn exception_buffered(&self) -> bool {
        self.exceptions != 0
    }

    /// Update the buffers for one clock edge.
    ///
    /// `fire` is whether any source is accepted this cycle; `enter` clears every buffer.
    pub fn update(
        &mut self,
        exceptions: u16,
        irq_lines: u32,
        debug_halt_line: bool,
        debug_step: bool,
        fire: bool,
        enter: bool,
    ) {
        if enter {
            self.exceptions = 0;
            self.irq_buffer = 0;
            self.debug_halt_buffer = false;
            self.debug_step_buffer = false;
        } else {
            self.exceptions |= exceptions;
            self.irq_buffer |= self.irq_pending;
            self.debug_halt_buffer |= self.debug_halt_pending;
            self.debug_step_buffer |= debug_step;
        }
        self.irq_pending = irq_lines;
        self.debug_halt_pending = debug_halt_line;
        self.env_pending = !enter && (self.env_pending || fire);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let everything = Candidates {
            exceptions: 0x7FF,
            interrupts: u32::MAX,
            debug_halt: true,
            debug_step: true,
        };
        assert_eq!(Some(TrapSource::InstructionAccessFault), arbitrate(&everything));

        let memory = Candidates {
            exceptions: exception::LOAD_ACCESS_FAULT | exception::STORE_MISALIGNED,
            ..everything
        };
        assert_eq!(Some(TrapSource::StoreMisaligned), arbitrate(&memory));

        let debug = Candidates {
            exceptions: exception::DEBUG_BREAKPOINT,
            ..everything
        };
        assert_eq!(Some(TrapSource::DebugHalt), arbitrate(&debug));

        let interrupts = Candidates {
            interrupts: interrupt::MACHINE_TIMER | interrupt::FAST0 << 5,
            ..Candidates::default()
        };
        assert_eq!(Some(TrapSource::Fast(5)), arbitrate(&interrupts));
        let standard = Candidates {
            interrupts: interrupt::MACHINE_TIMER | interrupt::MACHINE_SOFTWARE,
            ..Candidates::default()
        };
        assert_eq!(Some(TrapSource::MachineSoftware), arbitrate(&standard));
        assert_eq!(None, arbitrate(&Candidates::default()));
    }

    #[test]
    fn test_trap_codes() {
        assert_eq!(11, TrapSource::EnvironmentCall.code(PrivilegeLevel::Machine));
        assert_eq!(8, TrapSource::EnvironmentCall.code(PrivilegeLevel::User));
        assert!(TrapSource::Fast(15).is_interrupt());
        assert_eq!(0x5F, TrapSource::Fast(15).code(PrivilegeLevel::Machine));
        assert!(TrapSource::DebugStep.enters_debug_mode());
        assert!(TrapSource::DebugStep.is_interrupt());
        assert!(!TrapSource::DebugBreakpoint.is_interrupt());
        assert!(!TrapSource::MachineTimer.enters_debug_mode());
    }

    #[test]
    fn test_buffers_are_sticky_until_enter() {
        let mut trap = TrapControl::default();
        trap.update(0, interrupt::MACHINE_TIMER, false, false, false, false);
        assert_eq!(0, trap.irq_buffer);
        // The line drops, but the buffered interrupt stays
        trap.update(0, 0, false, false, false, false);
        assert_eq!(interrupt::MACHINE_TIMER, trap.irq_buffer);
        trap.update(exception::BREAKPOINT, 0, false, false, true, false);
        assert!(trap.env_pending);
        assert!(trap.exception_buffered());
        trap.update(0, 0, false, false, false, false);
        assert!(trap.env_pending);

        trap.update(0, 0, false, false, true, true);
        assert!(!trap.env_pending);
        assert_eq!(0, trap.irq_buffer);
        assert!(!trap.exception_buffered());
    }
}
