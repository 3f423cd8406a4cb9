//! Machine-level CSRs and the CSR access check.

use crate::cs_registers::{self, specifier, CsrSpecifier};
use crate::features::{trigger_enabled, Features};
use crate::pmp::PhysicalMemoryProtectionUnit;
use crate::{PrivilegeLevel, RawPrivilegeLevel};
use bitvec::{field::BitField, order::Lsb0, view::BitView};
use thiserror::Error;

/// Reasons a CSR instruction is rejected as illegal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrAccessError {
    #[error("unsupported CSR: {0:#05X}")]
    Unsupported(CsrSpecifier),
    #[error("write to read-only CSR: {0:#05X}")]
    ReadOnly(CsrSpecifier),
    #[error("CSR {0:#05X} is only accessible in debug mode")]
    DebugOnly(CsrSpecifier),
    /// Attempt to access a CSR that requires a higher privilege level.
    #[error(
        "cannot access specifier {specifier:#05X} from privilege level {actual_level}, \
             since it requires privilege level {required_level}"
    )]
    Privileged {
        specifier: CsrSpecifier,
        required_level: RawPrivilegeLevel,
        actual_level: PrivilegeLevel,
    },
    /// User mode read of a counter that `mcounteren` doesn't expose.
    #[error("counter CSR {0:#05X} is not enabled for user mode")]
    CounterDisabled(CsrSpecifier),
}

/// Context of a CSR access.
#[derive(Debug, Copy, Clone)]
pub struct Access {
    pub privilege: PrivilegeLevel,
    pub debug_mode: bool,
    /// The instruction writes the CSR: CSRRW(I), or a set/clear with a nonzero source field.
    pub write: bool,
    pub counter_enable: u32,
}

/// Whether the CSR is present in a core with features `C`.
pub fn exists<C: Features>(csr: CsrSpecifier) -> bool {
    use specifier::*;
    match csr {
        MVENDORID | MARCHID | MIMPID | MHARTID | MCONFIGPTR => true,
        MSTATUS | MISA | MIE | MTVEC | MENVCFG | MSTATUSH | MENVCFGH => true,
        MSCRATCH | MEPC | MCAUSE | MTVAL | MIP | MTINST => true,
        MCOUNTEREN => C::ISA_U,
        CYCLE | CYCLEH | INSTRET | INSTRETH => C::ISA_ZICNTR,
        MCYCLE | MCYCLEH | MINSTRET | MINSTRETH | MCOUNTINHIBIT => C::ISA_ZICNTR,
        HPMCOUNTER3..=HPMCOUNTER15
        | HPMCOUNTER3H..=HPMCOUNTER15H
        | MHPMCOUNTER3..=MHPMCOUNTER15
        | MHPMCOUNTER3H..=MHPMCOUNTER15H
        | MHPMEVENT3..=MHPMEVENT15 => C::ISA_ZIHPM,
        CFUREG0..=CFUREG3 => C::ISA_ZXCFU,
        DCSR | DPC | DSCRATCH0 => C::ISA_SDEXT,
        TSELECT | TDATA1 | TDATA2 | TINFO => trigger_enabled::<C>(),
        csr => PhysicalMemoryProtectionUnit::<C>::implements(csr),
    }
}

/// The `mcounteren` bit gating user access to an unprivileged counter, if `csr` is one.
fn counter_enable_bit(csr: CsrSpecifier) -> Option<u32> {
    match csr {
        specifier::CYCLE..=specifier::HPMCOUNTER15 => Some(u32::from(csr - specifier::CYCLE)),
        specifier::CYCLEH..=specifier::HPMCOUNTER15H => Some(u32::from(csr - specifier::CYCLEH)),
        _ => None,
    }
}

/// Check the existence, the access form and the context of a CSR access, in that order.
pub fn check_access<C: Features>(csr: CsrSpecifier, access: &Access) -> Result<(), CsrAccessError> {
    if !exists::<C>(csr) {
        return Err(CsrAccessError::Unsupported(csr));
    }
    if access.write && cs_registers::is_read_only(csr) {
        return Err(CsrAccessError::ReadOnly(csr));
    }
    if cs_registers::is_debug_only(csr) && !access.debug_mode {
        return Err(CsrAccessError::DebugOnly(csr));
    }
    let required_level = cs_registers::required_privilege_level(csr);
    if required_level > access.privilege {
        return Err(CsrAccessError::Privileged {
            specifier: csr,
            required_level,
            actual_level: access.privilege,
        });
    }
    if !access.privilege.is_machine() {
        if let Some(bit) = counter_enable_bit(csr) {
            if access.counter_enable >> bit & 1 == 0 {
                return Err(CsrAccessError::CounterDisabled(csr));
            }
        }
    }
    Ok(())
}

/// The `misa` value: MXL = 32 plus one letter bit per enabled extension.
pub fn misa<C: Features>() -> u32 {
    let mut value = 0u32;
    let bits = value.view_bits_mut::<Lsb0>();
    bits.set(30, true);
    bits.set(0, C::ISA_ZAAMO && C::ISA_ZALRSC);
    bits.set(4, C::ISA_E);
    bits.set(8, !C::ISA_E);
    bits.set(12, C::ISA_M);
    bits.set(20, C::ISA_U);
    bits.set(23, C::ISA_ZXCFU);
    value
}

/// The machine status register (`mstatus`), only the implemented fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub mie: bool,
    pub mpie: bool,
    pub mpp: PrivilegeLevel,
    /// Modify privilege: data accesses use `mpp`.
    pub mprv: bool,
    /// Timeout wait: WFI is illegal in user mode.
    pub tw: bool,
}

mod idx {
    pub const MIE: usize = 3;
    pub const MPIE: usize = 7;
    pub const MPP: usize = 11;
    pub const MPRV: usize = 17;
    pub const TW: usize = 21;
}

impl Status {
    pub fn read(&self) -> u32 {
        let mut value = 0u32;
        let bits = value.view_bits_mut::<Lsb0>();
        bits.set(idx::MIE, self.mie);
        bits.set(idx::MPIE, self.mpie);
        bits[idx::MPP..(idx::MPP + 2)].store_le(self.mpp.to_u2());
        bits.set(idx::MPRV, self.mprv);
        bits.set(idx::TW, self.tw);
        value
    }

    /// MPP is **WARL**: any value other than user mode selects machine mode.
    pub fn write<C: Features>(&mut self, value: u32) {
        let bits = value.view_bits::<Lsb0>();
        self.mie = bits[idx::MIE];
        self.mpie = bits[idx::MPIE];
        if C::ISA_U {
            let mpp = RawPrivilegeLevel::from_u2(bits[idx::MPP..(idx::MPP + 2)].load_le());
            self.mpp = PrivilegeLevel::try_from(mpp).unwrap_or(PrivilegeLevel::Machine);
            self.mprv = bits[idx::MPRV];
            self.tw = bits[idx::TW];
        }
    }
}

/// Machine trap-vector base address register.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tvec(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorMode {
    Direct,
    Vectored,
}

impl Tvec {
    pub fn read(&self) -> u32 {
        self.0
    }

    /// A reserved MODE keeps the previous value.
    pub fn write(&mut self, value: u32) {
        if value & 0b11 < 2 {
            self.0 = value;
        }
    }

    pub fn base(&self) -> u32 {
        self.0.view_bits::<Lsb0>()[2..].load_le::<u32>() << 2
    }

    pub fn mode(&self) -> VectorMode {
        match self.0.view_bits::<Lsb0>()[0] {
            false => VectorMode::Direct,
            true => VectorMode::Vectored,
        }
    }

    /// Handler address for a trap with the given exception code.
    pub fn target(&self, interrupt: bool, code: u32) -> u32 {
        match self.mode() {
            VectorMode::Vectored if interrupt => self.base().wrapping_add(code << 2),
            _ => self.base(),
        }
    }
}

/// Interrupt enable bits that exist in `mie`: MSIE, MTIE, MEIE and the 16 fast channels.
pub const INTERRUPT_MASK: u32 = 0xFFFF_0000 | 1 << 11 | 1 << 7 | 1 << 3;

/// `mcountinhibit` / `mcounteren` bits of the implemented counters.
pub const COUNTER_MASK: u32 = 0b101;

/// Machine trap setup, trap handling and counter registers.
#[derive(Debug, Clone, Default)]
pub struct MachineCsrs {
    pub status: Status,
    pub mie: u32,
    pub mtvec: Tvec,
    pub mepc: u32,
    pub mcause: u32,
    pub mscratch: u32,
    pub mtval: u32,
    pub mtinst: u32,
    pub mcounteren: u32,
    pub mcountinhibit: u32,
    pub mcycle: u64,
    pub minstret: u64,
}

impl MachineCsrs {
    pub fn cycle_inhibited(&self) -> bool {
        self.mcountinhibit & 0b001 != 0
    }

    pub fn instret_inhibited(&self) -> bool {
        self.mcountinhibit & 0b100 != 0
    }

    /// Value of a machine CSR held in this bank, `None` for CSRs stored elsewhere.
    pub fn read(&self, csr: CsrSpecifier) -> Option<u32> {
        use specifier::*;
        Some(match csr {
            MSTATUS => self.status.read(),
            MIE => self.mie,
            MTVEC => self.mtvec.read(),
            MEPC => self.mepc,
            MCAUSE => self.mcause,
            MSCRATCH => self.mscratch,
            MTVAL => self.mtval,
            MTINST => self.mtinst,
            MCOUNTEREN => self.mcounteren,
            MCOUNTINHIBIT => self.mcountinhibit,
            MCYCLE | CYCLE => self.mcycle as u32,
            MCYCLEH | CYCLEH => (self.mcycle >> 32) as u32,
            MINSTRET | INSTRET => self.minstret as u32,
            MINSTRETH | INSTRETH => (self.minstret >> 32) as u32,
            _ => return None,
        })
    }

    /// Write a machine CSR held in this bank. Returns `false` if `csr` isn't one of them.
    pub fn write<C: Features>(&mut self, csr: CsrSpecifier, value: u32) -> bool {
        use specifier::*;
        match csr {
            MSTATUS => self.status.write::<C>(value),
            MIE => self.mie = value & INTERRUPT_MASK,
            MTVEC => self.mtvec.write(value),
            MEPC => self.mepc = value & !0b11,
            MCAUSE => self.mcause = value & (1 << 31 | 0b1_1111),
            MSCRATCH => self.mscratch = value,
            MTVAL => self.mtval = value,
            MTINST => self.mtinst = value,
            MCOUNTEREN => self.mcounteren = value & COUNTER_MASK,
            MCOUNTINHIBIT => self.mcountinhibit = value & COUNTER_MASK,
            MCYCLE => self.mcycle = self.mcycle & !0xFFFF_FFFF | u64::from(value),
            MCYCLEH => self.mcycle = self.mcycle & 0xFFFF_FFFF | u64::from(value) << 32,
            MINSTRET => self.minstret = self.minstret & !0xFFFF_FFFF | u64::from(value),
            MINSTRETH => self.minstret = self.minstret & 0xFFFF_FFFF | u64::from(value) << 32,
            _ => return false,
        }
        true
    }
}
