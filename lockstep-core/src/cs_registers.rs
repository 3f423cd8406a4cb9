//! Control and Status Register address space.
//!
//! > The standard RISC-V ISA sets aside a 12-bit encoding space (csr\[11:0]) for up to 4,096 CSRs.
//! > By convention, the upper 4 bits of the CSR address (csr\[11:8]) are used to encode the read
//! > and write accessibility of the CSRs according to privilege level. The top two bits
//! > (csr\[11:10]) indicate whether the register is read/write (00, 01, or 10) or read-only (11).
//! > The next two bits (csr\[9:8]) encode the lowest privilege level that can access the CSR.

use crate::RawPrivilegeLevel;

/// General 12-bit value representing a CSR specifier. Note that this can hold any 12-bit value,
/// even if the value represents an unsupported or non-existent CSR.
pub type CsrSpecifier = u16;

/// Returns `true` if csr\[11:10] marks the CSR as read-only.
pub fn is_read_only(specifier: CsrSpecifier) -> bool {
    (specifier >> 10) & 0b11 == 0b11
}

/// Lowest privilege level allowed to access the CSR, from csr\[9:8].
pub fn required_privilege_level(specifier: CsrSpecifier) -> RawPrivilegeLevel {
    RawPrivilegeLevel::from_u2(((specifier >> 8) & 0b11) as u8)
}

/// Returns `true` for the CSRs only accessible from debug mode (`0x7B0..=0x7BF`).
///
/// > These addresses are only accessible in Debug Mode.
pub fn is_debug_only(specifier: CsrSpecifier) -> bool {
    specifier & 0xFF0 == 0x7B0
}

pub mod specifier {
    use super::CsrSpecifier;

    //
    // Unprivileged counters (`0xC00..`), Zicntr / Zihpm.
    //

    /// Cycle counter for RDCYCLE instruction.
    pub const CYCLE: CsrSpecifier = 0xC00;
    /// Instructions-retired counter for RDINSTRET instruction.
    pub const INSTRET: CsrSpecifier = 0xC02;
    pub const HPMCOUNTER3: CsrSpecifier = 0xC03;
    pub const HPMCOUNTER15: CsrSpecifier = 0xC0F;
    /// Upper 32 bits of `cycle`.
    pub const CYCLEH: CsrSpecifier = 0xC80;
    /// Upper 32 bits of `instret`.
    pub const INSTRETH: CsrSpecifier = 0xC82;
    pub const HPMCOUNTER3H: CsrSpecifier = 0xC83;
    pub const HPMCOUNTER15H: CsrSpecifier = 0xC8F;

    //
    // Custom functions unit (`0x800..=0x803`), Zxcfu.
    //

    pub const CFUREG0: CsrSpecifier = 0x800;
    pub const CFUREG3: CsrSpecifier = 0x803;

    //
    // Machine information registers.
    //

    /// Vendor ID.
    pub const MVENDORID: CsrSpecifier = 0xF11;
    /// Architecture ID.
    pub const MARCHID: CsrSpecifier = 0xF12;
    /// Implementation ID.
    pub const MIMPID: CsrSpecifier = 0xF13;
    /// Hardware thread ID.
    pub const MHARTID: CsrSpecifier = 0xF14;
    /// Pointer to configuration data structure.
    pub const MCONFIGPTR: CsrSpecifier = 0xF15;

    //
    // Machine trap setup.
    //

    /// Machine status register.
    pub const MSTATUS: CsrSpecifier = 0x300;
    /// ISA and extensions.
    pub const MISA: CsrSpecifier = 0x301;
    /// Machine interrupt-enable register.
    pub const MIE: CsrSpecifier = 0x304;
    /// Machine trap-handler base address.
    pub const MTVEC: CsrSpecifier = 0x305;
    /// Machine counter enable.
    pub const MCOUNTEREN: CsrSpecifier = 0x306;
    /// Machine environment configuration register.
    pub const MENVCFG: CsrSpecifier = 0x30A;
    /// Additional machine status register, RV32 only.
    pub const MSTATUSH: CsrSpecifier = 0x310;
    /// Upper 32 bits of `menvcfg`, RV32 only.
    pub const MENVCFGH: CsrSpecifier = 0x31A;

    //
    // Machine counter setup.
    //

    /// Machine counter-inhibit register.
    pub const MCOUNTINHIBIT: CsrSpecifier = 0x320;
    pub const MHPMEVENT3: CsrSpecifier = 0x323;
    pub const MHPMEVENT15: CsrSpecifier = 0x32F;

    //
    // Machine trap handling.
    //

    /// Scratch register for machine trap handlers.
    pub const MSCRATCH: CsrSpecifier = 0x340;
    /// Machine exception program counter.
    pub const MEPC: CsrSpecifier = 0x341;
    /// Machine trap cause.
    pub const MCAUSE: CsrSpecifier = 0x342;
    /// Machine bad address or instruction.
    pub const MTVAL: CsrSpecifier = 0x343;
    /// Machine interrupt pending.
    pub const MIP: CsrSpecifier = 0x344;
    /// Machine trap instruction (transformed).
    pub const MTINST: CsrSpecifier = 0x34A;

    //
    // Machine memory protection.
    //

    /// Physical memory protection configuration, entries 0..=3.
    pub const PMPCFG0: CsrSpecifier = 0x3A0;
    /// Physical memory protection configuration, entries 12..=15.
    pub const PMPCFG3: CsrSpecifier = 0x3A3;
    /// Physical memory protection address register 0.
    pub const PMPADDR0: CsrSpecifier = 0x3B0;
    /// Physical memory protection address register 15.
    pub const PMPADDR15: CsrSpecifier = 0x3BF;

    //
    // Machine counters.
    //

    /// Machine cycle counter.
    pub const MCYCLE: CsrSpecifier = 0xB00;
    /// Machine instructions-retired counter.
    pub const MINSTRET: CsrSpecifier = 0xB02;
    pub const MHPMCOUNTER3: CsrSpecifier = 0xB03;
    pub const MHPMCOUNTER15: CsrSpecifier = 0xB0F;
    /// Upper 32 bits of `mcycle`.
    pub const MCYCLEH: CsrSpecifier = 0xB80;
    /// Upper 32 bits of `minstret`.
    pub const MINSTRETH: CsrSpecifier = 0xB82;
    pub const MHPMCOUNTER3H: CsrSpecifier = 0xB83;
    pub const MHPMCOUNTER15H: CsrSpecifier = 0xB8F;

    //
    // Debug trigger module (shared between machine and debug mode).
    //

    /// Debug/trace trigger register select.
    pub const TSELECT: CsrSpecifier = 0x7A0;
    /// First debug/trace trigger data register.
    pub const TDATA1: CsrSpecifier = 0x7A1;
    /// Second debug/trace trigger data register.
    pub const TDATA2: CsrSpecifier = 0x7A2;
    /// Trigger info.
    pub const TINFO: CsrSpecifier = 0x7A4;

    //
    // Debug mode registers.
    //

    /// Debug control and status register.
    pub const DCSR: CsrSpecifier = 0x7B0;
    /// Debug program counter.
    pub const DPC: CsrSpecifier = 0x7B1;
    /// Debug scratch register 0.
    pub const DSCRATCH0: CsrSpecifier = 0x7B2;
}
