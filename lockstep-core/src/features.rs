//! Build-time configuration of the core.
//!
//! Every optional ISA extension and structural option is an associated constant of a
//! [`Features`] implementation. Units are generic over the implementation, so each `if C::FLAG`
//! is resolved during monomorphization and the disabled path is not part of the compiled model.
//!
//! Extensions beyond the base ISA that the core has no execution unit for (`M`, the
//! bit-manipulation and crypto sub-extensions, `Zfinx`, `Zxcfu`) only affect instruction decode:
//! their encodings become legal and are handed to the matching co-processor slot.

use crate::alu::shifter::{BarrelShifter, SerialShifter, ShiftUnit};

pub trait Features: 'static {
    /// The shift co-processor attached to the ALU.
    type Shifter: ShiftUnit;

    /// Embedded register file with 16 registers.
    const ISA_E: bool = false;
    /// Integer multiplication and division.
    const ISA_M: bool = false;
    /// User mode.
    const ISA_U: bool = false;
    /// Atomic read-modify-write operations.
    const ISA_ZAAMO: bool = false;
    /// Load-reserved / store-conditional.
    const ISA_ZALRSC: bool = false;
    /// Shifted-add bit manipulation.
    const ISA_ZBA: bool = false;
    /// Basic bit manipulation.
    const ISA_ZBB: bool = false;
    /// Bit manipulation for cryptography.
    const ISA_ZBKB: bool = false;
    /// Carry-less multiplication.
    const ISA_ZBKC: bool = false;
    /// Cryptography crossbar permutations.
    const ISA_ZBKX: bool = false;
    /// Single-bit manipulation.
    const ISA_ZBS: bool = false;
    /// Single-precision floating point in integer registers.
    const ISA_ZFINX: bool = false;
    /// Base counters.
    const ISA_ZICNTR: bool = false;
    /// Integer conditional operations.
    const ISA_ZICOND: bool = false;
    /// Hardware performance monitors.
    const ISA_ZIHPM: bool = false;
    /// AES encryption.
    const ISA_ZKNE: bool = false;
    /// AES decryption.
    const ISA_ZKND: bool = false;
    /// SHA-2 hashing.
    const ISA_ZKNH: bool = false;
    /// Multiplication subset of `M`.
    const ISA_ZMMUL: bool = false;
    /// Custom functions unit.
    const ISA_ZXCFU: bool = false;
    /// External debug mode.
    const ISA_SDEXT: bool = false;
    /// Debug trigger module. Only effective together with [`Features::ISA_SDEXT`].
    const ISA_SDTRIG: bool = false;
    /// Physical memory protection.
    const ISA_SMPMP: bool = false;

    /// Halt the core clock while sleeping.
    const CLOCK_GATING: bool = false;

    /// Number of implemented PMP regions, at most 16.
    const PMP_REGIONS: usize = 16;
    /// Minimal PMP region size in bytes. Must be a power of two, at least 4.
    const PMP_GRANULARITY: u32 = 4;
    const PMP_TOP_OF_RANGE: bool = true;
    const PMP_NATURALLY_ALIGNED: bool = true;
}

/// Third register-file read port, used by three-operand co-processor instructions.
pub const fn rs3_enabled<C: Features>() -> bool {
    C::ISA_ZXCFU || C::ISA_ZFINX
}

/// Hardware trigger module, which needs debug mode to report its matches.
pub const fn trigger_enabled<C: Features>() -> bool {
    C::ISA_SDTRIG && C::ISA_SDEXT
}

/// Smallest RV32I core: machine mode only, no optional extensions, single-cycle shifter.
#[derive(Debug, Clone, Copy)]
pub struct Rv32i;

impl Features for Rv32i {
    type Shifter = BarrelShifter;
}

/// Same as [`Rv32i`] but with the area-optimized bit-serial shifter.
#[derive(Debug, Clone, Copy)]
pub struct Rv32iSerial;

impl Features for Rv32iSerial {
    type Shifter = SerialShifter;
}

/// RV32E: 16 general purpose registers.
#[derive(Debug, Clone, Copy)]
pub struct Rv32e;

impl Features for Rv32e {
    type Shifter = SerialShifter;
    const ISA_E: bool = true;
}

/// Core with user mode, atomics, counters, debug mode, trigger module and memory protection.
#[derive(Debug, Clone, Copy)]
pub struct Rv32iProtected;

impl Features for Rv32iProtected {
    type Shifter = BarrelShifter;
    const ISA_U: bool = true;
    const ISA_ZAAMO: bool = true;
    const ISA_ZALRSC: bool = true;
    const ISA_ZICNTR: bool = true;
    const ISA_SDEXT: bool = true;
    const ISA_SDTRIG: bool = true;
    const ISA_SMPMP: bool = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_flags() {
        assert!(!rs3_enabled::<Rv32i>());
        assert!(!trigger_enabled::<Rv32i>());
        assert!(trigger_enabled::<Rv32iProtected>());
    }
}
