//! Shared encoding tables: major opcodes, function fields and trap codes.

/// Cycles a co-processor may stay busy before the instruction is faulted, as a power of two.
pub const MULTI_CYCLE_TIMEOUT_EXPONENT: u32 = 9;

#[allow(clippy::unusual_byte_groupings)]
pub mod opcode {
    pub const LOAD: u8 = 0b00_000_11;
    pub const CUSTOM0: u8 = 0b00_010_11;
    pub const MISC_MEM: u8 = 0b00_011_11;
    pub const OP_IMM: u8 = 0b00_100_11;
    pub const AUIPC: u8 = 0b00_101_11;
    pub const STORE: u8 = 0b01_000_11;
    pub const CUSTOM1: u8 = 0b01_010_11;
    pub const AMO: u8 = 0b01_011_11;
    pub const OP: u8 = 0b01_100_11;
    pub const LUI: u8 = 0b01_101_11;
    pub const OP_FP: u8 = 0b10_100_11;
    pub const CUSTOM2: u8 = 0b10_110_11;
    pub const BRANCH: u8 = 0b11_000_11;
    pub const JALR: u8 = 0b11_001_11;
    pub const JAL: u8 = 0b11_011_11;
    pub const SYSTEM: u8 = 0b11_100_11;
    pub const CUSTOM3: u8 = 0b11_110_11;
}

pub mod funct3 {
    // OP / OP-IMM
    pub const ADD_SUB: u8 = 0b000;
    pub const SLL: u8 = 0b001;
    pub const SLT: u8 = 0b010;
    pub const SLTU: u8 = 0b011;
    pub const XOR: u8 = 0b100;
    pub const SRL_SRA: u8 = 0b101;
    pub const OR: u8 = 0b110;
    pub const AND: u8 = 0b111;

    // BRANCH
    pub const BEQ: u8 = 0b000;
    pub const BNE: u8 = 0b001;
    pub const BLT: u8 = 0b100;
    pub const BGE: u8 = 0b101;
    pub const BLTU: u8 = 0b110;
    pub const BGEU: u8 = 0b111;

    // LOAD / STORE
    pub const BYTE: u8 = 0b000;
    pub const HALF: u8 = 0b001;
    pub const WORD: u8 = 0b010;
    pub const BYTE_UNSIGNED: u8 = 0b100;
    pub const HALF_UNSIGNED: u8 = 0b101;

    // MISC-MEM
    pub const FENCE: u8 = 0b000;
    pub const FENCE_I: u8 = 0b001;

    // SYSTEM
    pub const PRIV: u8 = 0b000;
    pub const CSRRW: u8 = 0b001;
    pub const CSRRS: u8 = 0b010;
    pub const CSRRC: u8 = 0b011;
    pub const CSRRWI: u8 = 0b101;
    pub const CSRRSI: u8 = 0b110;
    pub const CSRRCI: u8 = 0b111;
}

/// funct12 values of the SYSTEM/PRIV instructions.
pub mod funct12 {
    pub const ECALL: u16 = 0x000;
    pub const EBREAK: u16 = 0x001;
    pub const WFI: u16 = 0x105;
    pub const MRET: u16 = 0x302;
    pub const DRET: u16 = 0x7B2;
}

/// funct5 values of the AMO opcode.
#[allow(clippy::unusual_byte_groupings)]
pub mod funct5 {
    pub const AMOADD: u8 = 0b00000;
    pub const AMOSWAP: u8 = 0b00001;
    pub const LR: u8 = 0b00010;
    pub const SC: u8 = 0b00011;
    pub const AMOXOR: u8 = 0b00100;
    pub const AMOOR: u8 = 0b01000;
    pub const AMOAND: u8 = 0b01100;
    pub const AMOMIN: u8 = 0b10000;
    pub const AMOMAX: u8 = 0b10100;
    pub const AMOMINU: u8 = 0b11000;
    pub const AMOMAXU: u8 = 0b11100;
}

/// 7-bit trap codes.
///
/// Bit 6 flags an interrupt (asynchronous) source, bit 5 flags an entry into debug mode, bits 4:0
/// hold the value written to the exception code field of `mcause` or the `dcsr.cause` field.
#[allow(clippy::unusual_byte_groupings)]
pub mod trap_code {
    pub const INTERRUPT_BIT: u8 = 1 << 6;
    pub const DEBUG_BIT: u8 = 1 << 5;
    pub const CODE_MASK: u8 = 0b1_1111;

    pub const INSTRUCTION_MISALIGNED: u8 = 0b0_0_00000;
    pub const INSTRUCTION_ACCESS_FAULT: u8 = 0b0_0_00001;
    pub const ILLEGAL_INSTRUCTION: u8 = 0b0_0_00010;
    pub const BREAKPOINT: u8 = 0b0_0_00011;
    pub const LOAD_MISALIGNED: u8 = 0b0_0_00100;
    pub const LOAD_ACCESS_FAULT: u8 = 0b0_0_00101;
    pub const STORE_MISALIGNED: u8 = 0b0_0_00110;
    pub const STORE_ACCESS_FAULT: u8 = 0b0_0_00111;
    /// Environment call from user mode. Machine mode adds 3.
    pub const ENVIRONMENT_CALL_USER: u8 = 0b0_0_01000;
    pub const ENVIRONMENT_CALL_MACHINE: u8 = 0b0_0_01011;

    pub const MACHINE_SOFTWARE: u8 = 0b1_0_00011;
    pub const MACHINE_TIMER: u8 = 0b1_0_00111;
    pub const MACHINE_EXTERNAL: u8 = 0b1_0_01011;
    /// Fast interrupt channel 0; channels 1..=15 follow consecutively.
    pub const FAST_INTERRUPT0: u8 = 0b1_0_10000;

    // Debug entry causes, the low bits match `dcsr.cause`.
    pub const DEBUG_BREAKPOINT: u8 = 0b0_1_00001;
    pub const DEBUG_TRIGGER: u8 = 0b0_1_00010;
    pub const DEBUG_HALT: u8 = 0b1_1_00011;
    pub const DEBUG_STEP: u8 = 0b1_1_00100;
}

const_assert_eq!(
    trap_code::FAST_INTERRUPT0 + 15,
    trap_code::INTERRUPT_BIT | trap_code::CODE_MASK
);
const_assert!(MULTI_CYCLE_TIMEOUT_EXPONENT < 32);
