//! Illegal instruction detection.
//!
//! Every encoding the configured core can execute is listed explicitly; anything else is illegal.

use crate::constants::{funct12, funct3, funct5, opcode};
use crate::features::Features;
use crate::instruction::{Format, InstructionWord};
use crate::lsu::is_legal_width;
use crate::PrivilegeLevel;

/// Execution context the legality of an instruction depends on.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DecodeContext {
    pub privilege: PrivilegeLevel,
    pub debug_mode: bool,
    /// `mstatus.TW`: timeout wait, traps WFI in user mode.
    pub timeout_wait: bool,
    /// The CSR named by the instruction may be accessed as the instruction attempts to.
    pub csr_access: bool,
}

pub fn is_legal<C: Features>(word: InstructionWord, context: &DecodeContext) -> bool {
    if word.opcode() & 0b11 != 0b11 {
        return false;
    }
    if C::ISA_E && uses_upper_registers(word) {
        return false;
    }
    let (funct3, funct7, funct12) = (word.funct3(), word.funct7(), word.funct12());
    match word.opcode() {
        opcode::LUI | opcode::AUIPC | opcode::JAL => true,
        opcode::JALR => funct3 == 0,
        opcode::BRANCH => !matches!(funct3, 0b010 | 0b011),
        opcode::LOAD => is_legal_width(funct3, false),
        opcode::STORE => is_legal_width(funct3, true),
        opcode::OP_IMM => op_imm::<C>(funct3, funct7, funct12),
        opcode::OP => op::<C>(funct3, funct7, word),
        opcode::MISC_MEM => matches!(funct3, funct3::FENCE | funct3::FENCE_I),
        opcode::AMO => atomic::<C>(word),
        opcode::SYSTEM => system::<C>(word, context),
        opcode::OP_FP => C::ISA_ZFINX && floating_point(word),
        opcode::CUSTOM0 | opcode::CUSTOM1 | opcode::CUSTOM2 | opcode::CUSTOM3 => C::ISA_ZXCFU,
        _ => false,
    }
}

/// Whether a register field actually read or written by the instruction names `x16..=x31`.
fn uses_upper_registers(word: InstructionWord) -> bool {
    let csr_immediate = word.opcode() == opcode::SYSTEM && word.funct3() & 0b100 != 0;
    let (rd, rs1, rs2) = match word.format() {
        Format::R => (true, true, true),
        Format::I => (true, !csr_immediate, false),
        Format::S | Format::B => (false, true, true),
        Format::U | Format::J => (true, false, false),
    };
    (rd && word.rd().is_upper_half())
        || (rs1 && word.rs1().is_upper_half())
        || (rs2 && word.rs2().is_upper_half())
}

fn op_imm<C: Features>(funct3: u8, funct7: u8, funct12: u16) -> bool {
    let zbb_or_zbkb = C::ISA_ZBB || C::ISA_ZBKB;
    match funct3 {
        funct3::SLL => {
            funct7 == 0
                || (C::ISA_ZBB && matches!(funct12, 0x600 | 0x601 | 0x602 | 0x604 | 0x605))
                || (C::ISA_ZBS && matches!(funct7, 0b0100100 | 0b0110100 | 0b0010100))
                || (C::ISA_ZBKB && funct12 == 0x08F)
                || (C::ISA_ZKNH && (0x100..=0x103).contains(&funct12))
        }
        funct3::SRL_SRA => {
            funct7 == 0
                || funct7 == 0b0100000
                || (zbb_or_zbkb && (funct7 == 0b0110000 || funct12 == 0x698))
                || (C::ISA_ZBB && funct12 == 0x287)
                || (C::ISA_ZBS && funct7 == 0b0100100)
                || (C::ISA_ZBKB && matches!(funct12, 0x687 | 0x08F))
        }
        _ => true,
    }
}

fn op<C: Features>(funct3: u8, funct7: u8, word: InstructionWord) -> bool {
    let zbb_or_zbkb = C::ISA_ZBB || C::ISA_ZBKB;
    match (funct7, funct3) {
        (0b0000000, _) => true,
        (0b0100000, funct3::ADD_SUB | funct3::SRL_SRA) => true,
        // andn, orn, xnor
        (0b0100000, 0b100 | 0b110 | 0b111) => zbb_or_zbkb,
        (0b0000001, _) => C::ISA_M || (C::ISA_ZMMUL && funct3 < 0b100),
        // sh1add, sh2add, sh3add
        (0b0010000, 0b010 | 0b100 | 0b110) => C::ISA_ZBA,
        // min, minu, max, maxu
        (0b0000101, 0b100..=0b111) => C::ISA_ZBB,
        // clmul, clmulh
        (0b0000101, 0b001 | 0b011) => C::ISA_ZBKC,
        // rol, ror
        (0b0110000, 0b001 | 0b101) => zbb_or_zbkb,
        // zext.h is pack with rs2 = x0
        (0b0000100, 0b100) => C::ISA_ZBKB || (C::ISA_ZBB && word.rs2() == Default::default()),
        // packh
        (0b0000100, 0b111) => C::ISA_ZBKB,
        // bclr, bext
        (0b0100100, 0b001 | 0b101) => C::ISA_ZBS,
        // binv
        (0b0110100, 0b001) => C::ISA_ZBS,
        // bset
        (0b0010100, 0b001) => C::ISA_ZBS,
        // xperm8, xperm4
        (0b0010100, 0b100 | 0b010) => C::ISA_ZBKX,
        // czero.eqz, czero.nez
        (0b0000111, 0b101 | 0b111) => C::ISA_ZICOND,
        // sha512sum0r, sha512sum1r, sha512sig0l, sha512sig0h, sha512sig1l, sha512sig1h
        (0b0101000..=0b0101011 | 0b0101110 | 0b0101111, 0b000) => C::ISA_ZKNH,
        // aes32esi, aes32esmi with any byte select
        (funct7, 0b000) if matches!(funct7 & 0b11111, 0b10001 | 0b10011) => C::ISA_ZKNE,
        // aes32dsi, aes32dsmi
        (funct7, 0b000) if matches!(funct7 & 0b11111, 0b10101 | 0b10111) => C::ISA_ZKND,
        _ => false,
    }
}

fn atomic<C: Features>(word: InstructionWord) -> bool {
    if word.funct3() != funct3::WORD {
        return false;
    }
    match word.funct5() {
        funct5::LR => C::ISA_ZALRSC && word.rs2() == Default::default(),
        funct5::SC => C::ISA_ZALRSC,
        funct5::AMOSWAP
        | funct5::AMOADD
        | funct5::AMOXOR
        | funct5::AMOAND
        | funct5::AMOOR
        | funct5::AMOMIN
        | funct5::AMOMAX
        | funct5::AMOMINU
        | funct5::AMOMAXU => C::ISA_ZAAMO,
        _ => false,
    }
}

fn system<C: Features>(word: InstructionWord, context: &DecodeContext) -> bool {
    match word.funct3() {
        funct3::PRIV => {
            if word.rs1() != Default::default() || word.rd() != Default::default() {
                return false;
            }
            match word.funct12() {
                funct12::ECALL | funct12::EBREAK => true,
                funct12::MRET => context.privilege.is_machine(),
                funct12::DRET => C::ISA_SDEXT && context.debug_mode,
                funct12::WFI => context.privilege.is_machine() || !context.timeout_wait,
                _ => false,
            }
        }
        0b100 => false,
        _ => context.csr_access,
    }
}

/// The single-precision subset executed by the Zfinx co-processor.
fn floating_point(word: InstructionWord) -> bool {
    let format = word.funct7() & 0b11;
    let operation = word.funct7() >> 2;
    format == 0b00
        && matches!(
            operation,
            0b00000 // fadd
                | 0b00001 // fsub
                | 0b00010 // fmul
                | 0b00100 // fsgnj
                | 0b00101 // fmin, fmax
                | 0b10100 // fle, flt, feq
                | 0b11000 // fcvt.w.s
                | 0b11010 // fcvt.s.w
                | 0b11100 // fclass
        )
}
