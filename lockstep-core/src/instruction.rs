//! Field extraction and immediate generation for 32-bit instruction words.

use crate::constants::opcode;
use crate::register_file::Specifier;
use bitvec::prelude::*;
use std::fmt;

/// Raw instruction word as latched by the execution engine.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct InstructionWord(pub u32);

/// Base instruction formats, selecting how the immediate is scattered over the word.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Format {
    R,
    I,
    S,
    B,
    U,
    J,
}

impl InstructionWord {
    fn bits(&self) -> &BitSlice<u32, Lsb0> {
        self.0.view_bits::<Lsb0>()
    }

    /// The 7-bit major opcode, including the two low `11` bits.
    pub fn opcode(self) -> u8 {
        self.bits()[0..7].load_le()
    }

    pub fn rd(self) -> Specifier {
        Specifier::from_u5(self.bits()[7..12].load_le())
    }

    pub fn funct3(self) -> u8 {
        self.bits()[12..15].load_le()
    }

    pub fn rs1(self) -> Specifier {
        Specifier::from_u5(self.bits()[15..20].load_le())
    }

    pub fn rs2(self) -> Specifier {
        Specifier::from_u5(self.bits()[20..25].load_le())
    }

    /// Third source register of R4-type instructions, bits 31:27.
    pub fn rs3(self) -> Specifier {
        Specifier::from_u5(self.bits()[27..32].load_le())
    }

    pub fn funct7(self) -> u8 {
        self.bits()[25..32].load_le()
    }

    /// Bits 31:20, used by SYSTEM instructions, shifts and the bit-manipulation unary ops.
    pub fn funct12(self) -> u16 {
        self.bits()[20..32].load_le()
    }

    /// Bits 31:27, the AMO sub-opcode.
    pub fn funct5(self) -> u8 {
        self.bits()[27..32].load_le()
    }

    /// 12-bit CSR address of SYSTEM instructions.
    pub fn csr(self) -> u16 {
        self.funct12()
    }

    /// The 5-bit zero-extended immediate of CSRR*I instructions, stored in the rs1 field.
    pub fn zimm(self) -> u32 {
        self.bits()[15..20].load_le()
    }

    pub fn format(self) -> Format {
        match self.opcode() {
            opcode::LUI | opcode::AUIPC => Format::U,
            opcode::JAL => Format::J,
            opcode::BRANCH => Format::B,
            opcode::STORE => Format::S,
            opcode::JALR | opcode::LOAD | opcode::OP_IMM | opcode::SYSTEM | opcode::MISC_MEM => {
                Format::I
            }
            _ => Format::R,
        }
    }

    /// The immediate of the instruction's format, sign-extended to 32 bits. R-type yields zero.
    pub fn immediate(self) -> u32 {
        match self.format() {
            Format::R => 0,
            Format::I => self.i_immediate(),
            Format::S => self.s_immediate(),
            Format::B => self.b_immediate(),
            Format::U => self.u_immediate(),
            Format::J => self.j_immediate(),
        }
    }

    pub fn i_immediate(self) -> u32 {
        let bits = self.bits();
        let mut imm = 0u32;
        let out = imm.view_bits_mut::<Lsb0>();
        out[0..11].store_le(bits[20..31].load_le::<u16>());
        out[11..32].fill(bits[31]);
        imm
    }

    pub fn s_immediate(self) -> u32 {
        let bits = self.bits();
        let mut imm = 0u32;
        let out = imm.view_bits_mut::<Lsb0>();
        out[0..5].store_le(bits[7..12].load_le::<u8>());
        out[5..11].store_le(bits[25..31].load_le::<u8>());
        out[11..32].fill(bits[31]);
        imm
    }

    pub fn b_immediate(self) -> u32 {
        let bits = self.bits();
        let mut imm = 0u32;
        let out = imm.view_bits_mut::<Lsb0>();
        out[1..5].store_le(bits[8..12].load_le::<u8>());
        out[5..11].store_le(bits[25..31].load_le::<u8>());
        out.set(11, bits[7]);
        out[12..32].fill(bits[31]);
        imm
    }

    pub fn u_immediate(self) -> u32 {
        self.0 & 0xFFFF_F000
    }

    pub fn j_immediate(self) -> u32 {
        let bits = self.bits();
        let mut imm = 0u32;
        let out = imm.view_bits_mut::<Lsb0>();
        out[1..11].store_le(bits[21..31].load_le::<u16>());
        out.set(11, bits[20]);
        out[12..20].store_le(bits[12..20].load_le::<u8>());
        out[20..32].fill(bits[31]);
        imm
    }
}

impl fmt::Display for InstructionWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
