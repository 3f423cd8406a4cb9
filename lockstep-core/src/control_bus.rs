//! The control bus: every signal the controller drives to the datapath during a cycle.

use crate::cs_registers::CsrSpecifier;
use crate::register_file::Specifier;
use crate::PrivilegeLevel;

/// Operation selected by the ALU output multiplexer, a 3-bit field.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum AluOperation {
    #[default]
    Zero = 0,
    /// Addition, or subtraction with [`ControlBus::alu_subtract`].
    Add = 1,
    Xor = 2,
    Or = 3,
    And = 4,
    /// Comparison result `A < B` as `0` or `1`.
    SetOnLess = 5,
    /// Operand B, used by LUI.
    PassB = 6,
    /// Result of the co-processor that was last triggered.
    CoProcessor = 7,
}

/// ALU operand A source.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum OperandA {
    #[default]
    Rs1,
    Pc,
}

/// ALU operand B source.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum OperandB {
    #[default]
    Rs2,
    Immediate,
}

/// Selects which unit output is stored to `rd` by the register file.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum WriteBackSource {
    #[default]
    Alu,
    Lsu,
    Csr,
    ReturnAddress,
}

/// Flat set of control signals, produced once per cycle by the controller.
///
/// All fields are independent wires. The bus only describes the current cycle: units sample it on
/// the next rising edge, and a fresh bus is driven after each edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlBus {
    // Instruction fetch
    /// Instruction fence: flush the prefetch buffer and restart at `pc_next`.
    pub if_fence: bool,
    /// Restart fetching at `pc_next`.
    pub if_reset: bool,
    /// The fetched instruction word has been consumed.
    pub if_acknowledge: bool,

    // Program counter
    /// Address of the instruction being dispatched or executed.
    pub pc_current: u32,
    pub pc_next: u32,
    /// `pc + 4` of the executing instruction.
    pub pc_return: u32,

    // Register file
    pub rf_write_back_enable: bool,
    pub rf_rs1: Specifier,
    pub rf_rs2: Specifier,
    pub rf_rd: Specifier,
    pub rf_write_select: WriteBackSource,

    // Arithmetic logic unit
    pub alu_operation: AluOperation,
    pub alu_subtract: bool,
    pub alu_operand_a: OperandA,
    pub alu_operand_b: OperandB,
    /// Unsigned comparison.
    pub alu_unsigned: bool,
    /// Start the base (shift) co-processor.
    pub alu_base_trigger: bool,
    /// Start the custom functions unit.
    pub alu_cfu_trigger: bool,
    /// Start the floating point unit.
    pub alu_fpu_trigger: bool,
    pub alu_immediate: u32,

    // Load store unit
    /// Capture address, size and write data from the ALU and `rs2`.
    pub lsu_enable: bool,
    /// Put the captured access on the data bus.
    pub lsu_request: bool,
    /// `true` for a write.
    pub lsu_read_write: bool,
    pub lsu_atomic: bool,
    pub lsu_fence: bool,
    /// Effective privilege of data accesses.
    pub lsu_privileged: PrivilegeLevel,

    // CSR bank
    pub csr_address: CsrSpecifier,
    pub csr_read_enable: bool,
    pub csr_write_enable: bool,
    pub csr_write_data: u32,

    // Instruction register
    pub ir_funct3: u8,
    pub ir_funct12: u16,
    pub ir_opcode: u8,

    // Status
    pub cpu_privileged: PrivilegeLevel,
    pub cpu_sleep: bool,
    /// Asserted during trap entry, aborts every unit's in-flight operation.
    pub cpu_trap: bool,
    pub cpu_debug: bool,
}

impl ControlBus {
    /// `true` when any co-processor is started this cycle.
    pub fn any_trigger(&self) -> bool {
        self.alu_base_trigger || self.alu_cfu_trigger || self.alu_fpu_trigger
    }
}
