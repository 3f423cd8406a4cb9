//! Arithmetic logic unit.
//!
//! The arithmetic and logic operations are purely combinational. Multi-cycle operations are
//! handed to a co-processor, of which only the shifter is implemented: the remaining base
//! operations, the custom functions unit and the floating point slots never report completion.

pub mod shifter;

use crate::control_bus::{AluOperation, ControlBus, OperandA, OperandB};
use crate::features::Features;
use crate::simulator::Clocked;
use shifter::{ShiftUnit, ShifterInputs};

/// Co-processor slot that was triggered most recently.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum CoProcessor {
    Shifter,
    /// Base co-processor operation other than a shift.
    Base,
    CustomFunctions,
    FloatingPoint,
}

#[derive(Debug, Clone)]
pub struct ArithmeticLogicUnit<C: Features> {
    shifter: C::Shifter,
    active: Option<CoProcessor>,
}

/// Operand values from the register file read ports.
#[derive(Debug, Copy, Clone)]
pub struct AluInputs<'a> {
    pub bus: &'a ControlBus,
    pub rs1: u32,
    pub rs2: u32,
}

/// Combinational ALU outputs.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct AluOutputs {
    pub result: u32,
    /// `A + B`, used for memory and jump target addresses.
    pub address: u32,
    /// `rs1 == B`
    pub equal: bool,
    /// `rs1 < B`, signed or unsigned as selected on the bus.
    pub less: bool,
    pub coprocessor_done: bool,
}

impl<C: Features> Default for ArithmeticLogicUnit<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Features> ArithmeticLogicUnit<C> {
    pub fn new() -> Self {
        Self {
            shifter: C::Shifter::default(),
            active: None,
        }
    }

    /// Completion of the triggered co-processor. Only depends on registered state.
    pub fn coprocessor_done(&self) -> bool {
        match self.active {
            Some(CoProcessor::Shifter) => self.shifter.valid(),
            _ => false,
        }
    }

    pub fn coprocessor_result(&self) -> u32 {
        match self.active {
            Some(CoProcessor::Shifter) => self.shifter.result(),
            _ => 0,
        }
    }

    fn operand_b(bus: &ControlBus, rs2: u32) -> u32 {
        match bus.alu_operand_b {
            OperandB::Rs2 => rs2,
            OperandB::Immediate => bus.alu_immediate,
        }
    }

    pub fn evaluate(&self, inputs: &AluInputs<'_>) -> AluOutputs {
        let bus = inputs.bus;
        let a = match bus.alu_operand_a {
            OperandA::Rs1 => inputs.rs1,
            OperandA::Pc => bus.pc_current,
        };
        let b = Self::operand_b(bus, inputs.rs2);

        let (equal, less) = compare(inputs.rs1, b, bus.alu_unsigned);
        let sum = if bus.alu_subtract {
            a.wrapping_sub(b)
        } else {
            a.wrapping_add(b)
        };
        let result = match bus.alu_operation {
            AluOperation::Zero => 0,
            AluOperation::Add => sum,
            AluOperation::Xor => a ^ b,
            AluOperation::Or => a | b,
            AluOperation::And => a & b,
            AluOperation::SetOnLess => u32::from(less),
            AluOperation::PassB => b,
            AluOperation::CoProcessor => self.coprocessor_result(),
        };
        AluOutputs {
            result,
            address: a.wrapping_add(b),
            equal,
            less,
            coprocessor_done: self.coprocessor_done(),
        }
    }
}

/// Compare through 33-bit operands: the borrow of the difference is the less-than flag.
fn compare(lhs: u32, rhs: u32, unsigned: bool) -> (bool, bool) {
    let extend = |value: u32| {
        let sign = !unsigned && value >> 31 != 0;
        u64::from(value) | (u64::from(sign) << 32)
    };
    let difference = extend(lhs).wrapping_sub(extend(rhs)) & 0x1_FFFF_FFFF;
    (lhs == rhs, difference >> 32 != 0)
}

impl<C: Features> Clocked for ArithmeticLogicUnit<C> {
    type Inputs<'a> = AluInputs<'a>;

    fn reset(&mut self) {
        self.shifter.reset();
        self.active = None;
    }

    fn rising_edge(&mut self, inputs: AluInputs<'_>) {
        let bus = inputs.bus;
        let shift = ShifterInputs {
            trigger: bus.alu_base_trigger,
            funct3: bus.ir_funct3,
            funct12: bus.ir_funct12,
            rs1: inputs.rs1,
            amount: Self::operand_b(bus, inputs.rs2) & 0x1F,
            cpu_trap: bus.cpu_trap,
        };
        if bus.cpu_trap {
            self.active = None;
        } else if bus.alu_base_trigger {
            self.active = Some(if shift.command_valid() {
                CoProcessor::Shifter
            } else {
                CoProcessor::Base
            });
        } else if bus.alu_cfu_trigger {
            self.active = Some(CoProcessor::CustomFunctions);
        } else if bus.alu_fpu_trigger {
            self.active = Some(CoProcessor::FloatingPoint);
        }
        self.shifter.rising_edge(&shift);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::funct3;
    use crate::features::{Rv32i, Rv32iSerial};

    fn bus(operation: AluOperation) -> ControlBus {
        ControlBus {
            alu_operation: operation,
            ..ControlBus::default()
        }
    }

    fn evaluate(bus: &ControlBus, rs1: u32, rs2: u32) -> AluOutputs {
        ArithmeticLogicUnit::<Rv32i>::new().evaluate(&AluInputs { bus, rs1, rs2 })
    }

    #[test]
    fn test_add_sub() {
        let mut add = bus(AluOperation::Add);
        assert_eq!(3, evaluate(&add, 1, 2).result);
        add.alu_subtract = true;
        assert_eq!(u32::MAX, evaluate(&add, 1, 2).result);
        // The address adder never subtracts
        assert_eq!(3, evaluate(&add, 1, 2).address);
    }

    #[test]
    fn test_operand_muxes() {
        let bus = ControlBus {
            alu_operation: AluOperation::Add,
            alu_operand_a: OperandA::Pc,
            alu_operand_b: OperandB::Immediate,
            pc_current: 0x100,
            alu_immediate: 4,
            ..ControlBus::default()
        };
        assert_eq!(0x104, evaluate(&bus, 7, 9).result);
        let pass = ControlBus {
            alu_operation: AluOperation::PassB,
            alu_operand_b: OperandB::Immediate,
            alu_immediate: 0x1234_5000,
            ..ControlBus::default()
        };
        assert_eq!(0x1234_5000, evaluate(&pass, 7, 9).result);
    }

    #[test]
    fn test_comparison() {
        let mut slt = bus(AluOperation::SetOnLess);
        assert_eq!(1, evaluate(&slt, -1i32 as u32, 0).result);
        assert_eq!(0, evaluate(&slt, 0, -1i32 as u32).result);
        slt.alu_unsigned = true;
        assert_eq!(0, evaluate(&slt, -1i32 as u32, 0).result);
        assert_eq!(1, evaluate(&slt, 0, -1i32 as u32).result);
        assert!(evaluate(&slt, 5, 5).equal);
        assert!(!evaluate(&slt, 5, 5).less);
        // Extremes of the signed range
        assert_eq!((false, true), compare(i32::MIN as u32, i32::MAX as u32, false));
        assert_eq!((false, false), compare(i32::MIN as u32, i32::MAX as u32, true));
    }

    #[test]
    fn test_logic() {
        assert_eq!(0b0110, evaluate(&bus(AluOperation::Xor), 0b1100, 0b1010).result);
        assert_eq!(0b1110, evaluate(&bus(AluOperation::Or), 0b1100, 0b1010).result);
        assert_eq!(0b1000, evaluate(&bus(AluOperation::And), 0b1100, 0b1010).result);
        assert_eq!(0, evaluate(&bus(AluOperation::Zero), 0b1100, 0b1010).result);
    }

    fn shift_bus() -> ControlBus {
        ControlBus {
            alu_operation: AluOperation::CoProcessor,
            alu_base_trigger: true,
            ir_funct3: funct3::SRL_SRA,
            ..ControlBus::default()
        }
    }

    #[test]
    fn test_barrel_shift_done_after_one_clock() {
        let mut alu = ArithmeticLogicUnit::<Rv32i>::new();
        let bus = shift_bus();
        alu.tick(
            AluInputs {
                bus: &bus,
                rs1: 32,
                rs2: 1,
            },
            true,
        );
        let idle = ControlBus {
            alu_operation: AluOperation::CoProcessor,
            ..ControlBus::default()
        };
        let outputs = alu.evaluate(&AluInputs {
            bus: &idle,
            rs1: 32,
            rs2: 1,
        });
        assert!(outputs.coprocessor_done);
        assert_eq!(16, outputs.result);
    }

    #[test]
    fn test_serial_shift_through_alu() {
        let mut alu = ArithmeticLogicUnit::<Rv32iSerial>::new();
        let trigger = shift_bus();
        let idle = ControlBus {
            alu_operation: AluOperation::CoProcessor,
            ..ControlBus::default()
        };
        alu.tick(
            AluInputs {
                bus: &trigger,
                rs1: 0x80,
                rs2: 4,
            },
            true,
        );
        let mut cycles = 1;
        while !alu.coprocessor_done() {
            alu.tick(
                AluInputs {
                    bus: &idle,
                    rs1: 0,
                    rs2: 0,
                },
                true,
            );
            cycles += 1;
        }
        assert_eq!(5, cycles);
        assert_eq!(0x8, alu.coprocessor_result());
    }

    #[test]
    fn test_unimplemented_coprocessor_never_done() {
        let mut alu = ArithmeticLogicUnit::<Rv32i>::new();
        alu.tick(
            AluInputs {
                bus: &shift_bus(),
                rs1: 1,
                rs2: 1,
            },
            true,
        );
        assert!(alu.coprocessor_done());
        let cfu = ControlBus {
            alu_cfu_trigger: true,
            ..ControlBus::default()
        };
        alu.tick(
            AluInputs {
                bus: &cfu,
                rs1: 1,
                rs2: 1,
            },
            true,
        );
        assert!(!alu.coprocessor_done());
        assert_eq!(0, alu.coprocessor_result());
    }

    #[test]
    fn test_non_shift_base_operation_never_done() {
        let mut alu = ArithmeticLogicUnit::<Rv32i>::new();
        // mul: OP with funct7 = 0000001
        let mul = ControlBus {
            ir_funct3: funct3::ADD_SUB,
            ir_funct12: 0b0000001 << 5,
            ..shift_bus()
        };
        let inputs = AluInputs {
            bus: &mul,
            rs1: 3,
            rs2: 4,
        };
        alu.tick(inputs, true);
        alu.tick(inputs, true);
        assert!(!alu.coprocessor_done());
    }
}
