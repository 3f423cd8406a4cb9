//! Shift co-processors.
//!
//! Two implementations of the same operation: [`SerialShifter`] shifts one bit per cycle and
//! [`BarrelShifter`] finishes in a single cycle. Both report identical results once their
//! `valid` flag is set.

use crate::constants::funct3;
use std::fmt::Debug;

/// Signals sampled by a shifter on the rising clock edge.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct ShifterInputs {
    /// Base co-processor trigger from the control bus.
    pub trigger: bool,
    pub funct3: u8,
    pub funct12: u16,
    pub rs1: u32,
    /// Shift amount, up to 6 bits.
    pub amount: u32,
    /// Abort the current operation.
    pub cpu_trap: bool,
}

impl ShifterInputs {
    /// The trigger is only a shift command for SLL(I), SRL(I) and SRA(I).
    pub fn command_valid(&self) -> bool {
        let funct7 = self.funct12 >> 5;
        self.trigger
            && match self.funct3 {
                funct3::SLL => funct7 == 0,
                funct3::SRL_SRA => funct7 == 0 || funct7 == 0b0100000,
                _ => false,
            }
    }

    fn is_right(&self) -> bool {
        self.funct3 & 0b100 != 0
    }

    /// Bit shifted in from the left by right shifts.
    fn fill(&self) -> bool {
        self.is_right() && (self.funct12 >> 10) & 1 != 0 && self.rs1 >> 31 != 0
    }
}

/// A shift co-processor slot of the ALU.
pub trait ShiftUnit: Debug + Clone + Default {
    fn reset(&mut self);

    fn rising_edge(&mut self, inputs: &ShifterInputs);

    /// The result is complete.
    fn valid(&self) -> bool;

    fn result(&self) -> u32;

    fn tick(&mut self, inputs: &ShifterInputs, reset_n: bool) {
        if reset_n {
            self.rising_edge(inputs);
        } else {
            self.reset();
        }
    }
}

/// Bit-serial shifter: a down-counter loaded with the shift amount, shifting once per cycle.
#[derive(Debug, Clone, Default)]
pub struct SerialShifter {
    busy: bool,
    count: u32,
    shift_register: u32,
    right: bool,
    fill: bool,
    valid: bool,
    result: u32,
}

impl SerialShifter {
    fn count_done(&self) -> bool {
        self.count & !1 == 0
    }
}

impl ShiftUnit for SerialShifter {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn rising_edge(&mut self, inputs: &ShifterInputs) {
        let command = inputs.command_valid();
        let done = self.count_done();
        if command {
            self.busy = true;
        } else if done || inputs.cpu_trap {
            self.busy = false;
        }

        if command {
            self.count = inputs.amount & 0x3F;
            self.shift_register = inputs.rs1;
            self.right = inputs.is_right();
            self.fill = inputs.fill();
        } else if self.count != 0 {
            self.count -= 1;
            self.shift_register = if self.right {
                (self.shift_register >> 1) | (u32::from(self.fill) << 31)
            } else {
                self.shift_register << 1
            };
        }

        self.valid = !self.busy && self.count_done();
        self.result = if self.valid { self.shift_register } else { 0 };
    }

    fn valid(&self) -> bool {
        self.valid
    }

    fn result(&self) -> u32 {
        self.result
    }
}

/// Single-cycle shifter built from a six level logarithmic tree.
#[derive(Debug, Clone, Default)]
pub struct BarrelShifter {
    valid: bool,
    result: u32,
}

impl BarrelShifter {
    /// Right shift through levels of `2^0..=2^5` positions, each shifting in `fill` bits.
    fn shift_right(value: u32, amount: u32, fill: bool) -> u32 {
        let extension = if fill { 0xFFFF_FFFF_0000_0000u64 } else { 0 };
        (0..6)
            .filter(|&level| (amount >> level) & 1 != 0)
            .fold(value, |value, level| {
                ((extension | u64::from(value)) >> (1 << level)) as u32
            })
    }

    /// Left shifts reverse the operand, share the right shift tree and reverse the result back.
    fn shift(inputs: &ShifterInputs) -> u32 {
        let amount = inputs.amount & 0x3F;
        if inputs.is_right() {
            Self::shift_right(inputs.rs1, amount, inputs.fill())
        } else {
            Self::shift_right(inputs.rs1.reverse_bits(), amount, false).reverse_bits()
        }
    }
}

impl ShiftUnit for BarrelShifter {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn rising_edge(&mut self, inputs: &ShifterInputs) {
        if inputs.command_valid() {
            self.valid = true;
            self.result = Self::shift(inputs);
        }
    }

    fn valid(&self) -> bool {
        self.valid
    }

    fn result(&self) -> u32 {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const SRA: u16 = 0b0100000 << 5;

    fn command(funct3: u8, funct12: u16, rs1: u32, amount: u32) -> ShifterInputs {
        ShifterInputs {
            trigger: true,
            funct3,
            funct12,
            rs1,
            amount,
            cpu_trap: false,
        }
    }

    fn idle() -> ShifterInputs {
        ShifterInputs::default()
    }

    /// Issue a command and clock the unit until it reports a valid result.
    fn run<S: ShiftUnit>(inputs: ShifterInputs) -> u32 {
        let mut shifter = S::default();
        shifter.tick(&inputs, true);
        for _ in 0..64 {
            if shifter.valid() {
                return shifter.result();
            }
            shifter.tick(&idle(), true);
        }
        panic!("shifter never finished");
    }

    #[test]
    fn test_command_valid() {
        assert!(command(funct3::SLL, 0, 0, 0).command_valid());
        assert!(command(funct3::SRL_SRA, SRA, 0, 0).command_valid());
        assert!(!command(funct3::SLL, SRA, 0, 0).command_valid());
        assert!(!command(funct3::ADD_SUB, 0, 0, 0).command_valid());
        assert!(!ShifterInputs {
            trigger: false,
            ..command(funct3::SLL, 0, 0, 0)
        }
        .command_valid());
    }

    #[test]
    fn test_barrel_single_cycle() {
        let mut shifter = BarrelShifter::default();
        shifter.tick(&command(funct3::SRL_SRA, 0, 32, 1), true);
        assert!(shifter.valid());
        assert_eq!(16, shifter.result());
        // Held without a new command
        shifter.tick(&idle(), true);
        assert!(shifter.valid());
        assert_eq!(16, shifter.result());
        shifter.tick(&idle(), false);
        assert!(!shifter.valid());
        assert_eq!(0, shifter.result());
    }

    #[test]
    fn test_serial_timing_with_held_trigger() {
        let mut serial = SerialShifter::default();
        let mut barrel = BarrelShifter::default();
        let shift = command(funct3::SRL_SRA, 0, 31, 3);
        let idle = idle();

        barrel.tick(&shift, true);
        assert!(barrel.valid());
        assert_eq!(3, barrel.result());

        for cycle in 1..=5 {
            serial.tick(if cycle <= 3 { &shift } else { &idle }, true);
            assert!(!serial.valid(), "valid too early in cycle {cycle}");
            assert_eq!(0, serial.result());
        }
        serial.tick(&idle, true);
        assert!(serial.valid());
        assert_eq!(3, serial.result());
    }

    #[test]
    fn test_serial_abort_on_trap() {
        let mut serial = SerialShifter::default();
        serial.tick(&command(funct3::SLL, 0, 1, 20), true);
        serial.tick(
            &ShifterInputs {
                cpu_trap: true,
                ..idle()
            },
            true,
        );
        assert!(!serial.busy);
    }

    #[test]
    fn test_arithmetic_fill() {
        let value = 0x8000_0000;
        assert_eq!(0xF000_0000, run::<BarrelShifter>(command(funct3::SRL_SRA, SRA, value, 3)));
        assert_eq!(0xF000_0000, run::<SerialShifter>(command(funct3::SRL_SRA, SRA, value, 3)));
        assert_eq!(0x1000_0000, run::<BarrelShifter>(command(funct3::SRL_SRA, 0, value, 3)));
        assert_eq!(u32::MAX, run::<BarrelShifter>(command(funct3::SRL_SRA, SRA, value, 32)));
        assert_eq!(0, run::<SerialShifter>(command(funct3::SLL, 0, value, 32)));
        // Positive values shift in zeros even for SRA
        assert_eq!(0x0100_0000, run::<SerialShifter>(command(funct3::SRL_SRA, SRA, 1 << 30, 6)));
    }

    #[test]
    fn test_serial_and_barrel_agree() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        let kinds = [(funct3::SLL, 0), (funct3::SRL_SRA, 0), (funct3::SRL_SRA, SRA)];
        for _ in 0..64 {
            let value: u32 = rng.random();
            for amount in 0..=32 {
                for &(funct3, funct12) in &kinds {
                    let inputs = command(funct3, funct12, value, amount);
                    let serial = run::<SerialShifter>(inputs);
                    let barrel = run::<BarrelShifter>(inputs);
                    assert_eq!(
                        serial, barrel,
                        "{value:#010x} funct3={funct3} funct12={funct12:#x} amount={amount}"
                    );
                }
            }
        }
    }
}
