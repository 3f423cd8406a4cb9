//! General purpose register file.

use crate::control_bus::ControlBus;
use crate::features::{rs3_enabled, Features};
use crate::simulator::Clocked;
use std::fmt;
use std::marker::PhantomData;

/// The type of a single `x` register.
pub type X = u32;

/// The maximum number of `x` registers (indices start at `0` for `x0`).
pub const LEN: u8 = 32;

/// Register array with one write port, two registered read ports and an optional third
/// combinational read port.
///
/// There are 32 registers, or 16 with the embedded (`E`) register file. Register `x0` is not
/// part of the write loop and always reads zero.
///
/// `rs1` and `rs2` are sampled on the rising edge from the addresses on the control bus, so the
/// operands of an instruction become visible one cycle after its register specifiers are driven.
/// While reset is held low both read ports return zero.
#[derive(Debug, Clone)]
pub struct RegisterFile<C: Features> {
    x_registers: [X; LEN as usize],
    rs1: X,
    rs2: X,
    _features: PhantomData<C>,
}

/// Signals sampled by [`RegisterFile`] on the rising clock edge.
#[derive(Debug, Copy, Clone)]
pub struct RegisterFileInputs<'a> {
    pub bus: &'a ControlBus,
    /// Output of the write-back multiplexer, stored to `rd` when write-back is enabled.
    pub write_data: X,
}

impl<C: Features> Default for RegisterFile<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Features> RegisterFile<C> {
    /// Number of implemented registers.
    pub const COUNT: u8 = if C::ISA_E { 16 } else { 32 };

    pub fn new() -> Self {
        Self {
            x_registers: [0; LEN as usize],
            rs1: 0,
            rs2: 0,
            _features: PhantomData,
        }
    }

    fn index(specifier: Specifier) -> usize {
        usize::from(specifier.0 & (Self::COUNT - 1))
    }

    /// Registered first read port.
    pub fn rs1(&self) -> X {
        self.rs1
    }

    /// Registered second read port.
    pub fn rs2(&self) -> X {
        self.rs2
    }

    /// Combinational third read port, addressed by instruction bits 31:27.
    ///
    /// Reads zero unless a three-operand co-processor is configured.
    pub fn rs3(&self, bus: &ControlBus) -> X {
        if rs3_enabled::<C>() {
            let specifier = Specifier::from_u5((bus.ir_funct12 >> 7) as u8 & 0x1F);
            self.x(specifier)
        } else {
            0
        }
    }

    /// Returns the value of an `x` register, bypassing the read ports.
    pub fn x(&self, specifier: Specifier) -> X {
        self.x_registers[Self::index(specifier)]
    }

    /// Sets the value of an `x` register, bypassing the write port. Writes to `x0` are ignored.
    pub fn set_x(&mut self, specifier: Specifier, value: X) {
        let index = Self::index(specifier);
        if index != 0 {
            self.x_registers[index] = value;
        }
    }
}

impl<C: Features> Clocked for RegisterFile<C> {
    type Inputs<'a> = RegisterFileInputs<'a>;

    fn reset(&mut self) {
        self.x_registers = [0; LEN as usize];
        self.rs1 = 0;
        self.rs2 = 0;
    }

    fn rising_edge(&mut self, inputs: RegisterFileInputs<'_>) {
        let bus = inputs.bus;
        // Reads see the value from before this edge's write.
        self.rs1 = self.x(bus.rf_rs1);
        self.rs2 = self.x(bus.rf_rs2);
        if bus.rf_write_back_enable {
            self.set_x(bus.rf_rd, inputs.write_data);
        }
    }
}

/// An `x` register specifier. Can take values in the range `0..LEN`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Default)]
pub struct Specifier(u8);

impl Specifier {
    /// Register `x0`, a.k.a. register `zero`, always returns `0` on read, and ignores any writes.
    pub const X0: Self = Specifier(0);

    /// Create a register specifier from its index, returning `None` if `index > 31`.
    pub fn new<U: TryInto<u8>>(index: U) -> Option<Self> {
        let index = index.try_into().ok()?;
        (index < LEN).then_some(Self(index))
    }

    /// Convert a 5-bit value into a register specifier.
    /// Panics if the value doesn't fit in 5 bits (`0..=31`).
    pub fn from_u5(value_u5: u8) -> Self {
        const_assert_eq!(LEN, 32);
        if value_u5 > 31 {
            panic!("out of range u5 used");
        }
        Self(value_u5)
    }

    /// Returns `true` if the specifier names one of the upper 16 registers, which the embedded
    /// register file doesn't implement.
    pub fn is_upper_half(self) -> bool {
        self.0 & 0x10 != 0
    }
}

impl From<Specifier> for u8 {
    fn from(value: Specifier) -> Self {
        value.0
    }
}

impl From<Specifier> for usize {
    fn from(value: Specifier) -> Self {
        value.0 as usize
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{Rv32e, Rv32i};

    fn write_bus(rd: u8) -> ControlBus {
        ControlBus {
            rf_write_back_enable: true,
            rf_rd: Specifier::from_u5(rd),
            ..ControlBus::default()
        }
    }

    #[test]
    fn test_write_to_zero() {
        let mut registers = RegisterFile::<Rv32i>::new();
        let bus = write_bus(0);
        registers.tick(
            RegisterFileInputs {
                bus: &bus,
                write_data: 0xDEADBEEF,
            },
            true,
        );
        assert_eq!(0, registers.x(Specifier::X0));
    }

    #[test]
    fn test_registered_read_ports() {
        let mut registers = RegisterFile::<Rv32i>::new();
        let mut bus = write_bus(5);
        bus.rf_rs1 = Specifier::from_u5(5);
        let inputs = RegisterFileInputs {
            bus: &bus,
            write_data: 42,
        };
        registers.tick(inputs, true);
        // The read on the writing edge returns the old value.
        assert_eq!(0, registers.rs1());
        assert_eq!(42, registers.x(Specifier::from_u5(5)));
        bus.rf_write_back_enable = false;
        registers.tick(
            RegisterFileInputs {
                bus: &bus,
                write_data: 0,
            },
            true,
        );
        assert_eq!(42, registers.rs1());
    }

    #[test]
    fn test_reset_clears_read_ports() {
        let mut registers = RegisterFile::<Rv32i>::new();
        registers.set_x(Specifier::from_u5(1), 7);
        let bus = ControlBus {
            rf_rs1: Specifier::from_u5(1),
            ..ControlBus::default()
        };
        let inputs = RegisterFileInputs {
            bus: &bus,
            write_data: 0,
        };
        registers.tick(inputs, true);
        assert_eq!(7, registers.rs1());
        registers.tick(inputs, false);
        assert_eq!(0, registers.rs1());
        assert_eq!(0, registers.x(Specifier::from_u5(1)));
    }

    #[test]
    fn test_embedded_register_count() {
        assert_eq!(16, RegisterFile::<Rv32e>::COUNT);
        assert_eq!(32, RegisterFile::<Rv32i>::COUNT);
        let mut registers = RegisterFile::<Rv32e>::new();
        registers.set_x(Specifier::from_u5(15), 3);
        assert_eq!(3, registers.x(Specifier::from_u5(15)));
        assert!(Specifier::from_u5(16).is_upper_half());
    }

    #[test]
    fn test_specifier_range() {
        assert_eq!(Some(Specifier::from_u5(31)), Specifier::new(31u32));
        assert_eq!(Some(Specifier::X0), Specifier::new(0i64));
        assert_eq!(None, Specifier::new(32u8));
        assert_eq!(None, Specifier::new(-1i32));
    }

    #[test]
    fn test_rs3_disabled_reads_zero() {
        let mut registers = RegisterFile::<Rv32i>::new();
        registers.set_x(Specifier::from_u5(31), 9);
        let bus = ControlBus {
            ir_funct12: 0xF80,
            ..ControlBus::default()
        };
        assert_eq!(0, registers.rs3(&bus));
    }
}
