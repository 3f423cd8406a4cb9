//! Physical memory protection.
//!
//! > PMP entries are described by an 8-bit configuration register and one MXLEN-bit address
//! > register. [...] PMP entries are statically prioritized. The lowest-numbered PMP entry that
//! > matches any byte of an access determines whether that access succeeds or fails.

use crate::control_bus::ControlBus;
use crate::cs_registers::{specifier, CsrSpecifier};
use crate::features::Features;
use crate::simulator::Clocked;
use crate::PrivilegeLevel;
use bitvec::{field::BitField, order::Lsb0, view::BitView};
use log::debug;
use std::marker::PhantomData;

/// Maximum number of regions an implementation can provide.
pub const MAX_REGIONS: usize = 16;

/// Address matching mode of a region, the `A` field of its configuration.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum Mode {
    #[default]
    Off = 0,
    /// Top of range: the region ends below this entry's address and starts at the previous one.
    TopOfRange = 1,
    /// Naturally aligned four-byte region.
    NaturallyAligned4 = 2,
    /// Naturally aligned power-of-two region, at least eight bytes.
    NaturallyAlignedPowerOfTwo = 3,
}

impl Mode {
    fn from_u2(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::Off,
            1 => Self::TopOfRange,
            2 => Self::NaturallyAligned4,
            _ => Self::NaturallyAlignedPowerOfTwo,
        }
    }
}

/// Kind of access being checked.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Access {
    Read,
    Write,
    Execute,
    /// Atomic read-modify-write, requiring both read and write permission.
    ReadWrite,
}

/// An 8-bit `pmpcfg` entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct Config(u8);

impl Config {
    pub fn read(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::R]
    }

    pub fn write(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::W]
    }

    pub fn execute(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::X]
    }

    pub fn mode(self) -> Mode {
        Mode::from_u2(self.0.view_bits::<Lsb0>()[idx::A..idx::A + 2].load_le())
    }

    pub fn locked(self) -> bool {
        self.0.view_bits::<Lsb0>()[idx::L]
    }

    fn permits(self, access: Access) -> bool {
        match access {
            Access::Read => self.read(),
            Access::Write => self.write(),
            Access::Execute => self.execute(),
            Access::ReadWrite => self.read() && self.write(),
        }
    }
}

impl From<Config> for u8 {
    fn from(value: Config) -> Self {
        value.0
    }
}

/// Bit indices into a configuration byte.
mod idx {
    pub const R: usize = 0;
    pub const W: usize = 1;
    pub const X: usize = 2;
    pub const A: usize = 3;
    pub const L: usize = 7;
}

/// The protection unit: `C::PMP_REGIONS` ordered entries.
#[derive(Debug, Clone)]
pub struct PhysicalMemoryProtectionUnit<C: Features> {
    configs: [Config; MAX_REGIONS],
    addresses: [u32; MAX_REGIONS],
    _features: PhantomData<C>,
}

/// Signals sampled by the PMP on the rising clock edge.
#[derive(Debug, Copy, Clone)]
pub struct PmpInputs<'a> {
    pub bus: &'a ControlBus,
}

impl<C: Features> Default for PhysicalMemoryProtectionUnit<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Features> PhysicalMemoryProtectionUnit<C> {
    /// Granularity exponent `G`: regions are at least `2^(G+2)` bytes.
    const G: u32 = C::PMP_GRANULARITY.trailing_zeros() - 2;
    const REGIONS: usize = if C::ISA_SMPMP { C::PMP_REGIONS } else { 0 };

    pub fn new() -> Self {
        assert!(C::PMP_REGIONS <= MAX_REGIONS, "too many PMP regions");
        assert!(
            C::PMP_GRANULARITY.is_power_of_two() && C::PMP_GRANULARITY >= 4,
            "PMP granularity must be a power of two of at least 4 bytes"
        );
        Self {
            configs: [Config::default(); MAX_REGIONS],
            addresses: [0; MAX_REGIONS],
            _features: PhantomData,
        }
    }

    pub fn config(&self, index: usize) -> Config {
        if index < Self::REGIONS {
            self.configs[index]
        } else {
            Config::default()
        }
    }

    /// Returns `true` if the CSR is one of the implemented PMP registers.
    pub fn implements(specifier: CsrSpecifier) -> bool {
        Self::csr_target(specifier).is_some()
    }

    fn csr_target(csr: CsrSpecifier) -> Option<Target> {
        match csr {
            specifier::PMPCFG0..=specifier::PMPCFG3 => {
                let index = usize::from(csr - specifier::PMPCFG0);
                (index * 4 < Self::REGIONS).then_some(Target::Config(index))
            }
            specifier::PMPADDR0..=specifier::PMPADDR15 => {
                let index = usize::from(csr - specifier::PMPADDR0);
                (index < Self::REGIONS).then_some(Target::Address(index))
            }
            _ => None,
        }
    }

    /// Read a PMP CSR, or `None` if the CSR doesn't belong to this unit.
    pub fn read_csr(&self, csr: CsrSpecifier) -> Option<u32> {
        Some(match Self::csr_target(csr)? {
            Target::Config(register) => (0..4).fold(0, |value, byte| {
                value | u32::from(u8::from(self.config(register * 4 + byte))) << (byte * 8)
            }),
            Target::Address(index) => self.address(index),
        })
    }

    /// Address register `index` as read back through its CSR.
    pub fn address(&self, index: usize) -> u32 {
        if index >= Self::REGIONS {
            return 0;
        }
        let raw = self.addresses[index];
        match self.configs[index].mode() {
            Mode::NaturallyAlignedPowerOfTwo if Self::G >= 2 => {
                raw | ((1 << Self::G.saturating_sub(1)) - 1)
            }
            Mode::Off | Mode::TopOfRange if Self::G >= 1 => raw & !((1 << Self::G) - 1),
            _ => raw,
        }
    }

    /// Byte range `start..end` covered by region `index`, if it is enabled.
    fn range(&self, index: usize) -> Option<(u64, u64)> {
        let address = u64::from(self.address(index));
        match self.configs[index].mode() {
            Mode::Off => None,
            Mode::TopOfRange => {
                let start = match index {
                    0 => 0,
                    _ => u64::from(self.address(index - 1)) << 2,
                };
                Some((start, address << 2))
            }
            Mode::NaturallyAligned4 => Some((address << 2, (address << 2) + 4)),
            Mode::NaturallyAlignedPowerOfTwo => {
                let ones = address.trailing_ones();
                let size = 1u64 << (ones + 3);
                let start = (address << 2) & !(size - 1);
                Some((start, start + size))
            }
        }
    }

    /// Returns `true` if the access must be faulted.
    pub fn fault(
        &self,
        address: u32,
        access: Access,
        privilege: PrivilegeLevel,
        debug: bool,
    ) -> bool {
        if Self::REGIONS == 0 || debug {
            return false;
        }
        let address = u64::from(address);
        let matched = (0..Self::REGIONS).find(|&index| {
            self.range(index)
                .is_some_and(|(start, end)| start <= address && address < end)
        });
        match matched {
            Some(index) => {
                let config = self.configs[index];
                let allowed =
                    config.permits(access) || (privilege.is_machine() && !config.locked());
                !allowed
            }
            None => !privilege.is_machine(),
        }
    }

    fn write_config(&mut self, register: usize, value: u32) {
        for byte in 0..4 {
            let index = register * 4 + byte;
            if index >= Self::REGIONS || self.configs[index].locked() {
                continue;
            }
            let mut config = (value >> (byte * 8)) as u8 & 0b1001_1111;
            let bits = config.view_bits_mut::<Lsb0>();
            let mode = Mode::from_u2(bits[idx::A..idx::A + 2].load_le());
            let supported = match mode {
                Mode::Off => true,
                Mode::TopOfRange => C::PMP_TOP_OF_RANGE,
                Mode::NaturallyAligned4 | Mode::NaturallyAlignedPowerOfTwo => {
                    C::PMP_NATURALLY_ALIGNED
                }
            };
            if !supported {
                bits[idx::A..idx::A + 2].store_le(Mode::Off as u8);
            }
            let config = Config(config);
            if config.locked() {
                debug!("Locking PMP entry {index} with configuration {:#04x}", config.0);
            }
            self.configs[index] = config;
        }
    }

    fn write_address(&mut self, index: usize, value: u32) {
        let next_locks_tor = index + 1 < Self::REGIONS
            && self.configs[index + 1].locked()
            && self.configs[index + 1].mode() == Mode::TopOfRange;
        if self.configs[index].locked() || next_locks_tor {
            return;
        }
        self.addresses[index] = value;
    }
}

#[derive(Debug, Copy, Clone)]
enum Target {
    Config(usize),
    Address(usize),
}

impl<C: Features> Clocked for PhysicalMemoryProtectionUnit<C> {
    type Inputs<'a> = PmpInputs<'a>;

    fn reset(&mut self) {
        self.configs = [Config::default(); MAX_REGIONS];
        self.addresses = [0; MAX_REGIONS];
    }

    fn rising_edge(&mut self, inputs: PmpInputs<'_>) {
        let bus = inputs.bus;
        if !bus.csr_write_enable {
            return;
        }
        match Self::csr_target(bus.csr_address) {
            Some(Target::Config(register)) => self.write_config(register, bus.csr_write_data),
            Some(Target::Address(index)) => self.write_address(index, bus.csr_write_data),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alu::shifter::BarrelShifter;
    use crate::features::Rv32i;

    #[derive(Debug, Clone, Copy)]
    struct Protected;

    impl Features for Protected {
        type Shifter = BarrelShifter;
        const ISA_U: bool = true;
        const ISA_SMPMP: bool = true;
        const PMP_REGIONS: usize = 4;
    }

    #[derive(Debug, Clone, Copy)]
    struct Coarse;

    impl Features for Coarse {
        type Shifter = BarrelShifter;
        const ISA_SMPMP: bool = true;
        const PMP_REGIONS: usize = 2;
        const PMP_GRANULARITY: u32 = 16;
        const PMP_TOP_OF_RANGE: bool = false;
    }

    const R: u8 = 1 << idx::R;
    const W: u8 = 1 << idx::W;
    const X: u8 = 1 << idx::X;
    const L: u8 = 1 << idx::L;
    const TOR: u8 = (Mode::TopOfRange as u8) << idx::A;
    const NA4: u8 = (Mode::NaturallyAligned4 as u8) << idx::A;
    const NAPOT: u8 = (Mode::NaturallyAlignedPowerOfTwo as u8) << idx::A;

    fn write<C: Features>(pmp: &mut PhysicalMemoryProtectionUnit<C>, csr: CsrSpecifier, value: u32) {
        let bus = ControlBus {
            csr_write_enable: true,
            csr_address: csr,
            csr_write_data: value,
            ..ControlBus::default()
        };
        pmp.tick(PmpInputs { bus: &bus }, true);
    }

    #[test]
    fn test_top_of_range_boundaries() {
        let mut pmp = PhysicalMemoryProtectionUnit::<Protected>::new();
        write(&mut pmp, specifier::PMPADDR0, 0x1000 >> 2);
        write(&mut pmp, specifier::PMPADDR0 + 1, 0x2000 >> 2);
        write(
            &mut pmp,
            specifier::PMPCFG0,
            u32::from(TOR | R) | u32::from(TOR | R | W) << 8,
        );
        let user = PrivilegeLevel::User;
        assert!(!pmp.fault(0x0FFC, Access::Read, user, false));
        assert!(pmp.fault(0x0FFC, Access::Write, user, false));
        // The boundary belongs to the higher region
        assert!(!pmp.fault(0x1000, Access::Write, user, false));
        assert!(!pmp.fault(0x1FFC, Access::Write, user, false));
        // Not covered by any region
        assert!(pmp.fault(0x2000, Access::Read, user, false));
        assert!(!pmp.fault(0x2000, Access::Read, PrivilegeLevel::Machine, false));
        assert!(!pmp.fault(0x2000, Access::Read, user, true));
    }

    #[test]
    fn test_napot_and_na4() {
        let mut pmp = PhysicalMemoryProtectionUnit::<Protected>::new();
        // 32 bytes at 0x8000_0000
        write(&mut pmp, specifier::PMPADDR0, (0x8000_0000 >> 2) | 0b11);
        write(&mut pmp, specifier::PMPADDR0 + 1, 0x100 >> 2);
        write(
            &mut pmp,
            specifier::PMPCFG0,
            u32::from(NAPOT | X) | u32::from(NA4 | R) << 8,
        );
        let user = PrivilegeLevel::User;
        assert!(!pmp.fault(0x8000_0000, Access::Execute, user, false));
        assert!(!pmp.fault(0x8000_001C, Access::Execute, user, false));
        assert!(pmp.fault(0x8000_0020, Access::Execute, user, false));
        assert!(pmp.fault(0x8000_0000, Access::Read, user, false));
        assert!(!pmp.fault(0x100, Access::Read, user, false));
        assert!(pmp.fault(0x104, Access::Read, user, false));
        assert!(pmp.fault(0x100, Access::ReadWrite, user, false));
    }

    #[test]
    fn test_machine_mode_and_lock() {
        let mut pmp = PhysicalMemoryProtectionUnit::<Protected>::new();
        write(&mut pmp, specifier::PMPADDR0, 0x1000 >> 2);
        write(&mut pmp, specifier::PMPCFG0, u32::from(TOR));
        let machine = PrivilegeLevel::Machine;
        assert!(!pmp.fault(0x0, Access::Write, machine, false));

        write(&mut pmp, specifier::PMPCFG0, u32::from(TOR | R | L));
        assert!(pmp.fault(0x0, Access::Write, machine, false));
        assert!(!pmp.fault(0x0, Access::Read, machine, false));

        // Locked entries ignore configuration and address writes
        write(&mut pmp, specifier::PMPCFG0, u32::from(TOR | R | W | X));
        write(&mut pmp, specifier::PMPADDR0, 0);
        assert_eq!(Some(u32::from(TOR | R | L)), pmp.read_csr(specifier::PMPCFG0));
        assert_eq!(Some(0x1000 >> 2), pmp.read_csr(specifier::PMPADDR0));

        // Reset unlocks everything
        pmp.tick(PmpInputs { bus: &ControlBus::default() }, false);
        assert_eq!(Some(0), pmp.read_csr(specifier::PMPCFG0));
    }

    #[test]
    fn test_locked_top_of_range_protects_previous_address() {
        let mut pmp = PhysicalMemoryProtectionUnit::<Protected>::new();
        write(&mut pmp, specifier::PMPADDR0, 0x40);
        write(&mut pmp, specifier::PMPCFG0, u32::from(TOR | L) << 8);
        write(&mut pmp, specifier::PMPADDR0, 0x80);
        assert_eq!(Some(0x40), pmp.read_csr(specifier::PMPADDR0));
    }

    #[test]
    fn test_granularity_and_disabled_modes() {
        let mut pmp = PhysicalMemoryProtectionUnit::<Coarse>::new();
        write(&mut pmp, specifier::PMPADDR0, 0x1234_567A);
        // G = 2: OFF reads the low two bits as zero
        assert_eq!(Some(0x1234_5678), pmp.read_csr(specifier::PMPADDR0));
        write(&mut pmp, specifier::PMPCFG0, u32::from(NAPOT | R));
        // NAPOT reads bit G-2 as one, on top of the written bits
        assert_eq!(Some(0x1234_567B), pmp.read_csr(specifier::PMPADDR0));
        // TOR isn't implemented and is written as OFF
        write(&mut pmp, specifier::PMPCFG0, u32::from(TOR | R) << 8);
        assert_eq!(Mode::Off, pmp.config(1).mode());
        assert!(!PhysicalMemoryProtectionUnit::<Coarse>::implements(specifier::PMPADDR0 + 2));
        assert!(!PhysicalMemoryProtectionUnit::<Coarse>::implements(specifier::PMPCFG0 + 1));
    }

    #[test]
    fn test_disabled_unit() {
        let mut pmp = PhysicalMemoryProtectionUnit::<Rv32i>::new();
        write(&mut pmp, specifier::PMPCFG0, u32::from(TOR | L));
        assert_eq!(None, pmp.read_csr(specifier::PMPCFG0));
        assert!(!pmp.fault(0, Access::Write, PrivilegeLevel::User, false));
    }
}
