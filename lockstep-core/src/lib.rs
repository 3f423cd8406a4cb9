#[macro_use]
extern crate static_assertions;

use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

pub mod alu;
pub mod clock_gate;
pub mod constants;
pub mod control_bus;
pub mod controller;
pub mod cpu_core;
pub mod cs_registers;
pub mod dual_clock_fifo;
pub mod features;
pub mod fetch;
pub mod fifo;
pub mod instruction;
pub mod lsu;
pub mod memory_bus;
pub mod pmp;
pub mod register_file;
pub mod resources;
pub mod simulator;

pub use cpu_core::{Config, ConfigError, CpuCore};
pub use features::Features;

/// Privilege level as encoded in a 2-bit field.
///
/// CSR addresses encode the lowest privilege level allowed to access them in bits 9:8, and both
/// `mstatus.MPP` and `dcsr.prv` hold a 2-bit level. Those fields may name levels this core doesn't
/// implement, so they are first decoded into a [`RawPrivilegeLevel`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum RawPrivilegeLevel {
    User = 0,
    Supervisor = 1,
    Reserved = 2,
    Machine = 3,
}

impl RawPrivilegeLevel {
    /// Convert a 2-bit value into a [`RawPrivilegeLevel`].
    /// Panics if the value doesn't fit in 2 bits (`0..=3`).
    pub fn from_u2(value_u2: u8) -> Self {
        match value_u2 {
            0 => Self::User,
            1 => Self::Supervisor,
            2 => Self::Reserved,
            3 => Self::Machine,
            _ => panic!("out of range u2 used"),
        }
    }
}

impl fmt::Display for RawPrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            RawPrivilegeLevel::User => "U",
            RawPrivilegeLevel::Supervisor => "S",
            RawPrivilegeLevel::Reserved => "2",
            RawPrivilegeLevel::Machine => "M",
        })
    }
}

/// Privilege levels implemented by the core.
///
/// Machine mode is always present. User mode only exists when the `U` extension is enabled, see
/// [`Features::ISA_U`]. The control bus carries the level as a single bit (machine = 1).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Default)]
pub enum PrivilegeLevel {
    User = 0,
    #[default]
    Machine = 3,
}

impl PrivilegeLevel {
    pub fn is_machine(self) -> bool {
        self == Self::Machine
    }

    /// The 2-bit encoding used by `mstatus.MPP` and `dcsr.prv`.
    pub fn to_u2(self) -> u8 {
        self as u8
    }
}

#[derive(Error, Debug)]
#[error("privilege level {0} is not implemented")]
pub struct UnsupportedPrivilegeLevelError(RawPrivilegeLevel);

impl TryFrom<RawPrivilegeLevel> for PrivilegeLevel {
    type Error = UnsupportedPrivilegeLevelError;

    fn try_from(value: RawPrivilegeLevel) -> Result<Self, Self::Error> {
        match value {
            RawPrivilegeLevel::User => Ok(Self::User),
            RawPrivilegeLevel::Machine => Ok(Self::Machine),
            other => Err(UnsupportedPrivilegeLevelError(other)),
        }
    }
}

impl PartialEq<PrivilegeLevel> for RawPrivilegeLevel {
    fn eq(&self, other: &PrivilegeLevel) -> bool {
        *self as usize == *other as usize
    }
}

impl PartialOrd<PrivilegeLevel> for RawPrivilegeLevel {
    fn partial_cmp(&self, other: &PrivilegeLevel) -> Option<Ordering> {
        (*self as usize).partial_cmp(&(*other as usize))
    }
}

impl fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            PrivilegeLevel::User => "U",
            PrivilegeLevel::Machine => "M",
        })
    }
}
