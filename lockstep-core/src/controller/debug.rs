//! Debug mode CSRs and the instruction address trigger.

use crate::features::Features;
use crate::{PrivilegeLevel, RawPrivilegeLevel};
use bitvec::{field::BitField, order::Lsb0, view::BitView};

/// External debug support version 1.0.
const XDEBUGVER: u32 = 4;

/// Debug control and status register (`dcsr`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugControlAndStatusRegister {
    pub ebreakm: bool,
    pub ebreaku: bool,
    pub stopcount: bool,
    /// Cause of the last debug mode entry, one of the `trap_code::DEBUG_*` low bits.
    pub cause: u8,
    /// MPRV is honored in debug mode.
    pub mprven: bool,
    /// Single-step: re-enter debug mode after one instruction.
    pub step: bool,
    /// Privilege level to return to on `dret`.
    pub prv: PrivilegeLevel,
}

mod dcsr_idx {
    pub const PRV: usize = 0;
    pub const STEP: usize = 2;
    pub const MPRVEN: usize = 4;
    pub const CAUSE: usize = 6;
    pub const STOPCOUNT: usize = 10;
    pub const EBREAKU: usize = 12;
    pub const EBREAKM: usize = 15;
    pub const XDEBUGVER: usize = 28;
}

impl DebugControlAndStatusRegister {
    pub fn read(&self) -> u32 {
        let mut value = 0u32;
        let bits = value.view_bits_mut::<Lsb0>();
        bits[dcsr_idx::PRV..(dcsr_idx::PRV + 2)].store_le(self.prv.to_u2());
        bits.set(dcsr_idx::STEP, self.step);
        bits.set(dcsr_idx::MPRVEN, self.mprven);
        bits[dcsr_idx::CAUSE..(dcsr_idx::CAUSE + 3)].store_le(self.cause);
        bits.set(dcsr_idx::STOPCOUNT, self.stopcount);
        bits.set(dcsr_idx::EBREAKU, self.ebreaku);
        bits.set(dcsr_idx::EBREAKM, self.ebreakm);
        bits[dcsr_idx::XDEBUGVER..].store_le(XDEBUGVER);
        value
    }

    /// `cause` and `xdebugver` are read-only. The user mode fields only exist with `U`.
    pub fn write<C: Features>(&mut self, value: u32) {
        let bits = value.view_bits::<Lsb0>();
        self.ebreakm = bits[dcsr_idx::EBREAKM];
        self.stopcount = bits[dcsr_idx::STOPCOUNT];
        self.step = bits[dcsr_idx::STEP];
        if C::ISA_U {
            self.ebreaku = bits[dcsr_idx::EBREAKU];
            self.mprven = bits[dcsr_idx::MPRVEN];
            let prv = RawPrivilegeLevel::from_u2(bits[dcsr_idx::PRV..(dcsr_idx::PRV + 2)].load_le());
            self.prv = PrivilegeLevel::try_from(prv).unwrap_or(PrivilegeLevel::Machine);
        }
    }
}

/// The single instruction-address match trigger, reported through `tdata1` as `mcontrol6`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerMatchControlAndStatusRegister {
    /// Match on instruction execution.
    pub execute: bool,
    /// The trigger has fired since it was last armed (`hit0`).
    pub fired: bool,
    /// `tdata2`: the address to match.
    pub address: u32,
}

mod tdata1_idx {
    pub const EXECUTE: usize = 2;
    pub const U: usize = 3;
    pub const M: usize = 6;
    pub const ACTION: usize = 12;
    pub const HIT0: usize = 22;
    pub const DMODE: usize = 27;
    pub const TYPE: usize = 28;
}

impl TriggerMatchControlAndStatusRegister {
    /// `tinfo`: only `mcontrol6` triggers are supported.
    pub const INFO: u32 = 1 << 6;

    pub fn read<C: Features>(&self) -> u32 {
        let mut value = 0u32;
        let bits = value.view_bits_mut::<Lsb0>();
        bits.set(tdata1_idx::EXECUTE, self.execute);
        bits.set(tdata1_idx::U, C::ISA_U);
        bits.set(tdata1_idx::M, true);
        // Enter debug mode on a match
        bits[tdata1_idx::ACTION..(tdata1_idx::ACTION + 4)].store_le(1u8);
        bits.set(tdata1_idx::HIT0, self.fired);
        bits.set(tdata1_idx::DMODE, true);
        bits[tdata1_idx::TYPE..].store_le(6u8);
        value
    }

    /// Writing `hit0` as one clears the fired flag, re-arming the trigger.
    pub fn write(&mut self, value: u32) {
        let bits = value.view_bits::<Lsb0>();
        self.execute = bits[tdata1_idx::EXECUTE];
        if bits[tdata1_idx::HIT0] {
            self.fired = false;
        }
    }

    /// The trigger matches the instruction at `pc`.
    pub fn matches(&self, pc: u32) -> bool {
        self.execute && !self.fired && pc == self.address
    }
}

/// Debug mode state held by the controller.
#[derive(Debug, Clone, Default)]
pub struct DebugCsrs {
    pub dcsr: DebugControlAndStatusRegister,
    pub dpc: u32,
    pub dscratch0: u32,
    pub trigger: TriggerMatchControlAndStatusRegister,
}
