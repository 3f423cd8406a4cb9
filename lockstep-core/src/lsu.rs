//! Load/store unit: data bus access generation and response alignment.

use crate::constants::{funct3, funct5};
use crate::control_bus::ControlBus;
use crate::memory_bus::{AtomicOperation, MemoryBusRequest, MemoryBusResponse, Source};
use crate::pmp::Access;
use crate::simulator::Clocked;

/// Access width, from funct3\[1:0].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum Size {
    Byte,
    Half,
    #[default]
    Word,
}

impl Size {
    fn from_funct3(funct3: u8) -> Self {
        match funct3 & 0b11 {
            0b00 => Self::Byte,
            0b01 => Self::Half,
            _ => Self::Word,
        }
    }
}

/// Decode the AMO sub-opcode, `None` for reserved values.
pub fn atomic_operation(funct5: u8) -> Option<AtomicOperation> {
    Some(match funct5 {
        funct5::AMOSWAP => AtomicOperation::Swap,
        funct5::AMOADD => AtomicOperation::Add,
        funct5::AMOXOR => AtomicOperation::Xor,
        funct5::AMOAND => AtomicOperation::And,
        funct5::AMOOR => AtomicOperation::Or,
        funct5::AMOMIN => AtomicOperation::Min,
        funct5::AMOMAX => AtomicOperation::Max,
        funct5::AMOMINU => AtomicOperation::MinU,
        funct5::AMOMAXU => AtomicOperation::MaxU,
        funct5::LR => AtomicOperation::LoadReserved,
        funct5::SC => AtomicOperation::StoreConditional,
        _ => return None,
    })
}

/// Signals sampled by the LSU on the rising clock edge.
#[derive(Debug, Copy, Clone)]
pub struct LsuInputs<'a> {
    pub bus: &'a ControlBus,
    /// Effective address from the ALU adder.
    pub address: u32,
    /// Store data.
    pub rs2: u32,
    pub response: MemoryBusResponse,
    /// PMP verdict on the captured address.
    pub pmp_fault: bool,
}

/// Status reported to the controller.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct LsuStatus {
    /// A bus access is outstanding.
    pub wait: bool,
    pub load_misaligned: bool,
    pub load_access_fault: bool,
    pub store_misaligned: bool,
    pub store_access_fault: bool,
    /// Aligned and extended load data.
    pub read_data: u32,
}

impl LsuStatus {
    pub fn any_error(&self) -> bool {
        self.load_misaligned
            || self.load_access_fault
            || self.store_misaligned
            || self.store_access_fault
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadStoreUnit {
    /// Memory address register.
    mar: u32,
    size: Size,
    unsigned: bool,
    misaligned: bool,
    write: bool,
    atomic: bool,
    atomic_operation: AtomicOperation,
    write_data: u32,
    byte_enable: u8,
    requested: bool,
    pending: bool,
    /// PMP rejection or bus error of the last access.
    bus_fault: bool,
    lock: bool,
    read_data: u32,
}

impl LoadStoreUnit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address of the captured access.
    pub fn address(&self) -> u32 {
        self.mar
    }

    /// PMP access kind of the captured access.
    pub fn access(&self) -> Access {
        match (self.atomic && self.atomic_operation.is_read_modify_write(), self.write) {
            (true, _) => Access::ReadWrite,
            (false, true) => Access::Write,
            (false, false) => Access::Read,
        }
    }

    fn strobe(&self, bus: &ControlBus, pmp_fault: bool) -> bool {
        bus.lsu_request && !self.misaligned && !pmp_fault
    }

    fn locks_bus(&self) -> bool {
        self.atomic && self.atomic_operation.is_read_modify_write()
    }

    /// The data port request for this cycle.
    pub fn request(&self, bus: &ControlBus, pmp_fault: bool) -> MemoryBusRequest {
        let strobe = self.strobe(bus, pmp_fault);
        MemoryBusRequest {
            address: self.mar,
            write_data: self.write_data,
            byte_enable: self.byte_enable,
            read_write: self.write,
            strobe,
            source: Source::Data,
            atomic: self.atomic,
            atomic_operation: self.atomic_operation,
            fence: bus.lsu_fence,
            lock: self.lock || (strobe && self.locks_bus()),
            privileged: bus.lsu_privileged.is_machine(),
            debug: bus.cpu_debug,
        }
    }

    fn extend(&self, data: u32) -> u32 {
        match self.size {
            Size::Byte => {
                let byte = (data >> ((self.mar & 0b11) * 8)) as u8;
                if self.unsigned {
                    u32::from(byte)
                } else {
                    byte as i8 as u32
                }
            }
            Size::Half => {
                let half = (data >> ((self.mar & 0b10) * 8)) as u16;
                if self.unsigned {
                    u32::from(half)
                } else {
                    half as i16 as u32
                }
            }
            Size::Word => data,
        }
    }

    pub fn status(&self, response: &MemoryBusResponse) -> LsuStatus {
        let fault = self.bus_fault || (self.pending && response.error);
        let load = self.requested && !self.write;
        let store = self.requested && self.write;
        LsuStatus {
            wait: self.pending && !response.is_done(),
            load_misaligned: load && self.misaligned,
            load_access_fault: load && fault,
            store_misaligned: store && self.misaligned,
            store_access_fault: store && fault,
            read_data: if self.pending {
                self.extend(response.data)
            } else {
                self.extend(self.read_data)
            },
        }
    }

    fn capture(&mut self, inputs: &LsuInputs<'_>) {
        let bus = inputs.bus;
        let address = inputs.address;
        self.mar = address;
        self.size = Size::from_funct3(bus.ir_funct3);
        self.unsigned = bus.ir_funct3 & 0b100 != 0;
        self.misaligned = match self.size {
            Size::Byte => false,
            Size::Half => address & 0b1 != 0,
            Size::Word => address & 0b11 != 0,
        };
        self.atomic = bus.lsu_atomic;
        self.atomic_operation =
            atomic_operation((bus.ir_funct12 >> 7) as u8).unwrap_or_default();
        self.write = bus.lsu_read_write;
        (self.write_data, self.byte_enable) = match self.size {
            Size::Byte => (
                u32::from_ne_bytes([inputs.rs2 as u8; 4]),
                1 << (address & 0b11),
            ),
            Size::Half => (
                (inputs.rs2 & 0xFFFF) * 0x0001_0001,
                0b11 << (address & 0b10),
            ),
            Size::Word => (inputs.rs2, 0b1111),
        };
        self.requested = false;
        self.bus_fault = false;
    }
}

impl Clocked for LoadStoreUnit {
    type Inputs<'a> = LsuInputs<'a>;

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn rising_edge(&mut self, inputs: LsuInputs<'_>) {
        let bus = inputs.bus;
        if bus.cpu_trap {
            self.requested = false;
            self.pending = false;
            self.bus_fault = false;
            self.lock = false;
            return;
        }

        if self.pending && inputs.response.is_done() {
            self.pending = false;
            self.bus_fault |= inputs.response.error;
            self.read_data = inputs.response.data;
        }

        if bus.lsu_enable {
            self.capture(&inputs);
        }

        if bus.lsu_request {
            self.requested = true;
            if !self.misaligned {
                if inputs.pmp_fault {
                    self.bus_fault = true;
                } else {
                    self.pending = true;
                    self.lock = self.locks_bus();
                }
            }
        }

        if bus.if_acknowledge {
            self.lock = false;
        }
    }
}

/// Whether funct3 names a load or store width the base ISA defines.
pub fn is_legal_width(funct3: u8, store: bool) -> bool {
    match funct3 {
        funct3::BYTE | funct3::HALF | funct3::WORD => true,
        funct3::BYTE_UNSIGNED | funct3::HALF_UNSIGNED => !store,
        _ => false,
    }
}
