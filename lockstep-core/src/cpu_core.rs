//! The core: every unit wired together around the control bus.

use crate::alu::{AluInputs, AluOutputs, ArithmeticLogicUnit};
use crate::clock_gate::ClockGate;
use crate::control_bus::{ControlBus, WriteBackSource};
use crate::controller::trap::interrupt;
use crate::controller::{Controller, ControllerEdge, ControllerInputs};
use crate::cs_registers::CsrSpecifier;
use crate::features::Features;
use crate::fetch::{self, FetchInputs, InstructionFetch};
use crate::lsu::{LoadStoreUnit, LsuInputs};
use crate::memory_bus::{MemoryBusRequest, MemoryBusResponse};
use crate::pmp::{Access, PhysicalMemoryProtectionUnit, PmpInputs};
use crate::register_file::{RegisterFile, RegisterFileInputs, Specifier};
use crate::simulator::Clocked;
use log::trace;
use thiserror::Error;

/// Per-instance parameters of a core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    /// Value of `mhartid`.
    pub hart_id: u32,
    /// Address of the first instruction after reset.
    pub boot_address: u32,
    /// Entry point of the debug mode firmware.
    pub debug_park_address: u32,
    /// Where exceptions raised in debug mode jump to.
    pub debug_exception_address: u32,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} {address:#010x} is not word aligned")]
    Misaligned { name: &'static str, address: u32 },
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, address) in [
            ("boot address", self.boot_address),
            ("debug park address", self.debug_park_address),
            ("debug exception address", self.debug_exception_address),
        ] {
            if address & 0b11 != 0 {
                return Err(ConfigError::Misaligned { name, address });
            }
        }
        Ok(())
    }
}

/// Signals from outside the core, stable for a whole cycle.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct CoreInputs {
    pub fetch_response: MemoryBusResponse,
    pub data_response: MemoryBusResponse,
    pub machine_external_irq: bool,
    pub machine_software_irq: bool,
    pub machine_timer_irq: bool,
    /// Fast interrupt channels, bit `i` for channel `i`.
    pub fast_irq: u16,
    pub debug_halt_request: bool,
}

impl CoreInputs {
    /// The interrupt lines as laid out in `mip`.
    pub fn interrupt_lines(&self) -> u32 {
        let mut lines = u32::from(self.fast_irq) << 16;
        if self.machine_external_irq {
            lines |= interrupt::MACHINE_EXTERNAL;
        }
        if self.machine_software_irq {
            lines |= interrupt::MACHINE_SOFTWARE;
        }
        if self.machine_timer_irq {
            lines |= interrupt::MACHINE_TIMER;
        }
        lines
    }
}

/// Every combinational signal of one cycle, computed from registered state and [`CoreInputs`].
#[derive(Debug, Clone, Default)]
pub struct Wires {
    pub bus: ControlBus,
    pub controller: ControllerInputs,
    pub alu: AluOutputs,
    /// Register file read ports before the edge.
    pub rs1: u32,
    pub rs2: u32,
    /// Write-back multiplexer output.
    pub write_data: u32,
    pub fetch_pmp_fault: bool,
    pub data_pmp_fault: bool,
    pub fetch_request: MemoryBusRequest,
    pub data_request: MemoryBusRequest,
}

#[derive(Debug, Clone)]
pub struct CpuCore<C: Features> {
    controller: Controller<C>,
    fetch: InstructionFetch,
    register_file: RegisterFile<C>,
    alu: ArithmeticLogicUnit<C>,
    lsu: LoadStoreUnit,
    pmp: PhysicalMemoryProtectionUnit<C>,
    clock_gate: ClockGate,
}

impl<C: Features> CpuCore<C> {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            controller: Controller::new(config),
            fetch: InstructionFetch::new(),
            register_file: RegisterFile::new(),
            alu: ArithmeticLogicUnit::new(),
            lsu: LoadStoreUnit::new(),
            pmp: PhysicalMemoryProtectionUnit::new(),
            clock_gate: ClockGate::new(),
        })
    }

    pub fn controller(&self) -> &Controller<C> {
        &self.controller
    }

    pub fn fetch(&self) -> &InstructionFetch {
        &self.fetch
    }

    pub fn lsu(&self) -> &LoadStoreUnit {
        &self.lsu
    }

    pub fn pmp(&self) -> &PhysicalMemoryProtectionUnit<C> {
        &self.pmp
    }

    /// Address of the instruction in the execution engine.
    pub fn pc(&self) -> u32 {
        self.controller.engine().pc
    }

    /// Register `x<index>`, reading zero for an index past `x31`.
    pub fn x(&self, index: u8) -> u32 {
        Specifier::new(index).map_or(0, |specifier| self.register_file.x(specifier))
    }

    /// Write register `x<index>`. Writes past `x31` are ignored.
    pub fn set_x(&mut self, index: u8, value: u32) {
        if let Some(specifier) = Specifier::new(index) {
            self.register_file.set_x(specifier, value);
        }
    }

    /// Current value of any CSR, reading zero for unimplemented ones.
    pub fn csr(&self, csr: CsrSpecifier) -> u32 {
        self.controller.read_csr(csr, self.pmp.read_csr(csr))
    }

    /// The core clock is stopped by the clock gate.
    pub fn gated(&self) -> bool {
        C::CLOCK_GATING && !self.clock_gate.enabled()
    }

    /// Settle the combinational logic for the current cycle.
    pub fn settle(&self, inputs: &CoreInputs) -> Wires {
        let xcsr = self.pmp.read_csr(self.controller.csr_address());
        let lsu = self.lsu.status(&inputs.data_response);
        let (rs1, rs2) = (self.register_file.rs1(), self.register_file.rs2());
        let controller = ControllerInputs {
            instruction: self.fetch.instruction_bus(),
            lsu,
            lsu_address: self.lsu.address(),
            coprocessor_done: self.alu.coprocessor_done(),
            rs1,
            xcsr,
            irq_lines: inputs.interrupt_lines(),
            debug_halt: inputs.debug_halt_request,
        };
        let bus = self.controller.control_bus(&controller);
        let alu = self.alu.evaluate(&AluInputs {
            bus: &bus,
            rs1,
            rs2,
        });

        let data_pmp_fault = self.pmp.fault(
            self.lsu.address(),
            self.lsu.access(),
            bus.lsu_privileged,
            bus.cpu_debug,
        );
        let fetch_pmp_fault = self.pmp.fault(
            self.fetch.pc(),
            Access::Execute,
            self.fetch.privilege(),
            bus.cpu_debug,
        );
        let data_request = self.lsu.request(&bus, data_pmp_fault);
        let fetch_request = self.fetch.request(&bus, fetch_pmp_fault);

        let write_data = match bus.rf_write_select {
            WriteBackSource::Alu => alu.result,
            WriteBackSource::Lsu => lsu.read_data,
            WriteBackSource::Csr => self.controller.read_csr(bus.csr_address, xcsr),
            WriteBackSource::ReturnAddress => bus.pc_return,
        };

        Wires {
            bus,
            controller,
            alu,
            rs1,
            rs2,
            write_data,
            fetch_pmp_fault,
            data_pmp_fault,
            fetch_request,
            data_request,
        }
    }

    /// The gated clock stops while sleeping without a wake-up source, once no fetch is in flight.
    fn halt(&self, inputs: &CoreInputs, wires: &Wires) -> bool {
        let wakeup = inputs.interrupt_lines() & self.controller.interrupt_enable() != 0
            || (C::ISA_SDEXT && inputs.debug_halt_request)
            || self.controller.wakeup();
        wires.bus.cpu_sleep && !wakeup && self.fetch.state() != fetch::State::Pending
    }

    /// Clock every unit once with the settled `wires`.
    pub fn clock(&mut self, inputs: &CoreInputs, wires: &Wires, reset_n: bool) {
        if C::CLOCK_GATING {
            let halt = self.halt(inputs, wires);
            self.clock_gate.drive(false, halt, reset_n);
            if !self.clock_gate.drive(true, halt, reset_n) {
                trace!("Core clock gated");
                return;
            }
        }
        let bus = &wires.bus;
        self.controller.tick(
            ControllerEdge {
                inputs: &wires.controller,
                bus,
                alu: wires.alu,
            },
            reset_n,
        );
        self.fetch.tick(
            FetchInputs {
                bus,
                response: inputs.fetch_response,
                pmp_fault: wires.fetch_pmp_fault,
            },
            reset_n,
        );
        self.register_file.tick(
            RegisterFileInputs {
                bus,
                write_data: wires.write_data,
            },
            reset_n,
        );
        self.alu.tick(
            AluInputs {
                bus,
                rs1: wires.rs1,
                rs2: wires.rs2,
            },
            reset_n,
        );
        self.lsu.tick(
            LsuInputs {
                bus,
                address: wires.alu.address,
                rs2: wires.rs2,
                response: inputs.data_response,
                pmp_fault: wires.data_pmp_fault,
            },
            reset_n,
        );
        self.pmp.tick(PmpInputs { bus }, reset_n);
    }
}
