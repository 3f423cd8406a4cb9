//! The central execution engine.
//!
//! Each cycle the controller drives the [`ControlBus`] from its registered state only, so the
//! datapath can settle against a fixed bus. On the clock edge it samples the datapath outputs,
//! advances the FSM, updates the CSRs and arbitrates traps.

pub mod csr;
pub mod debug;
pub mod decode;
pub mod trap;

use crate::alu::AluOutputs;
use crate::constants::{funct12, funct3, funct5, opcode, trap_code, MULTI_CYCLE_TIMEOUT_EXPONENT};
use crate::control_bus::{AluOperation, ControlBus, OperandA, OperandB, WriteBackSource};
use crate::cpu_core::Config;
use crate::cs_registers::{specifier, CsrSpecifier};
use crate::features::{trigger_enabled, Features};
use crate::fetch::InstructionBus;
use crate::instruction::InstructionWord;
use crate::lsu::LsuStatus;
use crate::simulator::Clocked;
use crate::PrivilegeLevel;
use csr::{Access, CsrAccessError, MachineCsrs, INTERRUPT_MASK};
use debug::{DebugCsrs, TriggerMatchControlAndStatusRegister};
use decode::DecodeContext;
use log::{debug, trace};
use std::marker::PhantomData;
use trap::{arbitrate, exception, Candidates, TrapControl, TrapSource};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum State {
    /// Restart instruction fetch at `pc_next`.
    #[default]
    Restart,
    Dispatch,
    TrapEnter,
    TrapExit,
    Sleep,
    Execute,
    /// Waiting for a co-processor.
    AluWait,
    Branch,
    /// A branch was taken: restart instruction fetch.
    Branched,
    System,
    MemoryRequest,
    MemoryResponse,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionEngine {
    pub state: State,
    /// Instruction register.
    pub ir: InstructionWord,
    /// Address of the instruction in `ir`.
    pub pc: u32,
    pub pc_next: u32,
    pub return_address: u32,
}

/// Datapath outputs the control bus may depend on. None of them depend on the bus itself.
#[derive(Debug, Copy, Clone, Default)]
pub struct ControllerInputs {
    pub instruction: InstructionBus,
    pub lsu: LsuStatus,
    /// Address of the current data access, for `mtval`.
    pub lsu_address: u32,
    pub coprocessor_done: bool,
    /// Register file read port 1.
    pub rs1: u32,
    /// Value of the addressed CSR if it lives outside the controller.
    pub xcsr: Option<u32>,
    /// Interrupt lines, `mip` layout.
    pub irq_lines: u32,
    pub debug_halt: bool,
}

/// Signals sampled by the [`Controller`] on the rising clock edge.
#[derive(Debug, Copy, Clone)]
pub struct ControllerEdge<'a> {
    pub inputs: &'a ControllerInputs,
    pub bus: &'a ControlBus,
    pub alu: AluOutputs,
}

#[derive(Debug, Clone)]
pub struct Controller<C: Features> {
    config: Config,
    engine: ExecutionEngine,
    privilege: PrivilegeLevel,
    debug_mode: bool,
    csrs: MachineCsrs,
    debug: DebugCsrs,
    trap: TrapControl,
    /// Cycles spent in [`State::AluWait`].
    timeout: u32,
    _features: PhantomData<C>,
}

/// OP and OP-IMM instructions executed by the ALU itself rather than a co-processor.
fn single_cycle_alu(ir: InstructionWord) -> bool {
    let funct3 = ir.funct3();
    if matches!(funct3, funct3::SLL | funct3::SRL_SRA) {
        return false;
    }
    ir.opcode() == opcode::OP_IMM
        || ir.funct7() == 0
        || (ir.funct7() == 0b0100000 && funct3 == funct3::ADD_SUB)
}

fn is_csr_operation(ir: InstructionWord) -> bool {
    ir.opcode() == opcode::SYSTEM && ir.funct3() & 0b11 != 0
}

impl<C: Features> Controller<C> {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            engine: ExecutionEngine {
                pc_next: config.boot_address,
                ..ExecutionEngine::default()
            },
            privilege: PrivilegeLevel::Machine,
            debug_mode: false,
            csrs: MachineCsrs::default(),
            debug: DebugCsrs::default(),
            trap: TrapControl::default(),
            timeout: 0,
            _features: PhantomData,
        }
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    pub fn state(&self) -> State {
        self.engine.state
    }

    pub fn privilege(&self) -> PrivilegeLevel {
        self.privilege
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    pub fn csrs(&self) -> &MachineCsrs {
        &self.csrs
    }

    pub fn debug_csrs(&self) -> &DebugCsrs {
        &self.debug
    }

    pub fn trap_control(&self) -> &TrapControl {
        &self.trap
    }

    /// Address of the CSR named by the instruction register.
    pub fn csr_address(&self) -> CsrSpecifier {
        self.engine.ir.csr()
    }

    /// Read any CSR, with `xcsr` supplying the value of CSRs implemented outside the controller.
    pub fn read_csr(&self, csr: CsrSpecifier, xcsr: Option<u32>) -> u32 {
        if let Some(value) = self.csrs.read(csr) {
            return value;
        }
        match csr {
            specifier::MISA => csr::misa::<C>(),
            specifier::MIP => self.trap.irq_buffer & INTERRUPT_MASK,
            specifier::MHARTID => self.config.hart_id,
            specifier::DCSR => self.debug.dcsr.read(),
            specifier::DPC => self.debug.dpc,
            specifier::DSCRATCH0 => self.debug.dscratch0,
            specifier::TDATA1 => self.debug.trigger.read::<C>(),
            specifier::TDATA2 => self.debug.trigger.address,
            specifier::TINFO => TriggerMatchControlAndStatusRegister::INFO,
            _ => xcsr.unwrap_or(0),
        }
    }

    fn write_csr(&mut self, csr: CsrSpecifier, value: u32) {
        if self.csrs.write::<C>(csr, value) {
            return;
        }
        match csr {
            specifier::DCSR => self.debug.dcsr.write::<C>(value),
            specifier::DPC => self.debug.dpc = value & !0b11,
            specifier::DSCRATCH0 => self.debug.dscratch0 = value,
            specifier::TDATA1 if self.debug_mode => self.debug.trigger.write(value),
            specifier::TDATA2 if self.debug_mode => self.debug.trigger.address = value,
            _ => {}
        }
    }

    /// CSRRW(I) always writes, set and clear only with a nonzero source field.
    fn csr_write_attempted(&self) -> bool {
        let ir = self.engine.ir;
        ir.funct3() & 0b11 == 0b01 || ir.zimm() != 0
    }

    fn csr_write_value(&self, inputs: &ControllerInputs) -> u32 {
        let ir = self.engine.ir;
        let old = self.read_csr(ir.csr(), inputs.xcsr);
        let operand = if ir.funct3() & 0b100 != 0 {
            ir.zimm()
        } else {
            inputs.rs1
        };
        match ir.funct3() & 0b11 {
            0b01 => operand,
            0b10 => old | operand,
            _ => old & !operand,
        }
    }

    pub fn csr_access(&self) -> Result<(), CsrAccessError> {
        csr::check_access::<C>(
            self.engine.ir.csr(),
            &Access {
                privilege: self.privilege,
                debug_mode: self.debug_mode,
                write: self.csr_write_attempted(),
                counter_enable: self.csrs.mcounteren,
            },
        )
    }

    fn legal(&self) -> bool {
        let ir = self.engine.ir;
        let context = DecodeContext {
            privilege: self.privilege,
            debug_mode: self.debug_mode,
            timeout_wait: self.csrs.status.tw,
            csr_access: !is_csr_operation(ir) || self.csr_access().is_ok(),
        };
        decode::is_legal::<C>(ir, &context)
    }

    /// Exceptions raised by the instruction in `ir` before it executes.
    fn execute_faults(&self) -> u16 {
        let mut faults = 0;
        if !self.legal() {
            faults |= exception::ILLEGAL_INSTRUCTION;
        }
        if trigger_enabled::<C>() && !self.debug_mode && self.debug.trigger.matches(self.engine.pc)
        {
            faults |= exception::DEBUG_HARDWARE_TRIGGER;
        }
        faults
    }

    fn execute_suppressed(&self) -> bool {
        self.trap.exception_buffered() || self.execute_faults() != 0
    }

    /// Effective privilege of data accesses.
    fn lsu_privilege(&self) -> PrivilegeLevel {
        let status = &self.csrs.status;
        if status.mprv && (!self.debug_mode || self.debug.dcsr.mprven) {
            status.mpp
        } else {
            self.privilege
        }
    }

    fn interrupts_allowed(&self) -> bool {
        let global = match self.privilege {
            PrivilegeLevel::Machine => self.csrs.status.mie,
            PrivilegeLevel::User => true,
        };
        global && !self.debug_mode && !self.debug.dcsr.step && !self.trap.env_entered
    }

    fn candidates(&self) -> Candidates {
        let debug = C::ISA_SDEXT && !self.debug_mode;
        Candidates {
            exceptions: self.trap.exceptions,
            interrupts: if self.interrupts_allowed() {
                self.trap.irq_buffer & self.csrs.mie
            } else {
                0
            },
            debug_halt: debug && self.trap.debug_halt_buffer,
            debug_step: debug && self.trap.debug_step_buffer,
        }
    }

    /// A buffered interrupt is enabled in `mie`, or debug mode is requested.
    pub fn wakeup(&self) -> bool {
        self.trap.irq_buffer & self.csrs.mie != 0 || (C::ISA_SDEXT && self.trap.debug_halt_buffer)
    }

    /// Interrupt enable mask, for waking a gated clock from the raw interrupt lines.
    pub fn interrupt_enable(&self) -> u32 {
        self.csrs.mie
    }

    pub fn control_bus(&self, inputs: &ControllerInputs) -> ControlBus {
        let engine = &self.engine;
        let ir = engine.ir;
        let dispatch = engine.state == State::Dispatch;
        let word = if dispatch {
            InstructionWord(inputs.instruction.instruction)
        } else {
            ir
        };
        let mut bus = ControlBus {
            pc_current: if dispatch { engine.pc_next } else { engine.pc },
            pc_next: engine.pc_next,
            pc_return: engine.return_address,
            rf_rs1: word.rs1(),
            rf_rs2: word.rs2(),
            rf_rd: word.rd(),
            alu_immediate: if dispatch {
                4
            } else if ir.opcode() == opcode::AMO {
                0
            } else {
                ir.immediate()
            },
            lsu_privileged: self.lsu_privilege(),
            csr_address: ir.csr(),
            ir_funct3: ir.funct3(),
            ir_funct12: ir.funct12(),
            ir_opcode: ir.opcode(),
            cpu_privileged: self.privilege,
            cpu_sleep: engine.state == State::Sleep,
            cpu_trap: engine.state == State::TrapEnter,
            cpu_debug: self.debug_mode,
            ..ControlBus::default()
        };

        match engine.state {
            State::Restart | State::Branched => bus.if_reset = true,
            State::Dispatch => {
                bus.alu_operand_a = OperandA::Pc;
                bus.alu_operand_b = OperandB::Immediate;
                bus.alu_operation = AluOperation::Add;
                let trap_taken = self.trap.env_pending || self.trap.exception_buffered();
                bus.if_acknowledge = !trap_taken && inputs.instruction.valid;
            }
            State::Execute if !self.execute_suppressed() => self.execute_bus(&mut bus),
            State::AluWait => {
                bus.alu_operation = AluOperation::CoProcessor;
                bus.rf_write_back_enable = inputs.coprocessor_done;
            }
            State::Branch => {
                bus.alu_unsigned = ir.funct3() & 0b010 != 0;
            }
            State::MemoryRequest => bus.lsu_request = true,
            State::MemoryResponse => {
                let status = inputs.lsu;
                let writes_back = ir.opcode() != opcode::STORE;
                bus.rf_write_select = WriteBackSource::Lsu;
                bus.rf_write_back_enable = writes_back && !status.wait && !status.any_error();
            }
            State::System if is_csr_operation(ir) => {
                bus.csr_read_enable = true;
                bus.csr_write_enable = self.csr_write_attempted();
                bus.csr_write_data = self.csr_write_value(inputs);
                bus.rf_write_select = WriteBackSource::Csr;
                bus.rf_write_back_enable = true;
            }
            _ => {}
        }
        bus
    }

    fn execute_bus(&self, bus: &mut ControlBus) {
        let ir = self.engine.ir;
        match ir.opcode() {
            opcode::OP | opcode::OP_IMM => {
                if ir.opcode() == opcode::OP_IMM {
                    bus.alu_operand_b = OperandB::Immediate;
                }
                if single_cycle_alu(ir) {
                    let funct3 = ir.funct3();
                    bus.alu_operation = match funct3 {
                        funct3::SLT | funct3::SLTU => AluOperation::SetOnLess,
                        funct3::XOR => AluOperation::Xor,
                        funct3::OR => AluOperation::Or,
                        funct3::AND => AluOperation::And,
                        _ => AluOperation::Add,
                    };
                    bus.alu_subtract = ir.opcode() == opcode::OP && ir.funct7() & 0b0100000 != 0;
                    bus.alu_unsigned = funct3 == funct3::SLTU;
                    bus.rf_write_back_enable = true;
                } else {
                    bus.alu_base_trigger = true;
                }
            }
            opcode::LUI => {
                bus.alu_operand_b = OperandB::Immediate;
                bus.alu_operation = AluOperation::PassB;
                bus.rf_write_back_enable = true;
            }
            opcode::AUIPC => {
                bus.alu_operand_a = OperandA::Pc;
                bus.alu_operand_b = OperandB::Immediate;
                bus.alu_operation = AluOperation::Add;
                bus.rf_write_back_enable = true;
            }
            opcode::JAL | opcode::JALR => {
                if ir.opcode() == opcode::JAL {
                    bus.alu_operand_a = OperandA::Pc;
                }
                bus.alu_operand_b = OperandB::Immediate;
                bus.rf_write_select = WriteBackSource::ReturnAddress;
                bus.rf_write_back_enable = true;
            }
            opcode::BRANCH => {
                bus.alu_operand_a = OperandA::Pc;
                bus.alu_operand_b = OperandB::Immediate;
            }
            opcode::LOAD | opcode::STORE | opcode::AMO => {
                bus.alu_operand_b = OperandB::Immediate;
                bus.lsu_enable = true;
                bus.lsu_atomic = ir.opcode() == opcode::AMO;
                bus.lsu_read_write = ir.opcode() == opcode::STORE
                    || (ir.opcode() == opcode::AMO && ir.funct5() != funct5::LR);
            }
            opcode::MISC_MEM => match ir.funct3() {
                funct3::FENCE_I => bus.if_fence = true,
                _ => bus.lsu_fence = true,
            },
            opcode::CUSTOM0 | opcode::CUSTOM1 | opcode::CUSTOM2 | opcode::CUSTOM3 => {
                bus.alu_cfu_trigger = true;
            }
            opcode::OP_FP => bus.alu_fpu_trigger = true,
            _ => {}
        }
    }

    /// Next state after an instruction passed the execute checks.
    fn execute(&self, next: &mut ExecutionEngine, alu: &AluOutputs) -> State {
        let ir = self.engine.ir;
        match ir.opcode() {
            opcode::OP | opcode::OP_IMM if single_cycle_alu(ir) => State::Dispatch,
            opcode::OP | opcode::OP_IMM => State::AluWait,
            opcode::JAL | opcode::JALR => {
                next.pc_next = alu.address & !1;
                State::Branch
            }
            opcode::BRANCH => {
                next.pc_next = alu.address;
                State::Branch
            }
            opcode::LOAD | opcode::STORE | opcode::AMO => State::MemoryRequest,
            opcode::MISC_MEM if ir.funct3() == funct3::FENCE_I => State::Branched,
            opcode::SYSTEM => State::System,
            opcode::CUSTOM0 | opcode::CUSTOM1 | opcode::CUSTOM2 | opcode::CUSTOM3 => {
                State::AluWait
            }
            opcode::OP_FP => State::AluWait,
            _ => State::Dispatch,
        }
    }

    fn branch_taken(&self, alu: &AluOutputs) -> bool {
        let ir = self.engine.ir;
        if ir.opcode() != opcode::BRANCH {
            return true;
        }
        let funct3 = ir.funct3();
        let condition = if funct3 & 0b100 != 0 {
            alu.less
        } else {
            alu.equal
        };
        condition ^ (funct3 & 0b001 != 0)
    }

    fn system(&self, exceptions: &mut u16) -> State {
        let ir = self.engine.ir;
        if is_csr_operation(ir) {
            return State::Dispatch;
        }
        match ir.funct12() {
            funct12::ECALL => *exceptions |= exception::ENVIRONMENT_CALL,
            funct12::EBREAK => {
                let dcsr = &self.debug.dcsr;
                let enter_debug = self.debug_mode
                    || match self.privilege {
                        PrivilegeLevel::Machine => dcsr.ebreakm,
                        PrivilegeLevel::User => dcsr.ebreaku,
                    };
                *exceptions |= if C::ISA_SDEXT && enter_debug {
                    exception::DEBUG_BREAKPOINT
                } else {
                    exception::BREAKPOINT
                };
            }
            funct12::MRET | funct12::DRET => return State::TrapExit,
            funct12::WFI if !self.debug_mode => return State::Sleep,
            _ => {}
        }
        State::Dispatch
    }

    fn memory_exceptions(status: &LsuStatus) -> u16 {
        let mut exceptions = 0;
        for (raised, bit) in [
            (status.load_misaligned, exception::LOAD_MISALIGNED),
            (status.load_access_fault, exception::LOAD_ACCESS_FAULT),
            (status.store_misaligned, exception::STORE_MISALIGNED),
            (status.store_access_fault, exception::STORE_ACCESS_FAULT),
        ] {
            if raised {
                exceptions |= bit;
            }
        }
        exceptions
    }

    fn enter_trap(&mut self, source: TrapSource, inputs: &ControllerInputs, next: &mut ExecutionEngine) {
        let engine = &self.engine;
        let code = source.code(self.privilege);
        let cause = u32::from(code & trap_code::CODE_MASK);
        let interrupt = source.is_interrupt();

        if source.enters_debug_mode() {
            if !self.debug_mode {
                self.debug.dpc = if interrupt { engine.pc_next } else { engine.pc };
                self.debug.dcsr.cause = cause as u8;
                self.debug.dcsr.prv = self.privilege;
                self.privilege = PrivilegeLevel::Machine;
                self.debug_mode = true;
                debug!("Entering debug mode ({source:?}), dpc = {:#010x}", self.debug.dpc);
            }
            next.pc_next = self.config.debug_park_address;
        } else if self.debug_mode {
            debug!("{source:?} in debug mode at {:#010x}", engine.pc);
            next.pc_next = self.config.debug_exception_address;
        } else {
            let csrs = &mut self.csrs;
            csrs.mcause = u32::from(interrupt) << 31 | cause;
            csrs.mepc = if interrupt { engine.pc_next } else { engine.pc };
            csrs.mtval = match source {
                TrapSource::InstructionAccessFault | TrapSource::Breakpoint => engine.pc,
                TrapSource::InstructionMisaligned => engine.pc_next,
                TrapSource::IllegalInstruction => engine.ir.0,
                TrapSource::StoreMisaligned
                | TrapSource::LoadMisaligned
                | TrapSource::StoreAccessFault
                | TrapSource::LoadAccessFault => inputs.lsu_address,
                _ => 0,
            };
            csrs.mtinst = if interrupt { 0 } else { engine.ir.0 };
            csrs.status.mpie = csrs.status.mie;
            csrs.status.mie = false;
            csrs.status.mpp = self.privilege;
            self.privilege = PrivilegeLevel::Machine;
            next.pc_next = csrs.mtvec.target(interrupt, cause);
            debug!(
                "Trap {source:?} at {:#010x}, mcause = {:#010x}, handler at {:#010x}",
                csrs.mepc, csrs.mcause, next.pc_next
            );
        }
        self.trap.env_entered = true;
    }

    fn exit_trap(&mut self, next: &mut ExecutionEngine) {
        if self.engine.ir.funct12() == funct12::DRET && self.debug_mode {
            self.privilege = self.debug.dcsr.prv;
            self.debug_mode = false;
            next.pc_next = self.debug.dpc;
            debug!("Leaving debug mode to {:#010x}", next.pc_next);
        } else {
            let status = &mut self.csrs.status;
            status.mie = status.mpie;
            status.mpie = true;
            self.privilege = status.mpp;
            status.mpp = if C::ISA_U {
                PrivilegeLevel::User
            } else {
                PrivilegeLevel::Machine
            };
            if !self.privilege.is_machine() {
                status.mprv = false;
            }
            next.pc_next = self.csrs.mepc;
            trace!("Returning from trap to {:#010x} in {}", next.pc_next, self.privilege);
        }
    }

    fn update_counters(&mut self, retired: bool) {
        if !C::ISA_ZICNTR || (self.debug_mode && self.debug.dcsr.stopcount) {
            return;
        }
        if !self.csrs.cycle_inhibited() {
            self.csrs.mcycle = self.csrs.mcycle.wrapping_add(1);
        }
        if retired && !self.csrs.instret_inhibited() {
            self.csrs.minstret = self.csrs.minstret.wrapping_add(1);
        }
    }
}

impl<C: Features> Clocked for Controller<C> {
    type Inputs<'a> = ControllerEdge<'a>;

    fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    fn rising_edge(&mut self, edge: ControllerEdge<'_>) {
        let ControllerEdge { inputs, bus, alu } = edge;
        let state = self.engine.state;
        let candidates = self.candidates();
        let fire = arbitrate(&candidates).is_some();
        let enter = state == State::TrapEnter;
        let mut next = self.engine.clone();
        let mut exceptions = 0;
        let mut retired = false;
        let mut debug_step = false;

        next.state = match state {
            State::Restart | State::Branched => State::Dispatch,
            State::Dispatch => {
                if self.trap.env_pending || self.trap.exception_buffered() {
                    State::TrapEnter
                } else if inputs.instruction.valid {
                    next.ir = InstructionWord(inputs.instruction.instruction);
                    next.pc = self.engine.pc_next;
                    next.pc_next = alu.address;
                    next.return_address = alu.address;
                    if inputs.instruction.error {
                        exceptions |= exception::INSTRUCTION_ACCESS_FAULT;
                    }
                    trace!("Dispatching {} at {:#010x}", next.ir, next.pc);
                    State::Execute
                } else {
                    State::Dispatch
                }
            }
            State::Execute => {
                self.trap.env_entered = false;
                debug_step = C::ISA_SDEXT && self.debug.dcsr.step && !self.debug_mode;
                let faults = self.execute_faults();
                if faults & exception::ILLEGAL_INSTRUCTION != 0 {
                    match self.csr_access() {
                        Err(error) if is_csr_operation(self.engine.ir) => {
                            debug!("Illegal CSR access at {:#010x}: {error}", self.engine.pc)
                        }
                        _ => debug!(
                            "Illegal instruction {} at {:#010x}",
                            self.engine.ir, self.engine.pc
                        ),
                    }
                }
                if faults & exception::DEBUG_HARDWARE_TRIGGER != 0 {
                    self.debug.trigger.fired = true;
                }
                if self.trap.exception_buffered() || faults != 0 {
                    exceptions |= faults;
                    State::Dispatch
                } else {
                    let state = self.execute(&mut next, &alu);
                    // Multi-cycle and memory operations retire once they complete without a fault
                    retired = !matches!(state, State::AluWait | State::MemoryRequest);
                    state
                }
            }
            State::AluWait => {
                if inputs.coprocessor_done {
                    retired = true;
                    State::Dispatch
                } else if self.timeout >> MULTI_CYCLE_TIMEOUT_EXPONENT != 0 {
                    debug!("Co-processor timed out at {:#010x}", self.engine.pc);
                    exceptions |= exception::ILLEGAL_INSTRUCTION;
                    State::Dispatch
                } else {
                    State::AluWait
                }
            }
            State::Branch => {
                if !self.branch_taken(&alu) {
                    next.pc_next = self.engine.return_address;
                    State::Dispatch
                } else if self.engine.pc_next & 0b10 != 0 {
                    exceptions |= exception::INSTRUCTION_MISALIGNED;
                    State::Dispatch
                } else {
                    State::Branched
                }
            }
            State::MemoryRequest => State::MemoryResponse,
            State::MemoryResponse => {
                let status = inputs.lsu;
                if status.any_error() {
                    exceptions |= Self::memory_exceptions(&status);
                    State::Dispatch
                } else if status.wait {
                    State::MemoryResponse
                } else {
                    retired = true;
                    State::Dispatch
                }
            }
            State::System => self.system(&mut exceptions),
            State::TrapEnter => {
                match arbitrate(&candidates) {
                    Some(source) => self.enter_trap(source, inputs, &mut next),
                    None => trace!("Trap entry without a pending source"),
                }
                State::Restart
            }
            State::TrapExit => {
                self.exit_trap(&mut next);
                State::Restart
            }
            State::Sleep => {
                if self.wakeup() {
                    trace!("Waking up");
                    State::Dispatch
                } else {
                    State::Sleep
                }
            }
        };

        self.update_counters(retired);
        if bus.csr_write_enable {
            self.write_csr(bus.csr_address, bus.csr_write_data);
        }

        self.timeout = if state == State::AluWait && next.state == State::AluWait {
            self.timeout + 1
        } else {
            0
        };
        // Halt requests are not buffered while already halted
        self.trap.update(
            exceptions,
            inputs.irq_lines,
            inputs.debug_halt && !self.debug_mode,
            debug_step,
            fire,
            enter,
        );
        self.engine = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{Rv32i, Rv32iProtected};
    use crate::register_file::Specifier;

    fn valid(instruction: u32) -> ControllerInputs {
        ControllerInputs {
            instruction: InstructionBus {
                instruction,
                valid: true,
                error: false,
            },
            ..ControllerInputs::default()
        }
    }

    fn clock<C: Features>(controller: &mut Controller<C>, inputs: &ControllerInputs, alu: AluOutputs) {
        let bus = controller.control_bus(inputs);
        controller.tick(
            ControllerEdge {
                inputs,
                bus: &bus,
                alu,
            },
            true,
        );
    }

    fn boot<C: Features>() -> Controller<C> {
        let mut controller = Controller::<C>::new(Config {
            boot_address: 0x100,
            ..Config::default()
        });
        assert!(controller.control_bus(&ControllerInputs::default()).if_reset);
        clock(&mut controller, &ControllerInputs::default(), AluOutputs::default());
        assert_eq!(State::Dispatch, controller.state());
        controller
    }

    fn incremented(address: u32) -> AluOutputs {
        AluOutputs {
            address,
            ..AluOutputs::default()
        }
    }

    #[test]
    fn test_dispatch_latches_instruction() {
        let mut controller = boot::<Rv32i>();
        // addi x1, x2, 5
        let inputs = valid(0x0051_0093);
        let bus = controller.control_bus(&inputs);
        assert!(bus.if_acknowledge);
        assert_eq!(0x100, bus.pc_current);
        assert_eq!(4, bus.alu_immediate);
        assert_eq!(Specifier::from_u5(2), bus.rf_rs1);
        clock(&mut controller, &inputs, incremented(0x104));

        let engine = controller.engine();
        assert_eq!(State::Execute, engine.state);
        assert_eq!(0x100, engine.pc);
        assert_eq!(0x104, engine.pc_next);
        assert_eq!(0x104, engine.return_address);

        let bus = controller.control_bus(&ControllerInputs::default());
        assert!(bus.rf_write_back_enable);
        assert_eq!(AluOperation::Add, bus.alu_operation);
        assert_eq!(OperandB::Immediate, bus.alu_operand_b);
        assert_eq!(5, bus.alu_immediate);
        assert_eq!(Specifier::from_u5(1), bus.rf_rd);
        clock(&mut controller, &ControllerInputs::default(), AluOutputs::default());
        assert_eq!(State::Dispatch, controller.state());
    }

    #[test]
    fn test_dispatch_waits_for_fetch() {
        let mut controller = boot::<Rv32i>();
        let idle = ControllerInputs::default();
        assert!(!controller.control_bus(&idle).if_acknowledge);
        clock(&mut controller, &idle, AluOutputs::default());
        assert_eq!(State::Dispatch, controller.state());
    }

    #[test]
    fn test_illegal_instruction_trap() {
        let mut controller = boot::<Rv32i>();
        clock(&mut controller, &valid(0xFFFF_FFFF), incremented(0x104));
        let bus = controller.control_bus(&ControllerInputs::default());
        assert!(!bus.rf_write_back_enable);
        clock(&mut controller, &ControllerInputs::default(), AluOutputs::default());
        assert_eq!(State::Dispatch, controller.state());
        assert!(!controller
            .control_bus(&valid(0x0000_0013))
            .if_acknowledge);
        clock(&mut controller, &valid(0x0000_0013), AluOutputs::default());
        assert_eq!(State::TrapEnter, controller.state());
        assert!(controller.control_bus(&ControllerInputs::default()).cpu_trap);
        clock(&mut controller, &ControllerInputs::default(), AluOutputs::default());

        assert_eq!(State::Restart, controller.state());
        let csrs = controller.csrs();
        assert_eq!(u32::from(trap_code::ILLEGAL_INSTRUCTION), csrs.mcause);
        assert_eq!(0x100, csrs.mepc);
        assert_eq!(0xFFFF_FFFF, csrs.mtval);
        assert_eq!(0, controller.engine().pc_next);
        assert!(!controller.trap_control().exception_buffered());
    }

    #[test]
    fn test_branch_not_taken_restores_return_address() {
        let mut controller = boot::<Rv32i>();
        // beq x1, x2, +16
        clock(&mut controller, &valid(0x0020_8863), incremented(0x104));
        clock(&mut controller, &ControllerInputs::default(), incremented(0x110));
        assert_eq!(State::Branch, controller.state());
        assert_eq!(0x110, controller.engine().pc_next);
        assert_eq!(OperandB::Rs2, controller.control_bus(&ControllerInputs::default()).alu_operand_b);
        clock(&mut controller, &ControllerInputs::default(), AluOutputs::default());
        assert_eq!(State::Dispatch, controller.state());
        assert_eq!(0x104, controller.engine().pc_next);
    }

    #[test]
    fn test_misaligned_jump_target() {
        let mut controller = boot::<Rv32i>();
        // jal x1, +6 is encoded with imm[1] set
        clock(&mut controller, &valid(0x0060_00EF), incremented(0x104));
        clock(&mut controller, &ControllerInputs::default(), incremented(0x106));
        clock(&mut controller, &ControllerInputs::default(), AluOutputs::default());
        assert_eq!(
            exception::INSTRUCTION_MISALIGNED,
            controller.trap_control().exceptions
        );
    }

    #[test]
    fn test_coprocessor_timeout() {
        let mut controller = boot::<Rv32iProtected>();
        // sll x1, x1, x1 goes to the shifter, which never answers here
        clock(&mut controller, &valid(0x0010_90B3), incremented(0x104));
        assert!(controller.control_bus(&ControllerInputs::default()).alu_base_trigger);
        clock(&mut controller, &ControllerInputs::default(), AluOutputs::default());
        let mut cycles = 0;
        while controller.state() == State::AluWait {
            clock(&mut controller, &ControllerInputs::default(), AluOutputs::default());
            cycles += 1;
        }
        assert_eq!((1 << MULTI_CYCLE_TIMEOUT_EXPONENT) + 1, cycles);
        assert_eq!(
            exception::ILLEGAL_INSTRUCTION,
            controller.trap_control().exceptions
        );
    }

    #[test]
    fn test_csr_write_data() {
        let mut controller = boot::<Rv32i>();
        // csrrs x5, mscratch, x6
        clock(&mut controller, &valid(0x3403_22F3), incremented(0x104));
        clock(&mut controller, &ControllerInputs::default(), AluOutputs::default());
        assert_eq!(State::System, controller.state());
        let inputs = ControllerInputs {
            rs1: 0xF0,
            ..ControllerInputs::default()
        };
        let bus = controller.control_bus(&inputs);
        assert!(bus.csr_write_enable);
        assert_eq!(0xF0, bus.csr_write_data);
        assert_eq!(WriteBackSource::Csr, bus.rf_write_select);
        clock(&mut controller, &inputs, AluOutputs::default());
        assert_eq!(0xF0, controller.read_csr(specifier::MSCRATCH, None));
    }

    #[test]
    fn test_csr_read_only_set_never_writes() {
        let mut controller = boot::<Rv32i>();
        // csrrs x5, mhartid, x0
        clock(&mut controller, &valid(0xF140_22F3), incremented(0x104));
        clock(&mut controller, &ControllerInputs::default(), AluOutputs::default());
        assert_eq!(State::System, controller.state());
        assert!(!controller.control_bus(&ControllerInputs::default()).csr_write_enable);
    }
}
