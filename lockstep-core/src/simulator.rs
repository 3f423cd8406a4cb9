//! Clock and reset driver.

use crate::cpu_core::{CoreInputs, CpuCore};
use crate::features::Features;
use crate::memory_bus::{BusTarget, MemoryBusResponse};
use log::trace;

/// A synchronous unit advanced by a rising clock edge.
///
/// Implementors expose their outputs as functions of the registered state (plus combinational
/// inputs where needed), and only change that state in [`Clocked::rising_edge`] and
/// [`Clocked::reset`].
pub trait Clocked {
    /// Signals sampled at the clock edge.
    type Inputs<'a>;

    /// Force every register to its reset value.
    fn reset(&mut self);

    fn rising_edge(&mut self, inputs: Self::Inputs<'_>);

    /// One clock cycle with the active-low reset applied: while `reset_n` is low the edge only
    /// loads reset values.
    fn tick(&mut self, inputs: Self::Inputs<'_>, reset_n: bool) {
        if reset_n {
            self.rising_edge(inputs);
        } else {
            self.reset();
        }
    }
}

/// Transition observed by an [`EdgeDetector`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Edge {
    Rising,
    Falling,
}

/// Remembers the previous level of a signal to report its edges.
#[derive(Debug, Copy, Clone, Default)]
pub struct EdgeDetector {
    previous: bool,
}

impl EdgeDetector {
    pub fn new(level: bool) -> Self {
        Self { previous: level }
    }

    /// Sample a new level, returning the edge between the previous sample and this one.
    pub fn sample(&mut self, level: bool) -> Option<Edge> {
        let edge = match (self.previous, level) {
            (false, true) => Some(Edge::Rising),
            (true, false) => Some(Edge::Falling),
            _ => None,
        };
        self.previous = level;
        edge
    }
}

/// Drives a [`CpuCore`] against a [`BusTarget`] one cycle at a time.
#[derive(Debug)]
pub struct Simulator<C: Features, M: BusTarget> {
    core: CpuCore<C>,
    memory: M,
    fetch_response: MemoryBusResponse,
    data_response: MemoryBusResponse,
    /// Level of the interrupt lines, applied every cycle.
    pub interrupts: Interrupts,
    cycle: u64,
}

/// External interrupt lines of the core.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Interrupts {
    pub machine_external: bool,
    pub machine_software: bool,
    pub machine_timer: bool,
    /// Fast interrupt channels, bit `i` for channel `i`.
    pub fast: u16,
    /// Debug halt request.
    pub debug_halt: bool,
}

impl<C: Features, M: BusTarget> Simulator<C, M> {
    pub fn new(core: CpuCore<C>, memory: M) -> Self {
        Self {
            core,
            memory,
            fetch_response: MemoryBusResponse::default(),
            data_response: MemoryBusResponse::default(),
            interrupts: Interrupts::default(),
            cycle: 0,
        }
    }

    pub fn core(&self) -> &CpuCore<C> {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut CpuCore<C> {
        &mut self.core
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    /// Number of cycles run since the last reset.
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Hold reset low for `cycles` cycles (at least one).
    pub fn reset(&mut self, cycles: u64) {
        trace!("Holding simulator in reset for {cycles} cycles");
        for _ in 0..cycles.max(1) {
            self.step(false);
        }
        self.cycle = 0;
    }

    /// Run a single clock cycle.
    pub fn cycle(&mut self) {
        trace!("Stepping simulator once");
        self.step(true);
        self.cycle += 1;
    }

    /// Run until `until` returns `true` after a cycle, or `max_cycles` have elapsed.
    ///
    /// Returns the number of cycles that were run, or `None` if the condition was never met.
    pub fn run(&mut self, max_cycles: u64, mut until: impl FnMut(&Self) -> bool) -> Option<u64> {
        for n in 1..=max_cycles {
            self.cycle();
            if until(self) {
                return Some(n);
            }
        }
        None
    }

    fn step(&mut self, reset_n: bool) {
        let inputs = CoreInputs {
            fetch_response: self.fetch_response,
            data_response: self.data_response,
            machine_external_irq: self.interrupts.machine_external,
            machine_software_irq: self.interrupts.machine_software,
            machine_timer_irq: self.interrupts.machine_timer,
            fast_irq: self.interrupts.fast,
            debug_halt_request: self.interrupts.debug_halt,
        };
        let wires = self.core.settle(&inputs);
        if reset_n {
            self.fetch_response = self.memory.clock(&wires.fetch_request);
            self.data_response = self.memory.clock(&wires.data_request);
        } else {
            self.fetch_response = MemoryBusResponse::default();
            self.data_response = MemoryBusResponse::default();
        }
        self.core.clock(&inputs, &wires, reset_n);
    }
}
