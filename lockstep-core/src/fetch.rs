//! Instruction prefetch.

use crate::control_bus::ControlBus;
use crate::fifo::{Fifo, FifoInputs};
use crate::memory_bus::{MemoryBusRequest, MemoryBusResponse, Source};
use crate::simulator::Clocked;
use crate::PrivilegeLevel;
use log::trace;

/// One halfword of the prefetch buffer, tagged with the bus error of the word it came from.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Half {
    pub data: u16,
    pub error: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum State {
    /// Reload the program counter from the control bus.
    #[default]
    Restart,
    /// Waiting for buffer space, strobing the bus once there is.
    Request,
    /// Waiting for the bus to answer.
    Pending,
}

/// The fetched instruction as presented to the controller.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct InstructionBus {
    pub instruction: u32,
    pub valid: bool,
    /// The fetch of (part of) the instruction faulted.
    pub error: bool,
}

/// Signals sampled by [`InstructionFetch`] on the rising clock edge.
#[derive(Debug, Copy, Clone)]
pub struct FetchInputs<'a> {
    pub bus: &'a ControlBus,
    pub response: MemoryBusResponse,
    /// PMP verdict on the current fetch address.
    pub pmp_fault: bool,
}

/// Fetch engine feeding two halfword FIFOs, two entries deep.
///
/// A word is always fetched in full and split over the low and high FIFO, so both hold the same
/// number of entries and the head of each forms the next instruction.
#[derive(Debug, Clone, Default)]
pub struct InstructionFetch {
    state: State,
    /// A restart was requested while a bus access was outstanding.
    restart: bool,
    pc: u32,
    privilege: PrivilegeLevel,
    low: Fifo<Half, 1>,
    high: Fifo<Half, 1>,
}

impl InstructionFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Address of the next word to fetch.
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Privilege level latched at the last restart, used for the PMP execute check.
    pub fn privilege(&self) -> PrivilegeLevel {
        self.privilege
    }

    fn flushing(&self, bus: &ControlBus) -> bool {
        self.restart || bus.if_reset
    }

    fn space(&self) -> bool {
        self.low.free() && self.high.free()
    }

    /// The fetch port request for this cycle.
    pub fn request(&self, bus: &ControlBus, pmp_fault: bool) -> MemoryBusRequest {
        let strobe =
            self.state == State::Request && !self.flushing(bus) && self.space() && !pmp_fault;
        MemoryBusRequest {
            address: self.pc,
            byte_enable: 0b1111,
            strobe,
            source: Source::Fetch,
            privileged: self.privilege.is_machine(),
            debug: bus.cpu_debug,
            fence: bus.if_fence,
            ..MemoryBusRequest::default()
        }
    }

    pub fn instruction_bus(&self) -> InstructionBus {
        let (low, high) = (self.low.data(), self.high.data());
        InstructionBus {
            instruction: u32::from(high.data) << 16 | u32::from(low.data),
            valid: self.low.available(),
            error: low.error || high.error,
        }
    }
}

impl Clocked for InstructionFetch {
    type Inputs<'a> = FetchInputs<'a>;

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn rising_edge(&mut self, inputs: FetchInputs<'_>) {
        let bus = inputs.bus;
        let clear = self.state == State::Restart || bus.if_reset;
        let mut write = None;

        match self.state {
            State::Restart => {
                self.restart = false;
                self.pc = bus.pc_next & !0b11;
                self.privilege = bus.cpu_privileged;
                trace!("Instruction fetch restarting at {:#010x}", self.pc);
                self.state = State::Request;
            }
            State::Request => {
                if self.flushing(bus) {
                    self.state = State::Restart;
                } else if self.space() {
                    if inputs.pmp_fault {
                        let fault = Half {
                            data: 0,
                            error: true,
                        };
                        write = Some((fault, fault));
                        self.pc = self.pc.wrapping_add(4);
                    } else {
                        self.state = State::Pending;
                    }
                }
            }
            State::Pending => {
                self.restart |= bus.if_reset;
                let response = inputs.response;
                if response.is_done() {
                    if !self.restart {
                        let error = response.error;
                        write = Some((
                            Half {
                                data: response.data as u16,
                                error,
                            },
                            Half {
                                data: (response.data >> 16) as u16,
                                error,
                            },
                        ));
                    }
                    self.pc = self.pc.wrapping_add(4) & !0b11;
                    self.state = if self.restart {
                        State::Restart
                    } else {
                        State::Request
                    };
                }
            }
        }

        let read = bus.if_acknowledge;
        self.low.rising_edge(FifoInputs {
            clear,
            write: write.map(|(low, _)| low),
            read,
        });
        self.high.rising_edge(FifoInputs {
            clear,
            write: write.map(|(_, high)| high),
            read,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle(fetch: &mut InstructionFetch, bus: &ControlBus, response: MemoryBusResponse) {
        fetch.tick(
            FetchInputs {
                bus,
                response,
                pmp_fault: false,
            },
            true,
        );
    }

    fn idle() -> MemoryBusResponse {
        MemoryBusResponse::default()
    }

    #[test]
    fn test_restart_and_fetch() {
        let mut fetch = InstructionFetch::new();
        let bus = ControlBus {
            pc_next: 0x102,
            ..ControlBus::default()
        };
        cycle(&mut fetch, &bus, idle());
        assert_eq!(State::Request, fetch.state());
        assert_eq!(0x100, fetch.pc());

        let request = fetch.request(&bus, false);
        assert!(request.strobe);
        assert_eq!(Source::Fetch, request.source);
        assert_eq!(0x100, request.address);
        cycle(&mut fetch, &bus, idle());
        assert_eq!(State::Pending, fetch.state());
        assert!(!fetch.request(&bus, false).strobe);
        // Wait states
        cycle(&mut fetch, &bus, idle());
        assert_eq!(State::Pending, fetch.state());
        assert!(!fetch.instruction_bus().valid);

        cycle(&mut fetch, &bus, MemoryBusResponse::acknowledge(0xDEAD_BEEF));
        assert_eq!(State::Request, fetch.state());
        assert_eq!(0x104, fetch.pc());
        assert_eq!(
            InstructionBus {
                instruction: 0xDEAD_BEEF,
                valid: true,
                error: false,
            },
            fetch.instruction_bus()
        );

        let ack = ControlBus {
            if_acknowledge: true,
            ..bus.clone()
        };
        cycle(&mut fetch, &ack, idle());
        assert!(!fetch.instruction_bus().valid);
    }

    #[test]
    fn test_prefetch_fills_both_entries() {
        let mut fetch = InstructionFetch::new();
        let bus = ControlBus::default();
        cycle(&mut fetch, &bus, idle());
        for word in [1, 2] {
            assert!(fetch.request(&bus, false).strobe);
            cycle(&mut fetch, &bus, idle());
            cycle(&mut fetch, &bus, MemoryBusResponse::acknowledge(word));
        }
        assert_eq!(1, fetch.instruction_bus().instruction);
        assert!(!fetch.request(&bus, false).strobe);
    }

    #[test]
    fn test_bus_error_tags_instruction() {
        let mut fetch = InstructionFetch::new();
        let bus = ControlBus::default();
        cycle(&mut fetch, &bus, idle());
        cycle(&mut fetch, &bus, idle());
        cycle(&mut fetch, &bus, MemoryBusResponse::error());
        assert!(fetch.instruction_bus().valid);
        assert!(fetch.instruction_bus().error);
    }

    #[test]
    fn test_pmp_fault_skips_bus() {
        let mut fetch = InstructionFetch::new();
        let bus = ControlBus::default();
        cycle(&mut fetch, &bus, idle());
        assert!(!fetch.request(&bus, true).strobe);
        fetch.tick(
            FetchInputs {
                bus: &bus,
                response: idle(),
                pmp_fault: true,
            },
            true,
        );
        assert_eq!(State::Request, fetch.state());
        assert_eq!(4, fetch.pc());
        assert!(fetch.instruction_bus().error);
    }

    #[test]
    fn test_flush_discards_in_flight_response() {
        let mut fetch = InstructionFetch::new();
        let bus = ControlBus::default();
        cycle(&mut fetch, &bus, idle());
        cycle(&mut fetch, &bus, idle());
        assert_eq!(State::Pending, fetch.state());

        let flush = ControlBus {
            if_reset: true,
            pc_next: 0x200,
            ..ControlBus::default()
        };
        cycle(&mut fetch, &flush, idle());
        assert_eq!(State::Pending, fetch.state());
        cycle(&mut fetch, &bus, MemoryBusResponse::acknowledge(0x1234));
        assert_eq!(State::Restart, fetch.state());
        assert!(!fetch.instruction_bus().valid);

        cycle(&mut fetch, &flush, idle());
        assert_eq!(0x200, fetch.pc());
        assert_eq!(State::Request, fetch.state());
    }

    #[test]
    fn test_reset_clears_stale_word() {
        let mut fetch = InstructionFetch::new();
        let bus = ControlBus::default();
        cycle(&mut fetch, &bus, idle());
        cycle(&mut fetch, &bus, idle());
        cycle(&mut fetch, &bus, MemoryBusResponse::acknowledge(7));
        assert!(fetch.instruction_bus().valid);
        let flush = ControlBus {
            if_reset: true,
            ..ControlBus::default()
        };
        cycle(&mut fetch, &flush, idle());
        assert!(!fetch.instruction_bus().valid);
        assert_eq!(State::Restart, fetch.state());
    }
}
