//! Memory bus request/response pair shared by the fetch and data ports.

/// Origin of a bus request.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum Source {
    #[default]
    Data = 0,
    Fetch = 1,
}

/// Atomic memory operation carried by a data request, a 4-bit field.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum AtomicOperation {
    #[default]
    Swap = 0,
    Add = 1,
    Xor = 2,
    And = 3,
    Or = 4,
    Min = 5,
    Max = 6,
    MinU = 7,
    MaxU = 8,
    LoadReserved = 9,
    StoreConditional = 10,
}

impl AtomicOperation {
    /// Load-reserved/store-conditional are not read-modify-write operations and don't lock the
    /// bus.
    pub fn is_read_modify_write(self) -> bool {
        !matches!(self, Self::LoadReserved | Self::StoreConditional)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct MemoryBusRequest {
    pub address: u32,
    pub write_data: u32,
    /// One bit per byte lane, bit 0 selects bits 7:0.
    pub byte_enable: u8,
    /// `true` for a write.
    pub read_write: bool,
    /// A request is only present on the bus while the strobe is asserted.
    pub strobe: bool,
    pub source: Source,
    pub atomic: bool,
    pub atomic_operation: AtomicOperation,
    pub fence: bool,
    /// Keep the bus locked for the duration of an atomic read-modify-write.
    pub lock: bool,
    pub privileged: bool,
    pub debug: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct MemoryBusResponse {
    pub data: u32,
    pub acknowledge: bool,
    pub error: bool,
}

impl MemoryBusResponse {
    /// `true` if the outstanding request has completed, successfully or not.
    pub fn is_done(&self) -> bool {
        self.acknowledge || self.error
    }

    pub fn acknowledge(data: u32) -> Self {
        Self {
            data,
            acknowledge: true,
            error: false,
        }
    }

    pub fn error() -> Self {
        Self {
            data: 0,
            acknowledge: false,
            error: true,
        }
    }
}

/// Anything that answers memory bus requests.
///
/// A target is clocked together with the core: it samples the requests driven during a cycle on
/// the rising edge, and the returned response is what the core sees during the following cycle.
/// Each port is clocked separately, with every request tagged by its [`Source`]. Only requests
/// accepted with a strobe are ever answered; all other cycles return an idle (all-zero) response.
pub trait BusTarget {
    fn clock(&mut self, request: &MemoryBusRequest) -> MemoryBusResponse;
}
