use crate::memory_bus::{AtomicOperation, BusTarget, MemoryBusRequest, MemoryBusResponse, Source};
use log::{debug, trace};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    #[error("bytes {start:#010x}..{end:#010x} are outside of {base:#010x}..{limit:#010x}")]
    OutOfRange {
        start: u64,
        end: u64,
        base: u64,
        limit: u64,
    },
}

/// An accepted request waiting out the access latency.
#[derive(Debug, Clone, Copy)]
struct Pending {
    request: MemoryBusRequest,
    remaining: u32,
}

/// Byte-addressed RAM answering both bus ports, with support for atomics.
///
/// Every accepted request is answered after a fixed number of wait states. Requests whose word
/// falls outside of the RAM are answered with a bus error.
#[derive(Debug, Clone)]
pub struct Ram {
    base: u32,
    data: Vec<u8>,
    latency: u32,
    pending: [Option<Pending>; 2],
    /// Word address reserved by the last load-reserved.
    reservation: Option<u32>,
}

impl Ram {
    /// Create a zero-initialized RAM of `size` bytes starting at `base`.
    ///
    /// Returns `None` if `size` is zero or the RAM would extend past the 32-bit address space.
    pub fn new(base: u32, size: usize) -> Option<Self> {
        if size == 0 || u64::from(base) + size as u64 > 1 << 32 {
            return None;
        }
        Some(Self {
            base,
            data: vec![0; size],
            latency: 0,
            pending: [None; 2],
            reservation: None,
        })
    }

    /// Answer every request only after `latency` additional cycles.
    pub fn with_latency(mut self, latency: u32) -> Self {
        self.latency = latency;
        self
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    fn offset(&self, address: u32, len: usize) -> Result<usize, MemoryError> {
        let start = u64::from(address);
        let end = start + len as u64;
        let base = u64::from(self.base);
        let limit = base + self.data.len() as u64;
        if start < base || end > limit {
            return Err(MemoryError::OutOfRange {
                start,
                end,
                base,
                limit,
            });
        }
        Ok((start - base) as usize)
    }

    /// Copy `bytes` into RAM at `address`, bypassing the bus.
    pub fn load(&mut self, address: u32, bytes: &[u8]) -> Result<(), MemoryError> {
        let offset = self.offset(address, bytes.len())?;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Read bytes without side effects.
    pub fn read(&self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        let offset = self.offset(address, buf.len())?;
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
        Ok(())
    }

    pub fn read_word(&self, address: u32) -> Result<u32, MemoryError> {
        let mut word = [0; 4];
        self.read(address, &mut word)?;
        Ok(u32::from_le_bytes(word))
    }

    pub fn write_word(&mut self, address: u32, value: u32) -> Result<(), MemoryError> {
        self.load(address, &value.to_le_bytes())
    }

    fn store(&mut self, address: u32, value: u32, byte_enable: u8) -> Result<(), MemoryError> {
        let offset = self.offset(address, 4)?;
        for (lane, byte) in value.to_le_bytes().into_iter().enumerate() {
            if byte_enable >> lane & 1 != 0 {
                self.data[offset + lane] = byte;
            }
        }
        if self.reservation == Some(address) {
            self.reservation = None;
        }
        Ok(())
    }

    fn access(&mut self, request: &MemoryBusRequest) -> Result<u32, MemoryError> {
        let address = request.address & !0b11;
        let old = self.read_word(address)?;
        if !request.atomic {
            if request.read_write {
                self.store(address, request.write_data, request.byte_enable)?;
                return Ok(0);
            }
            return Ok(old);
        }

        let operand = request.write_data;
        let new = match request.atomic_operation {
            AtomicOperation::LoadReserved => {
                self.reservation = Some(address);
                return Ok(old);
            }
            AtomicOperation::StoreConditional => {
                let reserved = self.reservation.take() == Some(address);
                if !reserved {
                    return Ok(1);
                }
                self.store(address, operand, 0b1111)?;
                return Ok(0);
            }
            AtomicOperation::Swap => operand,
            AtomicOperation::Add => old.wrapping_add(operand),
            AtomicOperation::Xor => old ^ operand,
            AtomicOperation::And => old & operand,
            AtomicOperation::Or => old | operand,
            AtomicOperation::Min => (old as i32).min(operand as i32) as u32,
            AtomicOperation::Max => (old as i32).max(operand as i32) as u32,
            AtomicOperation::MinU => old.min(operand),
            AtomicOperation::MaxU => old.max(operand),
        };
        self.store(address, new, 0b1111)?;
        Ok(old)
    }
}

impl BusTarget for Ram {
    fn clock(&mut self, request: &MemoryBusRequest) -> MemoryBusResponse {
        let port = match request.source {
            Source::Data => 0,
            Source::Fetch => 1,
        };
        if request.strobe {
            trace!(
                "RAM accepted {:?} access at {:#010x}",
                request.source,
                request.address
            );
            self.pending[port] = Some(Pending {
                request: *request,
                remaining: self.latency,
            });
        }
        let request = match &mut self.pending[port] {
            Some(pending) if pending.remaining > 0 => {
                pending.remaining -= 1;
                return MemoryBusResponse::default();
            }
            Some(pending) => pending.request,
            None => return MemoryBusResponse::default(),
        };
        self.pending[port] = None;
        match self.access(&request) {
            Ok(data) => MemoryBusResponse::acknowledge(data),
            Err(error) => {
                debug!("Bus error: {error}");
                MemoryBusResponse::error()
            }
        }
    }
}
