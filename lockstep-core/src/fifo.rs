//! Single-clock ring buffer FIFO.

use crate::simulator::Clocked;

/// FIFO with `2^EXP` slots.
///
/// - `SYNC_READ`: the read data is registered on the clock edge (the popped value becomes
///   visible after the edge) instead of being the combinational head of the buffer.
/// - `SAFE`: writes are ignored while full and reads are ignored while empty. Without it the
///   pointers advance regardless.
/// - `ZERO_OUT`: reading while empty yields `T::default()` instead of the stale slot content.
///
/// Both pointers are `EXP + 1` bits wide, so a full buffer and an empty one are told apart by
/// the extra wrap bit.
#[derive(Debug, Clone)]
pub struct Fifo<
    T,
    const EXP: u32,
    const SYNC_READ: bool = false,
    const SAFE: bool = true,
    const ZERO_OUT: bool = false,
> {
    slots: Box<[T]>,
    read_pointer: u32,
    write_pointer: u32,
    read_data: T,
}

/// Signals sampled by a [`Fifo`] on the rising clock edge.
#[derive(Debug, Copy, Clone, Default)]
pub struct FifoInputs<T> {
    /// Empty the buffer. Takes precedence over `write` and `read`.
    pub clear: bool,
    pub write: Option<T>,
    pub read: bool,
}

impl<T: Copy + Default, const EXP: u32, const SYNC_READ: bool, const SAFE: bool, const ZERO_OUT: bool>
    Fifo<T, EXP, SYNC_READ, SAFE, ZERO_OUT>
{
    pub const DEPTH: usize = 1 << EXP;
    const POINTER_MASK: u32 = (2 << EXP) - 1;

    pub fn new() -> Self {
        assert!(EXP < 16, "FIFO depth exponent out of range");
        Self {
            slots: vec![T::default(); Self::DEPTH].into_boxed_slice(),
            read_pointer: 0,
            write_pointer: 0,
            read_data: T::default(),
        }
    }

    /// Number of occupied slots.
    pub fn level(&self) -> usize {
        (self.write_pointer.wrapping_sub(self.read_pointer) & Self::POINTER_MASK) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.read_pointer == self.write_pointer
    }

    pub fn is_full(&self) -> bool {
        self.level() == Self::DEPTH
    }

    /// At least half the slots are occupied. A single-slot FIFO is half full only when full.
    pub fn half_full(&self) -> bool {
        self.level() * 2 >= Self::DEPTH.max(2)
    }

    /// At least one slot can be written.
    pub fn free(&self) -> bool {
        !self.is_full()
    }

    /// At least one slot can be read.
    pub fn available(&self) -> bool {
        !self.is_empty()
    }

    fn slot(pointer: u32) -> usize {
        (pointer as usize) & (Self::DEPTH - 1)
    }

    fn head(&self) -> T {
        if ZERO_OUT && self.is_empty() {
            T::default()
        } else {
            self.slots[Self::slot(self.read_pointer)]
        }
    }

    /// The read port: the buffer head, or the value registered by the last read when
    /// `SYNC_READ` is set.
    pub fn data(&self) -> T {
        if SYNC_READ {
            self.read_data
        } else {
            self.head()
        }
    }
}

impl<T: Copy + Default, const EXP: u32, const SYNC_READ: bool, const SAFE: bool, const ZERO_OUT: bool>
    Default for Fifo<T, EXP, SYNC_READ, SAFE, ZERO_OUT>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default, const EXP: u32, const SYNC_READ: bool, const SAFE: bool, const ZERO_OUT: bool>
    Clocked for Fifo<T, EXP, SYNC_READ, SAFE, ZERO_OUT>
{
    type Inputs<'a> = FifoInputs<T>;

    fn reset(&mut self) {
        self.read_pointer = 0;
        self.write_pointer = 0;
        self.read_data = T::default();
    }

    fn rising_edge(&mut self, inputs: FifoInputs<T>) {
        if inputs.clear {
            self.read_pointer = 0;
            self.write_pointer = 0;
            return;
        }
        let accept_write = !SAFE || self.free();
        let accept_read = !SAFE || self.available();
        if SYNC_READ {
            self.read_data = self.head();
        }
        if let Some(value) = inputs.write.filter(|_| accept_write) {
            self.slots[Self::slot(self.write_pointer)] = value;
            self.write_pointer = (self.write_pointer + 1) & Self::POINTER_MASK;
        }
        if inputs.read && accept_read {
            self.read_pointer = (self.read_pointer + 1) & Self::POINTER_MASK;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write<T>(value: T) -> FifoInputs<T> {
        FifoInputs {
            clear: false,
            write: Some(value),
            read: false,
        }
    }

    fn read<T>() -> FifoInputs<T> {
        FifoInputs {
            clear: false,
            write: None,
            read: true,
        }
    }

    #[test]
    fn test_depth_two_fill_and_drain() {
        let mut fifo = Fifo::<u32, 1>::new();
        assert!(fifo.is_empty());
        fifo.tick(write(1), true);
        assert!(fifo.free());
        fifo.tick(write(2), true);
        assert!(fifo.is_full());
        assert!(!fifo.is_empty());
        fifo.tick(read(), true);
        assert!(fifo.free());
        assert_eq!(2, fifo.data());
    }

    #[test]
    fn test_order_preserved_across_wrap() {
        let mut fifo = Fifo::<u32, 2>::new();
        let mut expected = Vec::new();
        let mut got = Vec::new();
        for value in 0..10 {
            fifo.tick(write(value), true);
            expected.push(value);
            if value % 3 == 2 {
                while fifo.available() {
                    got.push(fifo.data());
                    fifo.tick(read(), true);
                }
            }
        }
        while fifo.available() {
            got.push(fifo.data());
            fifo.tick(read(), true);
        }
        assert_eq!(expected, got);
    }

    #[test]
    fn test_safe_mode_ignores_overflow() {
        let mut fifo = Fifo::<u8, 1>::new();
        fifo.tick(write(1), true);
        fifo.tick(write(2), true);
        fifo.tick(write(3), true);
        assert_eq!(2, fifo.level());
        assert_eq!(1, fifo.data());
        fifo.tick(read(), true);
        fifo.tick(read(), true);
        fifo.tick(read(), true);
        assert!(fifo.is_empty());
        assert!(!fifo.is_full());
    }

    #[test]
    fn test_level_and_half_full() {
        let mut fifo = Fifo::<u16, 2>::new();
        assert_eq!(0, fifo.level());
        fifo.tick(write(1), true);
        assert!(!fifo.half_full());
        fifo.tick(write(2), true);
        assert_eq!(2, fifo.level());
        assert!(fifo.half_full());
        fifo.tick(write(3), true);
        fifo.tick(write(4), true);
        assert!(fifo.is_full());
        assert!(fifo.half_full());
        fifo.tick(read(), true);
        fifo.tick(read(), true);
        fifo.tick(read(), true);
        assert_eq!(1, fifo.level());
        assert!(!fifo.half_full());

        let mut single = Fifo::<u16, 0>::new();
        assert!(!single.half_full());
        single.tick(write(9), true);
        assert_eq!(1, single.level());
        assert!(single.half_full());
    }

    #[test]
    fn test_unsafe_mode_overwrites() {
        let mut fifo = Fifo::<u8, 1, false, false>::new();
        fifo.tick(write(1), true);
        fifo.tick(write(2), true);
        fifo.tick(write(3), true);
        // The write pointer lapped the read pointer
        assert_eq!(3, fifo.data());
    }

    #[test]
    fn test_zero_out_and_sync_read() {
        let mut fifo = Fifo::<u8, 1, true, true, true>::new();
        fifo.tick(write(7), true);
        assert_eq!(0, fifo.data());
        fifo.tick(read(), true);
        assert_eq!(7, fifo.data());
        fifo.tick(FifoInputs::default(), true);
        assert_eq!(0, fifo.data());
    }

    #[test]
    fn test_clear_and_reset() {
        let mut fifo = Fifo::<u8, 2>::new();
        fifo.tick(write(1), true);
        fifo.tick(
            FifoInputs {
                clear: true,
                write: Some(2),
                read: false,
            },
            true,
        );
        assert!(fifo.is_empty());
        fifo.tick(write(3), true);
        fifo.tick(FifoInputs::default(), false);
        assert!(fifo.is_empty());
    }
}
