//! Asynchronous FIFO for crossing between two clock domains.
//!
//! Each side keeps a binary pointer for addressing and a Gray-coded copy that is passed through a
//! two-flop synchronizer into the other domain. Since only one bit of a Gray pointer changes per
//! increment, a pointer sampled mid-transition is off by at most one, which can only make the
//! `full` and `empty` flags pessimistic.

/// Dual-clock FIFO with `2^EXP` slots.
#[derive(Debug, Clone)]
pub struct DualClockFifo<T, const EXP: u32> {
    slots: Box<[T]>,
    write: Domain,
    read: Domain,
    full: bool,
    empty: bool,
}

/// Registers of one clock domain.
#[derive(Debug, Clone, Copy, Default)]
struct Domain {
    binary: u32,
    gray: u32,
    /// Synchronizer stages for the other side's Gray pointer: `[first, second]`.
    synchronizer: [u32; 2],
}

impl Domain {
    fn synchronized(&self) -> u32 {
        self.synchronizer[1]
    }

    fn shift_in(&mut self, gray: u32) {
        self.synchronizer = [gray, self.synchronizer[0]];
    }
}

fn binary_to_gray(binary: u32) -> u32 {
    binary ^ (binary >> 1)
}

impl<T: Copy + Default, const EXP: u32> DualClockFifo<T, EXP> {
    pub const DEPTH: usize = 1 << EXP;
    const POINTER_MASK: u32 = (2 << EXP) - 1;
    /// The two most significant pointer bits.
    const WRAP_BITS: u32 = 0b11 << (EXP - 1);

    pub fn new() -> Self {
        assert!((1..16).contains(&EXP), "FIFO depth exponent out of range");
        Self {
            slots: vec![T::default(); Self::DEPTH].into_boxed_slice(),
            write: Domain::default(),
            read: Domain::default(),
            full: false,
            empty: true,
        }
    }

    /// Registered full flag, in the write clock domain.
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Registered empty flag, in the read clock domain.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// The slot at the read pointer.
    pub fn data(&self) -> T {
        self.slots[(self.read.binary as usize) & (Self::DEPTH - 1)]
    }

    /// Rising edge of the write clock. `value` is stored unless the FIFO is full.
    pub fn write_clock(&mut self, value: Option<T>, reset_n: bool) {
        if !reset_n {
            self.write = Domain::default();
            self.full = false;
            return;
        }
        let increment = value.is_some() && !self.full;
        if let Some(value) = value.filter(|_| increment) {
            self.slots[(self.write.binary as usize) & (Self::DEPTH - 1)] = value;
        }
        let binary = (self.write.binary + u32::from(increment)) & Self::POINTER_MASK;
        let gray = binary_to_gray(binary);
        // Full when the write pointer is one lap ahead, which in Gray code inverts the top two
        // bits.
        self.full = gray == self.write.synchronized() ^ Self::WRAP_BITS;
        self.write.shift_in(self.read.gray);
        self.write.binary = binary;
        self.write.gray = gray;
    }

    /// Rising edge of the read clock. Advances past the current slot if `read` is set and the
    /// FIFO isn't empty.
    pub fn read_clock(&mut self, read: bool, reset_n: bool) {
        if !reset_n {
            self.read = Domain::default();
            self.empty = true;
            return;
        }
        let increment = read && !self.empty;
        let binary = (self.read.binary + u32::from(increment)) & Self::POINTER_MASK;
        let gray = binary_to_gray(binary);
        self.empty = gray == self.read.synchronized();
        self.read.shift_in(self.write.gray);
        self.read.binary = binary;
        self.read.gray = gray;
    }
}

impl<T: Copy + Default, const EXP: u32> Default for DualClockFifo<T, EXP> {
    fn default() -> Self {
        Self::new()
    }
}
