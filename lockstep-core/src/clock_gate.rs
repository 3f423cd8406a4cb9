//! Glitch-free clock gate.

use crate::simulator::{Edge, EdgeDetector};

/// Gates a clock with a halt request.
///
/// The enable is latched on the falling edge of the input clock, so the gated clock can only
/// stop or resume while it is low. During reset the clock always passes.
#[derive(Debug, Clone, Copy)]
pub struct ClockGate {
    enable: bool,
    clock: EdgeDetector,
}

impl Default for ClockGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockGate {
    pub fn new() -> Self {
        Self {
            enable: true,
            clock: EdgeDetector::new(false),
        }
    }

    /// Whether the gate currently lets the clock through.
    pub fn enabled(&self) -> bool {
        self.enable
    }

    /// Apply a new input clock level, returning the gated clock level.
    pub fn drive(&mut self, clock: bool, halt: bool, reset_n: bool) -> bool {
        let edge = self.clock.sample(clock);
        if !reset_n {
            self.enable = true;
        } else if edge == Some(Edge::Falling) {
            self.enable = !halt;
        }
        self.enable && clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halt_sampled_on_falling_edge() {
        let mut gate = ClockGate::new();
        assert!(gate.drive(true, true, true));
        // Halt only takes effect once the clock falls
        assert!(!gate.drive(false, true, true));
        assert!(!gate.drive(true, false, true));
        assert!(!gate.drive(false, false, true));
        assert!(gate.drive(true, true, true));
    }

    #[test]
    fn test_reset_passes_clock() {
        let mut gate = ClockGate::new();
        gate.drive(true, true, true);
        gate.drive(false, true, true);
        assert!(!gate.enabled());
        assert!(gate.drive(true, true, false));
        assert!(gate.enabled());
    }
}
