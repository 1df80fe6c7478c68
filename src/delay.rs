//! Simple busy-loop delay provider

use crate::rcc::Clocks;

/// A delay provided by busy-looping
pub struct CycleDelay {
    clocks: Clocks,
}

impl CycleDelay {
    pub const fn new(clocks: Clocks) -> Self {
        Self { clocks }
    }

    /// Processor cycles spanned by `ns` nanoseconds, rounded up.
    pub fn cycles(&self, ns: u32) -> u64 {
        let hz = self.clocks.sysclk.to_Hz() as u64;
        (ns as u64 * hz).div_ceil(1_000_000_000)
    }

    #[inline]
    fn spin(cycles: u64) {
        for _ in 0..cycles {
            core::hint::spin_loop();
        }
    }
}

impl embedded_hal::delay::DelayNs for CycleDelay {
    fn delay_ns(&mut self, ns: u32) {
        Self::spin(self.cycles(ns));
    }

    fn delay_us(&mut self, us: u32) {
        let cycles = us as u64 * self.clocks.sysclk.to_Hz() as u64 / 1_000_000;
        Self::spin(cycles);
    }
}
