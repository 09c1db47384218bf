//! Mock tick source for testing
//!
//! A hand-cranked counter with the RTC's 24-bit wrap, so timer tests can
//! step time exactly and cross the wrap boundary on purpose.

use crate::platform::traits::TickSource;
use core::cell::Cell;

const WRAP_MASK: u32 = 0x00FF_FFFF;
const TICKS_PER_SECOND: u32 = 32_768;

/// Mock tick source
///
/// # Example
///
/// ```
/// use sense_badge::platform::mock::MockTicker;
/// use sense_badge::platform::traits::TickSource;
///
/// let ticker = MockTicker::new();
/// ticker.advance(100);
/// assert_eq!(ticker.now(), 100);
/// ```
#[derive(Debug, Default)]
pub struct MockTicker {
    ticks: Cell<u32>,
}

impl MockTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `ticks`
    pub fn advance(&self, ticks: u32) {
        self.ticks
            .set(self.ticks.get().wrapping_add(ticks) & WRAP_MASK);
    }

    /// Jump to an absolute counter value
    pub fn set(&self, ticks: u32) {
        self.ticks.set(ticks & WRAP_MASK);
    }
}

impl TickSource for MockTicker {
    fn now(&self) -> u32 {
        self.ticks.get()
    }

    fn wrap_mask(&self) -> u32 {
        WRAP_MASK
    }

    fn ticks_per_second(&self) -> u32 {
        TICKS_PER_SECOND
    }
}
