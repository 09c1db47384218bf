//! Tick counter abstraction
//!
//! One free-running hardware counter backs every software timer. The
//! counter is narrow (24 bits on the badge's RTC) and wraps; all
//! elapsed-time math in [`crate::core::timer`] is done modulo the wrap
//! boundary.

/// Monotonic tick source
pub trait TickSource {
    /// Current counter value, already masked to the counter width
    fn now(&self) -> u32;

    /// Counter width mask (power of two minus one, e.g. `0x00FF_FFFF`
    /// for a 24-bit counter)
    fn wrap_mask(&self) -> u32;

    /// Counter frequency in Hz
    fn ticks_per_second(&self) -> u32;
}
