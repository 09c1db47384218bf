//! Software timer service
//!
//! Multiplexes one hardware tick counter into `N` logical timers. The
//! counter is free-running with a power-of-two wrap (the badge's RTC
//! wraps at 24 bits), so all elapsed-time math goes through a masked
//! difference and stays correct across rollover.
//!
//! Timers do not fire by themselves: the application main loop calls
//! [`TimerService::poll`], which runs the timeout handlers of every due
//! timer in app context. A repeating timer is rescheduled from its
//! previous deadline, not from the moment `poll` happened to run, so
//! late polling does not accumulate drift.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Vec;

use crate::platform::traits::TickSource;
use crate::platform::{DriverError, Result};

/// Firing behavior of one timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Fire once, then deactivate
    OneShot,
    /// Fire every interval until stopped
    Repeating,
}

/// Timeout handler; receives the context passed to `start`
pub type TimeoutHandler = fn(usize);

/// Handle to a created timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId(usize);

#[derive(Debug)]
struct TimerEntry {
    mode: TimerMode,
    handler: TimeoutHandler,
    context: usize,
    started: u32,
    timeout: u32,
    active: bool,
}

/// `N` logical timers over tick source `T`
#[derive(Debug)]
pub struct TimerService<T, const N: usize> {
    ticks: T,
    timers: Mutex<RefCell<Vec<TimerEntry, N>>>,
}

impl<T: TickSource, const N: usize> TimerService<T, N> {
    pub fn new(ticks: T) -> Self {
        Self {
            ticks,
            timers: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// The tick source, mainly for test inspection
    pub fn source(&self) -> &T {
        &self.ticks
    }

    /// Create a timer; ids are handed out sequentially
    ///
    /// Timers are created once at startup by app-context code and live
    /// for the life of the process; there is no destroy.
    pub fn create(&self, mode: TimerMode, handler: TimeoutHandler) -> Result<TimerId> {
        critical_section::with(|cs| {
            let mut timers = self.timers.borrow_ref_mut(cs);
            let id = timers.len();
            timers
                .push(TimerEntry {
                    mode,
                    handler,
                    context: 0,
                    started: 0,
                    timeout: 0,
                    active: false,
                })
                .map_err(|_| DriverError::NoMemory)?;
            Ok(TimerId(id))
        })
    }

    /// Arm a timer for `timeout_ticks` from now
    ///
    /// `context` is handed to the timeout handler untouched. Restarting
    /// an armed timer rebases it on the current tick. Fails with
    /// `InvalidParam` on a zero timeout or one the counter cannot
    /// represent, `InvalidState` on a never-created id.
    pub fn start(&self, id: TimerId, timeout_ticks: u32, context: usize) -> Result<()> {
        if timeout_ticks == 0 || timeout_ticks > self.ticks.wrap_mask() {
            return Err(DriverError::InvalidParam);
        }
        let now = self.ticks.now();
        critical_section::with(|cs| {
            let mut timers = self.timers.borrow_ref_mut(cs);
            let entry = timers.get_mut(id.0).ok_or(DriverError::InvalidState)?;
            entry.started = now;
            entry.timeout = timeout_ticks;
            entry.context = context;
            entry.active = true;
            Ok(())
        })
    }

    /// Disarm a timer; idempotent
    pub fn stop(&self, id: TimerId) -> Result<()> {
        critical_section::with(|cs| {
            let mut timers = self.timers.borrow_ref_mut(cs);
            let entry = timers.get_mut(id.0).ok_or(DriverError::InvalidState)?;
            entry.active = false;
            Ok(())
        })
    }

    /// Disarm every timer
    pub fn stop_all(&self) {
        critical_section::with(|cs| {
            for entry in self.timers.borrow_ref_mut(cs).iter_mut() {
                entry.active = false;
            }
        });
    }

    /// Current counter value
    pub fn now(&self) -> u32 {
        self.ticks.now()
    }

    /// Ticks elapsed from `from` to `to`, wraparound-safe
    pub fn diff(&self, to: u32, from: u32) -> u32 {
        to.wrapping_sub(from) & self.ticks.wrap_mask()
    }

    pub fn ms_to_ticks(&self, ms: u32) -> u32 {
        let rate = self.ticks.ticks_per_second() as u64;
        ((ms as u64 * rate + 500) / 1000) as u32
    }

    pub fn ticks_to_ms(&self, ticks: u32) -> u32 {
        let rate = self.ticks.ticks_per_second() as u64;
        ((ticks as u64 * 1000 + rate / 2) / rate) as u32
    }

    /// Fire every due timer
    ///
    /// One-shot timers deactivate before their handler runs; repeating
    /// timers advance their deadline by one interval per poll, so a
    /// poll arriving several intervals late catches up one firing at a
    /// time. Handlers run outside the critical section.
    pub fn poll(&self) {
        let now = self.ticks.now();
        let mask = self.ticks.wrap_mask();
        let mut due: Vec<(TimeoutHandler, usize), N> = Vec::new();

        critical_section::with(|cs| {
            for entry in self.timers.borrow_ref_mut(cs).iter_mut() {
                if !entry.active {
                    continue;
                }
                let elapsed = now.wrapping_sub(entry.started) & mask;
                if elapsed < entry.timeout {
                    continue;
                }
                match entry.mode {
                    TimerMode::OneShot => entry.active = false,
                    TimerMode::Repeating => {
                        entry.started = entry.started.wrapping_add(entry.timeout) & mask;
                    }
                }
                // At most N timers exist, push cannot fail
                let _ = due.push((entry.handler, entry.context));
            }
        });

        for (handler, context) in due {
            handler(context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockTicker;
    use core::sync::atomic::{AtomicUsize, Ordering};

    fn service() -> TimerService<MockTicker, 4> {
        TimerService::new(MockTicker::new())
    }

    #[test]
    fn test_one_shot_fires_exactly_once() {
        static FIRED: AtomicUsize = AtomicUsize::new(0);
        fn on_timeout(_context: usize) {
            FIRED.fetch_add(1, Ordering::SeqCst);
        }

        let svc = service();
        let id = svc.create(TimerMode::OneShot, on_timeout).unwrap();
        svc.start(id, 100, 0).unwrap();

        svc.source().advance(99);
        svc.poll();
        assert_eq!(FIRED.load(Ordering::SeqCst), 0);

        svc.source().advance(1);
        svc.poll();
        assert_eq!(FIRED.load(Ordering::SeqCst), 1);

        svc.source().advance(500);
        svc.poll();
        assert_eq!(FIRED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_repeating_reschedules_from_previous_deadline() {
        static FIRED: AtomicUsize = AtomicUsize::new(0);
        fn on_timeout(_context: usize) {
            FIRED.fetch_add(1, Ordering::SeqCst);
        }

        let svc = service();
        let id = svc.create(TimerMode::Repeating, on_timeout).unwrap();
        svc.start(id, 50, 0).unwrap();

        // Poll arrives half an interval late; the next deadline is still
        // tick 100, not 125
        svc.source().advance(75);
        svc.poll();
        assert_eq!(FIRED.load(Ordering::SeqCst), 1);

        svc.source().advance(25);
        svc.poll();
        assert_eq!(FIRED.load(Ordering::SeqCst), 2);

        svc.stop(id).unwrap();
        svc.source().advance(200);
        svc.poll();
        assert_eq!(FIRED.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_timeout_across_counter_wrap() {
        static FIRED: AtomicUsize = AtomicUsize::new(0);
        fn on_timeout(_context: usize) {
            FIRED.fetch_add(1, Ordering::SeqCst);
        }

        let svc = service();
        svc.source().set(0x00FF_FFF5);
        let id = svc.create(TimerMode::OneShot, on_timeout).unwrap();
        svc.start(id, 20, 0).unwrap();

        svc.source().advance(19);
        svc.poll();
        assert_eq!(FIRED.load(Ordering::SeqCst), 0);

        svc.source().advance(1);
        svc.poll();
        assert_eq!(FIRED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_context_reaches_handler() {
        static CONTEXT: AtomicUsize = AtomicUsize::new(0);
        fn on_timeout(context: usize) {
            CONTEXT.store(context, Ordering::SeqCst);
        }

        let svc = service();
        let id = svc.create(TimerMode::OneShot, on_timeout).unwrap();
        svc.start(id, 10, 0xBEEF).unwrap();
        svc.source().advance(10);
        svc.poll();
        assert_eq!(CONTEXT.load(Ordering::SeqCst), 0xBEEF);
    }

    #[test]
    fn test_start_validation() {
        fn on_timeout(_context: usize) {}

        let svc = service();
        let id = svc.create(TimerMode::OneShot, on_timeout).unwrap();
        assert_eq!(svc.start(id, 0, 0), Err(DriverError::InvalidParam));
        assert_eq!(
            svc.start(id, 0x0100_0000, 0),
            Err(DriverError::InvalidParam)
        );
        assert_eq!(
            svc.start(TimerId(3), 10, 0),
            Err(DriverError::InvalidState)
        );
    }

    #[test]
    fn test_create_exhaustion() {
        fn on_timeout(_context: usize) {}

        let svc = service();
        for _ in 0..4 {
            svc.create(TimerMode::OneShot, on_timeout).unwrap();
        }
        assert_eq!(
            svc.create(TimerMode::OneShot, on_timeout),
            Err(DriverError::NoMemory)
        );
    }

    #[test]
    fn test_stop_all() {
        static FIRED: AtomicUsize = AtomicUsize::new(0);
        fn on_timeout(_context: usize) {
            FIRED.fetch_add(1, Ordering::SeqCst);
        }

        let svc = service();
        let a = svc.create(TimerMode::OneShot, on_timeout).unwrap();
        let b = svc.create(TimerMode::Repeating, on_timeout).unwrap();
        svc.start(a, 10, 0).unwrap();
        svc.start(b, 10, 0).unwrap();
        svc.stop_all();
        svc.source().advance(50);
        svc.poll();
        assert_eq!(FIRED.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_tick_conversions_round() {
        let svc = service();
        assert_eq!(svc.ms_to_ticks(1000), 32_768);
        assert_eq!(svc.ms_to_ticks(1), 33);
        assert_eq!(svc.ticks_to_ms(32_768), 1000);
        assert_eq!(svc.ticks_to_ms(33), 1);
    }

    #[test]
    fn test_diff_wraps() {
        let svc = service();
        assert_eq!(svc.diff(5, 0x00FF_FFFB), 10);
        assert_eq!(svc.diff(100, 40), 60);
    }
}
