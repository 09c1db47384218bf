//! Mock serial bus for testing
//!
//! Records every applied config and write burst, lets tests inject
//! received bytes and hardware faults, and can hold write completions
//! back for busy-window tests.

use crate::platform::{
    traits::{SerialBus, SerialBusEvent, SerialConfig, MAX_BURST_LEN},
    DriverError, Result,
};
use core::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::vec::Vec;

#[derive(Debug, Default)]
struct PeripheralSim {
    configs: Vec<SerialConfig>,
    written: Vec<u8>,
    bursts: Vec<usize>,
    pending: VecDeque<SerialBusEvent>,
    write_in_flight: bool,
    receiver_enabled: bool,
}

/// Mock serial bus
///
/// One instance simulates all serial peripherals on the board, addressed
/// by index like the real backend.
///
/// # Example
///
/// ```
/// use sense_badge::platform::mock::MockSerial;
/// use sense_badge::platform::traits::{SerialBus, SerialBusEvent};
///
/// let bus = MockSerial::new(1);
/// bus.start_write(0, b"hi").unwrap();
/// assert_eq!(bus.written(0), b"hi");
/// assert_eq!(bus.poll_event(0), Some(SerialBusEvent::WriteDone));
/// ```
#[derive(Debug)]
pub struct MockSerial {
    sims: Vec<RefCell<PeripheralSim>>,
    manual_completion: Cell<bool>,
    fail_writes: Cell<bool>,
}

impl MockSerial {
    /// Create a mock with `peripherals` simulated serial units
    pub fn new(peripherals: usize) -> Self {
        let mut sims = Vec::new();
        for _ in 0..peripherals {
            sims.push(RefCell::new(PeripheralSim::default()));
        }
        Self {
            sims,
            manual_completion: Cell::new(false),
            fail_writes: Cell::new(false),
        }
    }

    /// Hold write completions back until [`complete_write`](Self::complete_write)
    pub fn set_manual_completion(&self, manual: bool) {
        self.manual_completion.set(manual);
    }

    /// Make `start_write` fail with `Internal`
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    /// Finish the burst held back by manual completion
    pub fn complete_write(&self, peripheral: usize) {
        let mut sim = self.sims[peripheral].borrow_mut();
        if sim.write_in_flight {
            sim.write_in_flight = false;
            sim.pending.push_back(SerialBusEvent::WriteDone);
        }
    }

    /// Deliver `bytes` to the receiver; dropped if it is disabled
    pub fn inject_rx(&self, peripheral: usize, bytes: &[u8]) {
        let mut sim = self.sims[peripheral].borrow_mut();
        if !sim.receiver_enabled {
            return;
        }
        for &b in bytes {
            sim.pending.push_back(SerialBusEvent::ByteReceived(b));
        }
    }

    /// Raise a hardware fault event
    pub fn raise_error(&self, peripheral: usize) {
        let mut sim = self.sims[peripheral].borrow_mut();
        sim.write_in_flight = false;
        sim.pending.push_back(SerialBusEvent::Error);
    }

    /// All bytes written so far (for test verification)
    pub fn written(&self, peripheral: usize) -> Vec<u8> {
        self.sims[peripheral].borrow().written.clone()
    }

    /// Size of each write burst, in submission order
    pub fn bursts(&self, peripheral: usize) -> Vec<usize> {
        self.sims[peripheral].borrow().bursts.clone()
    }

    /// Every config applied to the peripheral, in order
    pub fn configs(&self, peripheral: usize) -> Vec<SerialConfig> {
        self.sims[peripheral].borrow().configs.clone()
    }

    /// Whether the receiver is currently enabled
    pub fn receiver_enabled(&self, peripheral: usize) -> bool {
        self.sims[peripheral].borrow().receiver_enabled
    }
}

impl SerialBus for MockSerial {
    fn apply_config(&self, peripheral: usize, config: &SerialConfig) -> Result<()> {
        self.sims[peripheral].borrow_mut().configs.push(*config);
        Ok(())
    }

    fn start_write(&self, peripheral: usize, bytes: &[u8]) -> Result<()> {
        if self.fail_writes.get() {
            return Err(DriverError::Internal);
        }
        if bytes.is_empty() || bytes.len() > MAX_BURST_LEN {
            return Err(DriverError::InvalidParam);
        }
        let mut sim = self.sims[peripheral].borrow_mut();
        if sim.write_in_flight {
            return Err(DriverError::Busy);
        }
        sim.written.extend_from_slice(bytes);
        sim.bursts.push(bytes.len());
        if self.manual_completion.get() {
            sim.write_in_flight = true;
        } else {
            sim.pending.push_back(SerialBusEvent::WriteDone);
        }
        Ok(())
    }

    fn cancel_write(&self, peripheral: usize) {
        self.sims[peripheral].borrow_mut().write_in_flight = false;
    }

    fn enable_receiver(&self, peripheral: usize) -> Result<()> {
        self.sims[peripheral].borrow_mut().receiver_enabled = true;
        Ok(())
    }

    fn disable_receiver(&self, peripheral: usize) {
        let mut sim = self.sims[peripheral].borrow_mut();
        sim.receiver_enabled = false;
        // Drop bytes still sitting in the hardware buffer
        sim.pending
            .retain(|ev| !matches!(ev, SerialBusEvent::ByteReceived(_)));
    }

    fn poll_event(&self, peripheral: usize) -> Option<SerialBusEvent> {
        self.sims[peripheral].borrow_mut().pending.pop_front()
    }
}
