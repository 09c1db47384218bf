//! ADC driver
//!
//! The badge has one ADC shared by battery monitoring and the analog
//! microphone, each with its own channel and reference configuration.
//! This is the smallest client of the arbitration model: a single
//! `READING` operation kind, with instance adoption reprogramming the
//! channel config on owner change.

use core::cell::RefCell;

use bitflags::bitflags;
use critical_section::Mutex;

use crate::drivers::arbiter::{alloc_instance_id, Slot};
use crate::platform::traits::{AdcBackend, AdcBackendEvent, AdcConfig};
use crate::platform::{DriverError, Result};

bitflags! {
    /// In-flight operation kinds of the ADC
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AdcOps: u8 {
        const READING = 1 << 0;
    }
}

/// Completion events delivered to ADC handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcEvent {
    Sample(u16),
    Error,
}

pub type AdcHandler = fn(AdcEvent);

/// A logical client of the ADC
#[derive(Debug, Clone)]
pub struct AdcInstance {
    id: u32,
    config: AdcConfig,
}

impl AdcInstance {
    pub fn id(&self) -> u32 {
        self.id
    }
}

#[derive(Debug)]
struct AdcState {
    slot: Slot<AdcOps>,
    handler: Option<AdcHandler>,
    last_sample: Option<u16>,
    failed: bool,
}

/// ADC driver over backend `B`
#[derive(Debug)]
pub struct AdcDriver<B> {
    backend: B,
    state: Mutex<RefCell<AdcState>>,
}

impl<B: AdcBackend> AdcDriver<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: Mutex::new(RefCell::new(AdcState {
                slot: Slot::new(),
                handler: None,
                last_sample: None,
                failed: false,
            })),
        }
    }

    /// The backend, mainly for test inspection
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Create a logical instance with its own channel configuration
    pub fn configure(&self, config: AdcConfig) -> AdcInstance {
        AdcInstance {
            id: alloc_instance_id(),
            config,
        }
    }

    /// Start one conversion; `handler` gets the sample or the fault
    pub fn sample_async(&self, instance: &AdcInstance, handler: Option<AdcHandler>) -> Result<()> {
        if instance.id == 0 {
            return Err(DriverError::InvalidInstance);
        }
        let needs_config = critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            st.slot.claim(AdcOps::READING, AdcOps::READING)?;
            st.handler = handler;
            st.last_sample = None;
            st.failed = false;
            Ok::<bool, DriverError>(st.slot.adopt(instance.id))
        })?;

        if needs_config {
            if let Err(e) = self.backend.apply_config(&instance.config) {
                self.unwind_claim();
                return Err(e);
            }
        }
        if let Err(e) = self.backend.start_sample() {
            self.unwind_claim();
            return Err(e);
        }
        Ok(())
    }

    /// Blocking read of one sample
    pub fn sample(&self, instance: &AdcInstance) -> Result<u16> {
        self.sample_async(instance, None)?;
        loop {
            self.process();
            let done = critical_section::with(|cs| {
                let mut st = self.state.borrow_ref_mut(cs);
                if st.slot.is_set(AdcOps::READING) {
                    return None;
                }
                if core::mem::take(&mut st.failed) {
                    return Some(Err(DriverError::Internal));
                }
                Some(st.last_sample.take().ok_or(DriverError::Internal))
            });
            if let Some(result) = done {
                return result;
            }
        }
    }

    /// Drain and dispatch pending conversion events
    pub fn process(&self) {
        while let Some(event) = self.backend.poll_event() {
            self.handle_event(event);
        }
    }

    /// Interrupt entry point
    pub fn on_interrupt(&self) {
        self.process();
    }

    fn unwind_claim(&self) {
        critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            st.slot.release(AdcOps::READING);
            st.handler = None;
            st.slot.adopt(0);
        });
    }

    fn handle_event(&self, event: AdcBackendEvent) {
        let action = critical_section::with(|cs| {
            let mut st = self.state.borrow_ref_mut(cs);
            if !st.slot.is_set(AdcOps::READING) {
                return None;
            }
            st.slot.release(AdcOps::READING);
            let handler = st.handler.take();
            match event {
                AdcBackendEvent::SampleReady(value) => {
                    st.last_sample = Some(value);
                    Some((handler, AdcEvent::Sample(value)))
                }
                AdcBackendEvent::Fault => {
                    st.failed = true;
                    Some((handler, AdcEvent::Error))
                }
            }
        });

        if let Some((Some(handler), event)) = action {
            handler(event);
        }
    }
}
