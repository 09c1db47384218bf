//! Mock ADC backend for testing
//!
//! Tests script the samples; each `start_sample` consumes the next one.

use crate::platform::{
    traits::{AdcBackend, AdcBackendEvent, AdcConfig},
    DriverError, Result,
};
use core::cell::RefCell;
use std::collections::VecDeque;
use std::vec::Vec;

/// Mock ADC backend
///
/// # Example
///
/// ```
/// use sense_badge::platform::mock::MockAdc;
/// use sense_badge::platform::traits::{AdcBackend, AdcBackendEvent};
///
/// let adc = MockAdc::new();
/// adc.push_sample(512);
/// adc.start_sample().unwrap();
/// assert_eq!(adc.poll_event(), Some(AdcBackendEvent::SampleReady(512)));
/// ```
#[derive(Debug, Default)]
pub struct MockAdc {
    samples: RefCell<VecDeque<u16>>,
    configs: RefCell<Vec<AdcConfig>>,
    pending: RefCell<VecDeque<AdcBackendEvent>>,
    fail_next: RefCell<bool>,
}

impl MockAdc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the value the next conversion will produce
    pub fn push_sample(&self, value: u16) {
        self.samples.borrow_mut().push_back(value);
    }

    /// Report a fault for the next conversion
    pub fn fail_next_sample(&self) {
        *self.fail_next.borrow_mut() = true;
    }

    /// Every config applied, in order
    pub fn configs(&self) -> Vec<AdcConfig> {
        self.configs.borrow().clone()
    }
}

impl AdcBackend for MockAdc {
    fn apply_config(&self, config: &AdcConfig) -> Result<()> {
        self.configs.borrow_mut().push(*config);
        Ok(())
    }

    fn start_sample(&self) -> Result<()> {
        if core::mem::take(&mut *self.fail_next.borrow_mut()) {
            self.pending.borrow_mut().push_back(AdcBackendEvent::Fault);
            return Ok(());
        }
        match self.samples.borrow_mut().pop_front() {
            Some(value) => {
                self.pending
                    .borrow_mut()
                    .push_back(AdcBackendEvent::SampleReady(value));
                Ok(())
            }
            // Test forgot to script a sample
            None => Err(DriverError::Internal),
        }
    }

    fn poll_event(&self) -> Option<AdcBackendEvent> {
        self.pending.borrow_mut().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_adc_scripted_samples_in_order() {
        let adc = MockAdc::new();
        adc.push_sample(100);
        adc.push_sample(200);
        adc.start_sample().unwrap();
        adc.start_sample().unwrap();
        assert_eq!(adc.poll_event(), Some(AdcBackendEvent::SampleReady(100)));
        assert_eq!(adc.poll_event(), Some(AdcBackendEvent::SampleReady(200)));
        assert_eq!(adc.poll_event(), None);
    }

    #[test]
    fn test_mock_adc_unscripted_sample_is_error() {
        let adc = MockAdc::new();
        assert_eq!(adc.start_sample(), Err(DriverError::Internal));
    }

    #[test]
    fn test_mock_adc_fault_injection() {
        let adc = MockAdc::new();
        adc.fail_next_sample();
        adc.start_sample().unwrap();
        assert_eq!(adc.poll_event(), Some(AdcBackendEvent::Fault));
    }
}
