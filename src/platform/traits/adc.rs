//! ADC backend abstraction

use crate::platform::Result;

/// Voltage reference selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdcReference {
    /// Internal bandgap reference
    #[default]
    Internal,
    /// One third of the supply voltage (battery measurement)
    SupplyOneThird,
    /// External reference pin
    External,
}

/// ADC channel configuration
///
/// Each logical instance carries its own config; the driver reprograms
/// the converter only when a different instance takes ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdcConfig {
    /// Analog input channel
    pub channel: u8,
    /// Conversion resolution in bits
    pub resolution_bits: u8,
    /// Voltage reference
    pub reference: AdcReference,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            channel: 0,
            resolution_bits: 10,
            reference: AdcReference::Internal,
        }
    }
}

/// Completion events reported by an ADC backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdcBackendEvent {
    /// Conversion finished with this raw sample
    SampleReady(u16),
    /// Conversion failed
    Fault,
}

/// ADC hardware backend
///
/// The badge has a single converter; one sample is in flight at a time.
pub trait AdcBackend {
    /// Program channel, resolution and reference
    fn apply_config(&self, config: &AdcConfig) -> Result<()>;

    /// Begin one conversion; one completion event follows
    fn start_sample(&self) -> Result<()>;

    /// Take the next pending completion event, if any
    fn poll_event(&self) -> Option<AdcBackendEvent>;
}
