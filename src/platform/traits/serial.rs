//! Serial bus backend abstraction
//!
//! The transport driver in [`crate::drivers::serial`] programs a
//! `SerialBus` one burst at a time and consumes its completion events.
//! The backend knows nothing about logical instances, staging or rings;
//! it only moves bytes.

use crate::platform::Result;

/// Largest chunk the hardware can move in a single transfer
///
/// Longer transfers are split by the driver; the backend never sees a
/// write larger than this.
pub const MAX_BURST_LEN: usize = 255;

/// Parity configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Serial peripheral configuration
///
/// Applied by the driver whenever a different logical instance takes
/// ownership of the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SerialConfig {
    /// Baud rate in bits per second
    pub baud_rate: u32,
    /// Parity mode
    pub parity: Parity,
    /// Hardware flow control (RTS/CTS)
    pub flow_control: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            parity: Parity::None,
            flow_control: false,
        }
    }
}

/// Completion events reported by a serial backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SerialBusEvent {
    /// The burst handed to `start_write` has been sent
    WriteDone,
    /// One byte arrived while the receiver was enabled
    ByteReceived(u8),
    /// Framing, parity or overrun fault; outstanding transfers are dead
    Error,
}

/// Serial hardware backend
///
/// One implementor serves all physical serial peripherals on the board,
/// addressed by index. Completion events are delivered either by polling
/// (`poll_event`, used by the driver's `process` pump) or by the
/// platform's interrupt handler calling straight into the driver.
pub trait SerialBus {
    /// Program baud rate, parity and flow control for one peripheral
    fn apply_config(&self, peripheral: usize, config: &SerialConfig) -> Result<()>;

    /// Start sending `bytes` (at most [`MAX_BURST_LEN`]); one `WriteDone`
    /// event follows
    fn start_write(&self, peripheral: usize, bytes: &[u8]) -> Result<()>;

    /// Cancel an in-flight write; no completion event follows
    fn cancel_write(&self, peripheral: usize);

    /// Enable the receiver; each arriving byte raises `ByteReceived`
    fn enable_receiver(&self, peripheral: usize) -> Result<()>;

    /// Disable the receiver and drop its hardware buffer
    fn disable_receiver(&self, peripheral: usize);

    /// Take the next pending completion event, if any
    fn poll_event(&self, peripheral: usize) -> Option<SerialBusEvent>;
}
