//! Driver error types
//!
//! One flat error taxonomy shared by every driver in the crate. All
//! failures are signaled through return values or polled status; there is
//! no unwinding path in non-test code.

use core::fmt;

/// Result type for driver operations
pub type Result<T> = core::result::Result<T, DriverError>;

/// Driver-level errors
///
/// `Busy` is the only retryable variant: an equivalent or conflicting
/// operation is already outstanding on the peripheral and the caller may
/// simply try again later. Everything else is either a caller bug
/// (`InvalidParam`, `InvalidLength`, `InvalidInstance`), an ownership
/// violation (`InvalidState`), a capacity limit (`NoMemory`), or the
/// outcome of an asynchronous operation that failed after being accepted
/// (`StoreError`, `EraseError`, `Internal`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverError {
    /// A conflicting operation is outstanding; retry later
    Busy,
    /// Bad address, length or buffer; rejected before any side effect
    InvalidParam,
    /// Operation attempted against a resource the caller does not own
    InvalidState,
    /// Instance id is 0 or otherwise unconfigured
    InvalidInstance,
    /// Backend or configuration failure
    Internal,
    /// Queue or slot table is full
    NoMemory,
    /// Payload or transfer exceeds a fixed capacity
    InvalidLength,
    /// A store completed but the data did not durably apply
    StoreError,
    /// An erase completed but the backend reported failure
    EraseError,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Busy => write!(f, "peripheral busy"),
            DriverError::InvalidParam => write!(f, "invalid parameter"),
            DriverError::InvalidState => write!(f, "invalid state for operation"),
            DriverError::InvalidInstance => write!(f, "instance not configured"),
            DriverError::Internal => write!(f, "backend failure"),
            DriverError::NoMemory => write!(f, "out of queue memory"),
            DriverError::InvalidLength => write!(f, "length exceeds capacity"),
            DriverError::StoreError => write!(f, "store did not apply"),
            DriverError::EraseError => write!(f, "erase failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(DriverError::Busy.to_string(), "peripheral busy");
        assert_eq!(DriverError::StoreError.to_string(), "store did not apply");
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(DriverError::Busy, DriverError::Busy);
        assert_ne!(DriverError::Busy, DriverError::InvalidParam);
    }
}
