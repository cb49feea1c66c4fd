//! Errors reported across the hardware abstraction boundary
//!
//! None of these are fatal to the boundary itself. The caller decides
//! whether a failure escalates into a safety event.

/// Hardware abstraction error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HalError {
    /// Transaction did not complete within its timeout
    Timeout,
    /// Argument rejected before touching hardware (length mismatch, bad id)
    InvalidParameter,
    /// Device reported it is not ready to accept the transaction
    NotReady,
    /// Bus-level failure (mode fault, overrun, framing)
    Bus,
}

impl HalError {
    /// Transient errors are worth retrying on the next period
    pub fn is_transient(&self) -> bool {
        matches!(self, HalError::Timeout | HalError::NotReady | HalError::Bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parameter_not_transient() {
        assert!(HalError::Timeout.is_transient());
        assert!(HalError::NotReady.is_transient());
        assert!(HalError::Bus.is_transient());
        assert!(!HalError::InvalidParameter.is_transient());
    }
}
