//! Process-wide fault state
//!
//! Hardware configuration failures during port bring-up have no recovery
//! path at the port layer. They are latched here for the supervisor,
//! which decides whether to halt or reset.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

/// Why the system entered the fault state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FaultCode {
    None = 0,
    /// CAN controller refused the acceptance filter
    CanFilterRejected = 1,
    /// CAN controller failed to leave initialization mode
    CanStartFailed = 2,
    /// Interpreter layer refused to create a handle
    InterpreterUnavailable = 3,
}

impl FaultCode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => FaultCode::CanFilterRejected,
            2 => FaultCode::CanStartFailed,
            3 => FaultCode::InterpreterUnavailable,
            _ => FaultCode::None,
        }
    }
}

/// Latched fault shared by every port task
#[derive(Debug, Default)]
pub struct FaultState {
    active: AtomicBool,
    code: AtomicU8,
    /// Extra detail, e.g. the filter bank
    data: AtomicU32,
    /// Faults raised since boot, never cleared
    count: AtomicU32,
}

impl FaultState {
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            code: AtomicU8::new(0),
            data: AtomicU32::new(0),
            count: AtomicU32::new(0),
        }
    }

    /// Latch `code`; the first fault wins until cleared
    pub fn raise(&self, code: FaultCode, data: u32) {
        self.count.fetch_add(1, Ordering::Relaxed);
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.code.store(code as u8, Ordering::Release);
            self.data.store(data, Ordering::Release);
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    #[inline]
    pub fn code(&self) -> FaultCode {
        FaultCode::from_u8(self.code.load(Ordering::Acquire))
    }

    #[inline]
    pub fn data(&self) -> u32 {
        self.data.load(Ordering::Acquire)
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Acknowledge the fault; the counter is kept
    pub fn clear(&self) {
        self.code.store(FaultCode::None as u8, Ordering::Release);
        self.active.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_fault_is_latched() {
        let fault = FaultState::new();
        assert!(!fault.is_active());

        fault.raise(FaultCode::CanFilterRejected, 0);
        fault.raise(FaultCode::InterpreterUnavailable, 7);

        assert!(fault.is_active());
        assert_eq!(fault.code(), FaultCode::CanFilterRejected);
        assert_eq!(fault.data(), 0);
        assert_eq!(fault.count(), 2);
    }

    #[test]
    fn test_clear_keeps_count() {
        let fault = FaultState::new();
        fault.raise(FaultCode::CanStartFailed, 1);
        fault.clear();
        assert!(!fault.is_active());
        assert_eq!(fault.code(), FaultCode::None);
        assert_eq!(fault.count(), 1);

        fault.raise(FaultCode::InterpreterUnavailable, 0);
        assert_eq!(fault.code(), FaultCode::InterpreterUnavailable);
    }
}
