//! Mock flash controller for host tests
//!
//! Simulates an on-chip flash array in memory. Supports:
//! - Lock bit enforcement (program/erase rejected while locked)
//! - Erased state of 0xFF; programming can only clear bits
//! - Per-address program failure injection and erase failure
//! - Lock/unlock counters for session discipline checks
//!
//! # Example
//!
//! ```ignore
//! use termio_shared::mock::MockFlash;
//! use termio_shared::nvm::FlashController;
//!
//! let mut flash = MockFlash::new(0x0800_0000, 256);
//! flash.unlock();
//! flash.erase(0x0800_0000, 16).unwrap();
//! flash.program_byte(0x0800_0000, 0x5A).unwrap();
//! flash.lock();
//!
//! let mut buf = [0u8; 2];
//! flash.read(0x0800_0000, &mut buf).unwrap();
//! assert_eq!(buf, [0x5A, 0xFF]);
//! ```

use std::collections::BTreeSet;
use std::vec::Vec;

use crate::nvm::{FlashController, FlashError};

/// In-memory flash array
#[derive(Debug, Clone)]
pub struct MockFlash {
    base: u32,
    storage: Vec<u8>,
    locked: bool,
    unlock_count: u32,
    lock_count: u32,
    failing: BTreeSet<u32>,
    erase_fails: bool,
}

impl MockFlash {
    /// Create an erased, locked array of `size` bytes mapped at `base`
    pub fn new(base: u32, size: usize) -> Self {
        Self {
            base,
            storage: vec![0xFF; size],
            locked: true,
            unlock_count: 0,
            lock_count: 0,
            failing: BTreeSet::new(),
            erase_fails: false,
        }
    }

    /// Make every future program attempt at `address` fail
    pub fn fail_program_at(&mut self, address: u32) {
        self.failing.insert(address);
    }

    /// Make every erase fail while `fail` is set
    pub fn fail_erase(&mut self, fail: bool) {
        self.erase_fails = fail;
    }

    /// Number of unlock calls so far
    pub fn unlock_count(&self) -> u32 {
        self.unlock_count
    }

    /// Number of lock calls so far
    pub fn lock_count(&self) -> u32 {
        self.lock_count
    }

    /// Copy of `len` bytes at `address` (for test verification)
    pub fn contents(&self, address: u32, len: usize) -> Vec<u8> {
        match self.range(address, len) {
            Ok(range) => self.storage[range].to_vec(),
            Err(_) => Vec::new(),
        }
    }

    fn range(&self, address: u32, len: usize) -> Result<core::ops::Range<usize>, FlashError> {
        let start = address
            .checked_sub(self.base)
            .ok_or(FlashError::InvalidAddress)? as usize;
        let end = start.checked_add(len).ok_or(FlashError::InvalidAddress)?;
        if end > self.storage.len() {
            return Err(FlashError::InvalidAddress);
        }
        Ok(start..end)
    }
}

impl FlashController for MockFlash {
    fn wait_for_last_operation(&mut self, _timeout_ms: u32) -> Result<(), FlashError> {
        // Operations complete synchronously
        Ok(())
    }

    fn unlock(&mut self) {
        self.unlock_count += 1;
        self.locked = false;
    }

    fn lock(&mut self) {
        self.lock_count += 1;
        self.locked = true;
    }

    fn is_locked(&self) -> bool {
        self.locked
    }

    fn erase(&mut self, address: u32, len: u32) -> Result<(), FlashError> {
        if self.locked {
            return Err(FlashError::Locked);
        }
        if self.erase_fails {
            return Err(FlashError::EraseFailed);
        }
        let range = self.range(address, len as usize)?;
        self.storage[range].fill(0xFF);
        Ok(())
    }

    fn program_byte(&mut self, address: u32, value: u8) -> Result<(), FlashError> {
        if self.locked {
            return Err(FlashError::Locked);
        }
        if self.failing.contains(&address) {
            return Err(FlashError::ProgramFailed);
        }
        let range = self.range(address, 1)?;
        // Programming can only change bits from 1 to 0
        self.storage[range.start] &= value;
        Ok(())
    }

    fn read(&self, address: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        let range = self.range(address, buf.len())?;
        buf.copy_from_slice(&self.storage[range]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_erased_and_locked() {
        let flash = MockFlash::new(0x1000, 32);
        assert!(flash.is_locked());
        assert!(flash.contents(0x1000, 32).iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_program_only_clears_bits() {
        let mut flash = MockFlash::new(0x1000, 32);
        flash.unlock();
        flash.program_byte(0x1000, 0x0F).unwrap();
        flash.program_byte(0x1000, 0xFF).unwrap();
        assert_eq!(flash.contents(0x1000, 1), [0x0F]);
    }

    #[test]
    fn test_locked_rejects_erase() {
        let mut flash = MockFlash::new(0x1000, 32);
        assert_eq!(flash.erase(0x1000, 4), Err(FlashError::Locked));
    }

    #[test]
    fn test_out_of_range() {
        let mut flash = MockFlash::new(0x1000, 32);
        flash.unlock();
        assert_eq!(flash.program_byte(0x0FFF, 0), Err(FlashError::InvalidAddress));
        assert_eq!(flash.erase(0x1010, 32), Err(FlashError::InvalidAddress));
        let mut buf = [0u8; 4];
        assert_eq!(flash.read(0x101E, &mut buf), Err(FlashError::InvalidAddress));
    }
}
