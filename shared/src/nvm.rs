//! # Non-Volatile Write Sequencer
//!
//! Programs on-chip flash through the unlock / program / lock discipline
//! of the flash interface. A persisted write is a four-phase sequence:
//!
//! ```text
//! clear(region) ─► start_write(addr, bytes) ─► write(addr, bytes)* ─► end_write(addr, bytes)
//!  unlock+erase      unlock, program            program only           program, lock
//!  +lock             (left UNLOCKED)                                   (session closed)
//! ```
//!
//! The interface is unlocked for the whole interval from the start of
//! `start_write` to the end of `end_write`, and locked at every other
//! time. Instead of treating the hardware lock bit as the session state,
//! `start_write` hands back a [`WriteSession`] that the caller threads
//! through `write` and `end_write`.
//!
//! ## Failure policy
//!
//! A byte the hardware refuses to program is skipped and not counted.
//! Callers compare the returned count with the requested length to detect
//! a partial write. Nothing is rolled back.
//!
//! Erase-before-write is the caller's responsibility: bits can only be
//! cleared by programming, so programming into a region not erased by
//! `clear` yields the AND of old and new contents.

/// Default wait for a pending flash operation
pub const FLASH_TIMEOUT_MS: u32 = 500;

/// Errors reported by a flash controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// Program or erase attempted while the interface is locked
    Locked,
    /// Previous operation did not finish in time
    Timeout,
    /// Address range outside the flash array
    InvalidAddress,
    /// The cell did not accept the programmed value
    ProgramFailed,
    /// Sector erase failed
    EraseFailed,
}

/// Low-level flash program interface.
///
/// Mirrors the register-level controller: a lock bit gating program and
/// erase, a busy flag, and byte-granular programming.
pub trait FlashController {
    /// Block until the previous operation completes or `timeout_ms` expires
    fn wait_for_last_operation(&mut self, timeout_ms: u32) -> Result<(), FlashError>;

    /// Enable programming and erasing
    fn unlock(&mut self);

    /// Disable programming and erasing
    fn lock(&mut self);

    /// Current state of the program-enable lock
    fn is_locked(&self) -> bool;

    /// Erase `[address, address + len)` back to all-ones
    fn erase(&mut self, address: u32, len: u32) -> Result<(), FlashError>;

    /// Program one byte (smallest programmable unit)
    fn program_byte(&mut self, address: u32, value: u8) -> Result<(), FlashError>;

    /// Read `buf.len()` bytes starting at `address`
    fn read(&self, address: u32, buf: &mut [u8]) -> Result<(), FlashError>;
}

#[cfg(feature = "std")]
impl<F: FlashController + ?Sized> FlashController for std::boxed::Box<F> {
    fn wait_for_last_operation(&mut self, timeout_ms: u32) -> Result<(), FlashError> {
        (**self).wait_for_last_operation(timeout_ms)
    }

    fn unlock(&mut self) {
        (**self).unlock()
    }

    fn lock(&mut self) {
        (**self).lock()
    }

    fn is_locked(&self) -> bool {
        (**self).is_locked()
    }

    fn erase(&mut self, address: u32, len: u32) -> Result<(), FlashError> {
        (**self).erase(address, len)
    }

    fn program_byte(&mut self, address: u32, value: u8) -> Result<(), FlashError> {
        (**self).program_byte(address, value)
    }

    fn read(&self, address: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        (**self).read(address, buf)
    }
}

/// An open multi-call write, returned by [`NvmSequencer::start_write`].
///
/// Not `Clone`: exactly one owner may extend and close a session.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[must_use = "an unfinished session leaves the flash interface unlocked"]
pub struct WriteSession {
    cursor: u32,
    open: bool,
}

impl WriteSession {
    /// A session that was never opened; every write on it is a no-op
    pub const fn closed(at: u32) -> Self {
        Self {
            cursor: at,
            open: false,
        }
    }

    /// Address following the last byte handed to the session
    #[inline]
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Whether the session still accepts writes
    #[inline]
    pub fn is_open(&self) -> bool {
        self.open
    }
}

/// Four-phase flash write sequencer over a [`FlashController`].
///
/// Does not serialize concurrent callers: only one persisted write may be
/// in flight at a time, which the owner enforces.
#[derive(Debug)]
pub struct NvmSequencer<F> {
    flash: F,
    timeout_ms: u32,
}

impl<F: FlashController> NvmSequencer<F> {
    /// Wrap a flash controller with the default operation timeout
    pub fn new(flash: F) -> Self {
        Self::with_timeout(flash, FLASH_TIMEOUT_MS)
    }

    /// Wrap a flash controller with a custom operation timeout
    pub fn with_timeout(flash: F, timeout_ms: u32) -> Self {
        Self { flash, timeout_ms }
    }

    /// Erase `[address, address + len)`.
    ///
    /// Self-contained: the interface is locked again on return. Returns
    /// `len` on success and 0 if the erase was rejected.
    pub fn clear(&mut self, address: u32, len: u32) -> u32 {
        let _ = self.flash.wait_for_last_operation(self.timeout_ms);
        self.flash.unlock();
        let _ = self.flash.wait_for_last_operation(self.timeout_ms);
        let erased = self.flash.erase(address, len);
        self.flash.lock();
        let _ = self.flash.wait_for_last_operation(self.timeout_ms);

        match erased {
            Ok(()) => len,
            Err(_) => 0,
        }
    }

    /// Unlock the interface, program `data` at `address` and open a session.
    ///
    /// The interface stays unlocked until [`end_write`](Self::end_write).
    pub fn start_write(&mut self, address: u32, data: &[u8]) -> (u32, WriteSession) {
        let _ = self.flash.wait_for_last_operation(self.timeout_ms);
        self.flash.unlock();
        let _ = self.flash.wait_for_last_operation(self.timeout_ms);

        let mut session = WriteSession {
            cursor: address,
            open: true,
        };
        let written = self.program(&mut session, address, data);
        (written, session)
    }

    /// Program more bytes into an open session without touching the lock.
    ///
    /// A closed session is a no-op returning 0.
    pub fn write(&mut self, session: &mut WriteSession, address: u32, data: &[u8]) -> u32 {
        if !session.open {
            return 0;
        }
        self.program(session, address, data)
    }

    /// Program the final bytes, relock and close the session.
    ///
    /// A closed session is a no-op returning 0.
    pub fn end_write(&mut self, session: &mut WriteSession, address: u32, data: &[u8]) -> u32 {
        if !session.open {
            return 0;
        }
        let written = self.program(session, address, data);
        let _ = self.flash.wait_for_last_operation(self.timeout_ms);
        self.flash.lock();
        let _ = self.flash.wait_for_last_operation(self.timeout_ms);
        session.open = false;
        written
    }

    /// Read back `buf.len()` bytes from `address`
    pub fn read(&self, address: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.flash.read(address, buf)
    }

    /// Whether the program interface is currently unlocked
    #[inline]
    pub fn is_unlocked(&self) -> bool {
        !self.flash.is_locked()
    }

    /// Borrow the underlying controller
    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Mutably borrow the underlying controller
    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Release the underlying controller
    pub fn into_inner(self) -> F {
        self.flash
    }

    fn program(&mut self, session: &mut WriteSession, address: u32, data: &[u8]) -> u32 {
        let mut written = 0;
        let mut target = address;
        for &byte in data {
            if self.flash.program_byte(target, byte).is_ok() {
                written += 1;
            }
            target = target.wrapping_add(1);
        }
        session.cursor = target;
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockFlash;

    const BASE: u32 = 0x0800_0000;

    fn sequencer() -> NvmSequencer<MockFlash> {
        NvmSequencer::new(MockFlash::new(BASE, 1024))
    }

    #[test]
    fn test_clear_start_end_reads_back() {
        let mut seq = sequencer();

        assert_eq!(seq.clear(BASE, 128), 128);
        assert!(!seq.is_unlocked());

        let (written, mut session) = seq.start_write(BASE, &[0xAA]);
        assert_eq!(written, 1);
        assert!(seq.is_unlocked());

        assert_eq!(seq.end_write(&mut session, BASE + 1, &[0xBB, 0xCC]), 2);
        assert!(!seq.is_unlocked());
        assert!(!session.is_open());

        let mut buf = [0u8; 8];
        seq.read(BASE, &mut buf).unwrap();
        assert_eq!(buf, [0xAA, 0xBB, 0xCC, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_write_extends_session_without_relocking() {
        let mut seq = sequencer();
        seq.clear(BASE, 64);

        let (_, mut session) = seq.start_write(BASE, &[1, 2]);
        let unlocks = seq.flash().unlock_count();
        let cursor = session.cursor();
        assert_eq!(seq.write(&mut session, cursor, &[3, 4]), 2);
        assert_eq!(seq.flash().unlock_count(), unlocks);
        assert!(seq.is_unlocked());
        assert_eq!(session.cursor(), BASE + 4);

        seq.end_write(&mut session, BASE + 4, &[5]);
        let mut buf = [0u8; 5];
        seq.read(BASE, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_closed_session_is_noop() {
        let mut seq = sequencer();
        seq.clear(BASE, 64);

        let (_, mut session) = seq.start_write(BASE, &[0x11]);
        seq.end_write(&mut session, BASE + 1, &[]);

        assert_eq!(seq.write(&mut session, BASE + 1, &[0x22]), 0);
        assert_eq!(seq.end_write(&mut session, BASE + 1, &[0x22]), 0);
        assert!(!seq.is_unlocked());

        let mut buf = [0u8; 2];
        seq.read(BASE, &mut buf).unwrap();
        assert_eq!(buf, [0x11, 0xFF]);
    }

    #[test]
    fn test_failed_bytes_are_skipped_not_counted() {
        let mut seq = sequencer();
        seq.clear(BASE, 64);
        seq.flash_mut().fail_program_at(BASE + 1);

        let (written, mut session) = seq.start_write(BASE, &[0x01, 0x02, 0x03]);
        assert_eq!(written, 2);
        seq.end_write(&mut session, BASE + 3, &[]);

        let mut buf = [0u8; 3];
        seq.read(BASE, &mut buf).unwrap();
        assert_eq!(buf, [0x01, 0xFF, 0x03]);
    }

    #[test]
    fn test_program_without_session_is_rejected_by_lock() {
        let mut seq = sequencer();
        seq.clear(BASE, 16);
        assert_eq!(
            seq.flash_mut().program_byte(BASE, 0x00),
            Err(FlashError::Locked)
        );
    }

    #[test]
    fn test_clear_rejected_reports_zero_and_relocks() {
        let mut seq = sequencer();
        assert_eq!(seq.clear(BASE + 2048, 16), 0);
        assert!(!seq.is_unlocked());
    }
}
