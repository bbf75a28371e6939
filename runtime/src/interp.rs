//! Interfaces to the external command interpreter
//!
//! The interpreter is consumed through two seams: a byte feed, called with
//! the processing lock held, and a registration step that hands it a
//! flash-backed [`PersistedStore`]. One interpreter instance may be shared
//! by several ports; the lock around it is the processing-exclusivity
//! primitive, so feeds from different ports never interleave.

use std::sync::{Arc, Mutex, MutexGuard};

use log::warn;
use serde::{de::DeserializeOwned, Serialize};
use termio_shared::{
    CodecError, FlashController, FlashError, NvmSequencer, PersistRegion, WriteOutcome,
    WriteSession,
};
use tokio::sync::OwnedMutexGuard;

use crate::output::OutputWriter;

/// A command interpreter fed by one or more ports
pub trait Interpreter: Send {
    /// Consume received bytes: one byte from a stream port, or one whole
    /// frame from a CAN port. Responses go to `out`.
    fn feed(&mut self, bytes: &[u8], out: &mut OutputWriter);

    /// Install the persistence backend for registered variables
    fn register_persisted_store(&mut self, store: PersistedStore) {
        let _ = store;
    }
}

/// Shared interpreter instance; its lock is the processing lock
pub type InterpreterHandle = Arc<tokio::sync::Mutex<dyn Interpreter>>;

/// Processing lock held around one feed
pub type ProcessingGuard = OwnedMutexGuard<dyn Interpreter>;

/// Wrap an interpreter so ports can share it
pub fn share<I: Interpreter + 'static>(interpreter: I) -> InterpreterHandle {
    Arc::new(tokio::sync::Mutex::new(interpreter))
}

/// Take the processing lock on `handle`; released when the guard drops
pub async fn acquire_processing(handle: &InterpreterHandle) -> ProcessingGuard {
    handle.clone().lock_owned().await
}

/// Creates or looks up the interpreter a starting port feeds
pub trait InterpreterLayer: Send + Sync {
    /// `name` is the port's terminal name ("uart", "usb" or "CAN").
    /// Returning `None` aborts the port's start.
    fn create_handle(&self, name: &'static str) -> Option<InterpreterHandle>;
}

impl<F> InterpreterLayer for F
where
    F: Fn(&'static str) -> Option<InterpreterHandle> + Send + Sync,
{
    fn create_handle(&self, name: &'static str) -> Option<InterpreterHandle> {
        self(name)
    }
}

type SharedSequencer = Arc<Mutex<NvmSequencer<Box<dyn FlashController + Send>>>>;

/// Flash-backed storage handed to the interpreter for persisted variables.
///
/// Clones share one sequencer. Raw operations outside the backing region
/// act on nothing and report 0 bytes; such a `start_write` leaves the
/// flash locked.
#[derive(Clone)]
pub struct PersistedStore {
    region: PersistRegion,
    sequencer: SharedSequencer,
}

impl PersistedStore {
    pub fn new<F>(region: PersistRegion, flash: F) -> Self
    where
        F: FlashController + Send + 'static,
    {
        let flash: Box<dyn FlashController + Send> = Box::new(flash);
        Self::with_sequencer(region, NvmSequencer::new(flash))
    }

    pub fn with_sequencer(
        region: PersistRegion,
        sequencer: NvmSequencer<Box<dyn FlashController + Send>>,
    ) -> Self {
        Self {
            region,
            sequencer: Arc::new(Mutex::new(sequencer)),
        }
    }

    /// Backing region base address
    #[inline]
    pub fn base(&self) -> u32 {
        self.region.base
    }

    /// Backing region size in bytes
    #[inline]
    pub fn size(&self) -> u32 {
        self.region.size
    }

    pub fn clear(&self, address: u32, len: u32) -> u32 {
        if !self.region.contains(address, len as usize) {
            warn!("flash clear {:#010x}+{} outside store", address, len);
            return 0;
        }
        self.lock().clear(address, len)
    }

    /// Open a write session. Outside the region the flash stays locked
    /// and the returned session is already closed.
    pub fn start_write(&self, address: u32, data: &[u8]) -> (u32, WriteSession) {
        if !self.region.contains(address, data.len()) {
            warn!("flash write {:#010x}+{} outside store", address, data.len());
            return (0, WriteSession::closed(address));
        }
        self.lock().start_write(address, data)
    }

    pub fn write(&self, session: &mut WriteSession, address: u32, data: &[u8]) -> u32 {
        if !self.region.contains(address, data.len()) {
            warn!("flash write {:#010x}+{} outside store", address, data.len());
            return 0;
        }
        self.lock().write(session, address, data)
    }

    pub fn end_write(&self, session: &mut WriteSession, address: u32, data: &[u8]) -> u32 {
        let mut seq = self.lock();
        if self.region.contains(address, data.len()) {
            seq.end_write(session, address, data)
        } else {
            warn!("flash write {:#010x}+{} outside store", address, data.len());
            seq.end_write(session, address, &[])
        }
    }

    pub fn read(&self, address: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        if !self.region.contains(address, buf.len()) {
            return Err(FlashError::InvalidAddress);
        }
        self.lock().read(address, buf)
    }

    /// Whether a write session currently holds the flash unlocked
    pub fn is_unlocked(&self) -> bool {
        self.lock().is_unlocked()
    }

    /// Encode `value` and store it as a record at `offset` into the region
    pub fn save<T: Serialize, const N: usize>(
        &self,
        offset: u32,
        value: &T,
    ) -> Result<WriteOutcome, CodecError> {
        let mut seq = self.lock();
        let outcome = self.region.save::<_, T, N>(&mut *seq, offset, value)?;
        if !outcome.is_complete() {
            warn!(
                "persisted write at +{} short by {} bytes",
                offset,
                outcome.shortfall()
            );
        }
        Ok(outcome)
    }

    /// Decode the record stored at `offset` into the region
    pub fn load<T: DeserializeOwned, const N: usize>(&self, offset: u32) -> Result<T, CodecError> {
        let seq = self.lock();
        self.region.load::<_, T, N>(&*seq, offset)
    }

    fn lock(&self) -> MutexGuard<'_, NvmSequencer<Box<dyn FlashController + Send>>> {
        match self.sequencer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl core::fmt::Debug for PersistedStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PersistedStore")
            .field("region", &self.region)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use termio_shared::mock::MockFlash;

    const BASE: u32 = 0x0800_0000;

    fn store() -> PersistedStore {
        PersistedStore::new(PersistRegion::new(BASE, 1024), MockFlash::new(BASE, 1024))
    }

    #[test]
    fn test_four_phase_write_reads_back() {
        let store = store();
        assert_eq!(store.clear(BASE, 128), 128);

        let (written, mut session) = store.start_write(BASE, &[0xAA]);
        assert_eq!(written, 1);
        assert!(store.is_unlocked());

        assert_eq!(store.end_write(&mut session, BASE + 1, &[0xBB, 0xCC]), 2);
        assert!(!store.is_unlocked());

        let mut buf = [0u8; 5];
        store.read(BASE, &mut buf).unwrap();
        assert_eq!(buf, [0xAA, 0xBB, 0xCC, 0xFF, 0xFF]);
    }

    #[test]
    fn test_outside_region_is_noop() {
        let store = store();
        assert_eq!(store.clear(BASE + 1020, 8), 0);

        let (written, mut session) = store.start_write(BASE - 4, &[1, 2]);
        assert_eq!(written, 0);
        assert!(!session.is_open());
        assert!(!store.is_unlocked());
        assert_eq!(store.write(&mut session, BASE, &[3]), 0);
        assert_eq!(store.end_write(&mut session, BASE, &[]), 0);
        assert!(!store.is_unlocked());

        let mut buf = [0u8; 4];
        assert_eq!(
            store.read(BASE + 1022, &mut buf),
            Err(FlashError::InvalidAddress)
        );
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Limits {
        max_rpm: u32,
        brake: bool,
    }

    #[test]
    fn test_save_load_through_clones() {
        let store = store();
        let other = store.clone();
        let limits = Limits {
            max_rpm: 9000,
            brake: true,
        };

        let outcome = store.save::<_, 16>(64, &limits).unwrap();
        assert!(outcome.is_complete());
        assert_eq!(other.load::<Limits, 16>(64).unwrap(), limits);
        assert_eq!(other.load::<Limits, 16>(0), Err(CodecError::Empty));
    }
}
