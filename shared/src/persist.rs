//! # Persisted Variable Codec
//!
//! Stores `serde` values in a flash region through the four-phase
//! [`NvmSequencer`] protocol. Each record is a little-endian length prefix
//! followed by the `postcard` encoding:
//!
//! ```text
//! ┌─────────┬──────────────────────────┬──────────────┐
//! │ len: u16│  postcard payload (len)  │ 0xFF erased… │
//! └─────────┴──────────────────────────┴──────────────┘
//! ```
//!
//! An erased prefix (`0xFFFF`) marks an empty slot.

use serde::{de::DeserializeOwned, Serialize};

use crate::nvm::{FlashController, FlashError, NvmSequencer};

/// Size of the record length prefix
pub const RECORD_HEADER_LEN: usize = 2;

const ERASED_HEADER: u16 = 0xFFFF;

/// Errors while saving or loading a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// Value does not fit in the encode buffer
    Encode,
    /// Stored bytes are not a valid encoding of the type
    Decode,
    /// Record extends past the end of the backing region
    OutOfRegion,
    /// Slot has never been written since the last erase
    Empty,
    /// Flash erase or read failed
    Flash(FlashError),
}

impl From<FlashError> for CodecError {
    fn from(e: FlashError) -> Self {
        CodecError::Flash(e)
    }
}

impl From<postcard::Error> for CodecError {
    fn from(e: postcard::Error) -> Self {
        match e {
            postcard::Error::SerializeBufferFull => CodecError::Encode,
            _ => CodecError::Decode,
        }
    }
}

/// Outcome of a persisted write: how much was asked for and how much stuck
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WriteOutcome {
    pub requested: u32,
    pub written: u32,
}

impl WriteOutcome {
    /// True when every requested byte was programmed
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.written == self.requested
    }

    /// Bytes the hardware refused
    #[inline]
    pub fn shortfall(&self) -> u32 {
        self.requested - self.written
    }
}

/// Flash window reserved for persisted variables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PersistRegion {
    pub base: u32,
    pub size: u32,
}

impl PersistRegion {
    pub const fn new(base: u32, size: u32) -> Self {
        Self { base, size }
    }

    /// Absolute address of `offset`, if `len` bytes from there fit the region
    pub fn address(&self, offset: u32, len: usize) -> Result<u32, CodecError> {
        let end = (offset as u64) + (len as u64);
        if end > self.size as u64 {
            return Err(CodecError::OutOfRegion);
        }
        Ok(self.base + offset)
    }

    /// Whether `[address, address + len)` lies inside the region
    pub fn contains(&self, address: u32, len: usize) -> bool {
        address >= self.base
            && (address as u64 + len as u64) <= (self.base as u64 + self.size as u64)
    }

    /// Encode `value` and write it as a record at `offset`.
    ///
    /// The record span is cleared first, then written as one session:
    /// header with `start_write`, payload with `write`, closed by
    /// `end_write`. `N` bounds the encoded payload size. Nothing is
    /// programmed if the erase fails.
    pub fn save<F, T, const N: usize>(
        &self,
        seq: &mut NvmSequencer<F>,
        offset: u32,
        value: &T,
    ) -> Result<WriteOutcome, CodecError>
    where
        F: FlashController,
        T: Serialize,
    {
        let mut buf = [0u8; N];
        let payload = postcard::to_slice(value, &mut buf)?;
        let record_len = RECORD_HEADER_LEN + payload.len();
        let address = self.address(offset, record_len)?;
        let header = (payload.len() as u16).to_le_bytes();

        if seq.clear(address, record_len as u32) < record_len as u32 {
            return Err(CodecError::Flash(FlashError::EraseFailed));
        }
        let (mut written, mut session) = seq.start_write(address, &header);
        let payload_at = session.cursor();
        written += seq.write(&mut session, payload_at, payload);
        let end_at = session.cursor();
        written += seq.end_write(&mut session, end_at, &[]);

        Ok(WriteOutcome {
            requested: record_len as u32,
            written,
        })
    }

    /// Read and decode the record stored at `offset`
    pub fn load<F, T, const N: usize>(
        &self,
        seq: &NvmSequencer<F>,
        offset: u32,
    ) -> Result<T, CodecError>
    where
        F: FlashController,
        T: DeserializeOwned,
    {
        let address = self.address(offset, RECORD_HEADER_LEN)?;
        let mut header = [0u8; RECORD_HEADER_LEN];
        seq.read(address, &mut header)?;

        let len = u16::from_le_bytes(header);
        if len == ERASED_HEADER {
            return Err(CodecError::Empty);
        }
        let len = len as usize;
        if len > N {
            return Err(CodecError::Decode);
        }
        let payload_at = self.address(offset + RECORD_HEADER_LEN as u32, len)?;

        let mut buf = [0u8; N];
        seq.read(payload_at, &mut buf[..len])?;
        Ok(postcard::from_bytes(&buf[..len])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockFlash;
    use serde::Deserialize;

    const BASE: u32 = 0x0800_C000;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct MotorParams {
        pole_pairs: u8,
        phase_resistance: f32,
        max_current: u16,
    }

    fn setup() -> (PersistRegion, NvmSequencer<MockFlash>) {
        (
            PersistRegion::new(BASE, 256),
            NvmSequencer::new(MockFlash::new(BASE, 256)),
        )
    }

    #[test]
    fn test_save_then_load() {
        let (region, mut seq) = setup();
        let params = MotorParams {
            pole_pairs: 7,
            phase_resistance: 0.042,
            max_current: 120,
        };

        let outcome = region.save::<_, _, 32>(&mut seq, 16, &params).unwrap();
        assert!(outcome.is_complete());
        assert!(!seq.is_unlocked());

        let loaded: MotorParams = region.load::<_, _, 32>(&seq, 16).unwrap();
        assert_eq!(loaded, params);
    }

    #[test]
    fn test_load_erased_slot_is_empty() {
        let (region, seq) = setup();
        let result: Result<u32, _> = region.load::<_, _, 8>(&seq, 0);
        assert_eq!(result, Err(CodecError::Empty));
    }

    #[test]
    fn test_save_reports_short_write() {
        let (region, mut seq) = setup();
        seq.flash_mut().fail_program_at(BASE + 2);

        let outcome = region.save::<_, _, 8>(&mut seq, 0, &0xABCDu16).unwrap();
        assert!(!outcome.is_complete());
        assert_eq!(outcome.shortfall(), 1);
        assert!(!seq.is_unlocked());
    }

    #[test]
    fn test_save_aborts_when_erase_fails() {
        let (region, mut seq) = setup();
        region.save::<_, _, 8>(&mut seq, 0, &0x0Fu8).unwrap();
        seq.flash_mut().fail_erase(true);

        let result = region.save::<_, _, 8>(&mut seq, 0, &0xF0u8);
        assert_eq!(result, Err(CodecError::Flash(FlashError::EraseFailed)));
        assert!(!seq.is_unlocked());

        // Old record untouched rather than ANDed with the new one
        let loaded: u8 = region.load::<_, _, 8>(&seq, 0).unwrap();
        assert_eq!(loaded, 0x0F);
    }

    #[test]
    fn test_save_past_region_end() {
        let (region, mut seq) = setup();
        let result = region.save::<_, _, 8>(&mut seq, 255, &1u32);
        assert_eq!(result, Err(CodecError::OutOfRegion));
    }

    #[test]
    fn test_encode_buffer_too_small() {
        let (region, mut seq) = setup();
        let result = region.save::<_, _, 2>(&mut seq, 0, &[1u8, 2, 3, 4]);
        assert_eq!(result, Err(CodecError::Encode));
    }

    #[test]
    fn test_contains() {
        let region = PersistRegion::new(BASE, 256);
        assert!(region.contains(BASE, 256));
        assert!(!region.contains(BASE + 1, 256));
        assert!(!region.contains(BASE - 1, 1));
    }
}
