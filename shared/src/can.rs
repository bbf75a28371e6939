//! # CAN Framing for the Terminal Channel
//!
//! The terminal runs over classic CAN under a single fixed standard
//! identifier. Outbound text is cut into frames of at most 8 bytes;
//! inbound frames are handed to the interpreter whole.
//!
//! ```text
//! payload (20 bytes)
//! ┌────────────────┬────────────────┬────────┐
//! │ frame 0: 8 B   │ frame 1: 8 B   │ 2: 4 B │   all under CLI_CAN_ID
//! └────────────────┴────────────────┴────────┘
//! ```

use heapless::Vec;

/// Maximum data length of a classic CAN frame
pub const CLASSIC_MTU: usize = 8;

/// Identifier used by the terminal channel in both directions
pub const CLI_CAN_ID: StandardId = StandardId::new_const(0x01);

/// Errors while building frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Identifier does not fit in 11 bits
    InvalidId,
    /// More than 8 data bytes
    TooLong,
}

/// 11-bit standard CAN identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StandardId(u16);

impl StandardId {
    /// Largest valid standard identifier
    pub const MAX: u16 = 0x7FF;

    /// Create an identifier, rejecting values wider than 11 bits
    pub const fn new(raw: u16) -> Option<Self> {
        if raw <= Self::MAX {
            Some(Self(raw))
        } else {
            None
        }
    }

    const fn new_const(raw: u16) -> Self {
        assert!(raw <= Self::MAX);
        Self(raw)
    }

    /// Raw identifier value
    #[inline]
    pub const fn as_raw(&self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for StandardId {
    type Error = FrameError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(FrameError::InvalidId)
    }
}

/// Classic CAN data frame with a standard identifier
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanFrame {
    id: StandardId,
    data: Vec<u8, CLASSIC_MTU>,
}

impl CanFrame {
    /// Build a frame carrying `data` (0..=8 bytes)
    pub fn new(id: StandardId, data: &[u8]) -> Result<Self, FrameError> {
        let data = Vec::from_slice(data).map_err(|_| FrameError::TooLong)?;
        Ok(Self { id, data })
    }

    /// Frame identifier
    #[inline]
    pub fn id(&self) -> StandardId {
        self.id
    }

    /// Data bytes (length equals the DLC)
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Data length code
    #[inline]
    pub fn dlc(&self) -> usize {
        self.data.len()
    }
}

/// Iterator cutting a payload into frames under one identifier
#[derive(Debug, Clone)]
pub struct Fragments<'a> {
    id: StandardId,
    chunks: core::slice::Chunks<'a, u8>,
}

impl Iterator for Fragments<'_> {
    type Item = CanFrame;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.chunks.next()?;
        // Chunks never exceed CLASSIC_MTU
        let data = Vec::from_slice(chunk).ok()?;
        Some(CanFrame { id: self.id, data })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for Fragments<'_> {}

/// Split `payload` into frames of at most [`CLASSIC_MTU`] bytes.
///
/// Order is preserved; only the final frame may be short. An empty
/// payload yields no frames.
pub fn fragment(id: StandardId, payload: &[u8]) -> Fragments<'_> {
    Fragments {
        id,
        chunks: payload.chunks(CLASSIC_MTU),
    }
}

/// Acceptance filter matching mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FilterMode {
    /// Accept when the masked identifier bits match
    IdMask,
    /// Accept when the identifier equals one of two listed values
    IdList,
}

/// Receive FIFO a filter routes accepted frames into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxFifo {
    Fifo0,
    Fifo1,
}

/// Hardware acceptance filter bank configuration (32-bit scale).
///
/// Registers follow the bxCAN layout where a standard identifier
/// occupies bits 31..21 of the 32-bit filter word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanFilter {
    pub bank: u8,
    pub mode: FilterMode,
    pub id: u32,
    pub mask: u32,
    pub fifo: RxFifo,
    pub active: bool,
    pub slave_start_bank: u8,
}

impl CanFilter {
    /// Bank 0, mask mode with an all-zero mask: every frame reaches FIFO 0.
    ///
    /// Identifier filtering for the terminal happens in software.
    pub const fn accept_all() -> Self {
        Self {
            bank: 0,
            mode: FilterMode::IdMask,
            id: 0,
            mask: 0,
            fifo: RxFifo::Fifo0,
            active: true,
            slave_start_bank: 14,
        }
    }

    /// Whether a frame with `id` passes this filter
    pub fn accepts(&self, id: StandardId) -> bool {
        if !self.active {
            return false;
        }
        let word = (id.as_raw() as u32) << 21;
        match self.mode {
            FilterMode::IdMask => (word ^ self.id) & self.mask == 0,
            FilterMode::IdList => word == self.id || word == self.mask,
        }
    }
}

impl Default for CanFilter {
    fn default() -> Self {
        Self::accept_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twenty_bytes_make_three_frames() {
        let payload: [u8; 20] = core::array::from_fn(|i| i as u8);
        let frames: std::vec::Vec<CanFrame> = fragment(CLI_CAN_ID, &payload).collect();

        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames.iter().map(CanFrame::dlc).collect::<std::vec::Vec<_>>(),
            [8, 8, 4]
        );
        assert!(frames.iter().all(|f| f.id() == CLI_CAN_ID));

        let rejoined: std::vec::Vec<u8> = frames.iter().flat_map(|f| f.data().to_vec()).collect();
        assert_eq!(rejoined, payload);
    }

    #[test]
    fn test_empty_payload_has_no_frames() {
        assert_eq!(fragment(CLI_CAN_ID, &[]).count(), 0);
    }

    #[test]
    fn test_exact_multiple_has_no_short_tail() {
        assert_eq!(fragment(CLI_CAN_ID, &[0u8; 16]).len(), 2);
    }

    #[test]
    fn test_frame_rejects_long_data() {
        assert_eq!(CanFrame::new(CLI_CAN_ID, &[0u8; 9]), Err(FrameError::TooLong));
    }

    #[test]
    fn test_standard_id_range() {
        assert!(StandardId::new(0x7FF).is_some());
        assert_eq!(StandardId::try_from(0x800), Err(FrameError::InvalidId));
    }

    #[test]
    fn test_filter_accept_all() {
        let filter = CanFilter::accept_all();
        assert!(filter.accepts(StandardId::new(0x123).unwrap()));
        assert!(filter.accepts(CLI_CAN_ID));
    }

    #[test]
    fn test_filter_exact_mask() {
        let filter = CanFilter {
            id: 0x42 << 21,
            mask: 0x7FF << 21,
            ..CanFilter::accept_all()
        };
        assert!(filter.accepts(StandardId::new(0x42).unwrap()));
        assert!(!filter.accepts(StandardId::new(0x43).unwrap()));
    }
}
