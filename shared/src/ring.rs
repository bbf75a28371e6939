//! # Serial Receive Ring Cursor
//!
//! The serial receiver runs its DMA channel in circular mode over a
//! power-of-two sized buffer. The hardware never tells us where it is
//! writing; it only exposes the count of bytes *remaining* until the
//! channel wraps. The write cursor is derived from that counter:
//!
//! ```text
//! position = (capacity - remaining) & (capacity - 1)
//!
//! ┌──────────┬──────────────────────┬──────────────────────┐
//! │ consumed │   pending (unread)   │   not yet written    │
//! └──────────┴──────────────────────┴──────────────────────┘
//!            ▲                      ▲
//!         read cursor          write position
//! ```
//!
//! `remaining == capacity` (freshly reloaded channel) and `remaining == 0`
//! (about to reload) both map to position 0, which is why the mask is
//! applied instead of a plain subtraction.

/// Compute the DMA write position from the remaining-transfer counter.
///
/// `capacity` must be a non-zero power of two and `remaining` must lie in
/// `[0, capacity]`; the result always lies in `[0, capacity)`.
#[inline]
pub const fn dma_write_position(capacity: usize, remaining: usize) -> usize {
    capacity.wrapping_sub(remaining) & (capacity - 1)
}

/// Read cursor over a circular receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxCursor {
    position: usize,
    mask: usize,
}

impl RxCursor {
    /// Create a cursor at position 0.
    ///
    /// Returns `None` unless `capacity` is a non-zero power of two.
    pub const fn new(capacity: usize) -> Option<Self> {
        if !capacity.is_power_of_two() {
            return None;
        }
        Some(Self {
            position: 0,
            mask: capacity - 1,
        })
    }

    /// Ring capacity in bytes
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Index of the next byte to read
    #[inline]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Jump to `write_position`, discarding everything pending.
    ///
    /// Used at task start so bytes received before the task existed are
    /// not replayed into the interpreter.
    #[inline]
    pub fn sync_to(&mut self, write_position: usize) {
        self.position = write_position & self.mask;
    }

    /// Number of bytes between the cursor and `write_position`.
    #[inline]
    pub const fn pending(&self, write_position: usize) -> usize {
        write_position.wrapping_sub(self.position) & self.mask
    }

    /// Move past one consumed byte.
    #[inline]
    pub fn advance(&mut self) {
        self.position = (self.position + 1) & self.mask;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_position_stays_in_range() {
        for shift in 0..12 {
            let capacity = 1usize << shift;
            for remaining in 0..=capacity {
                let pos = dma_write_position(capacity, remaining);
                assert!(pos < capacity, "cap {capacity} rem {remaining} -> {pos}");
            }
        }
    }

    #[test]
    fn test_write_position_wrap_points() {
        assert_eq!(dma_write_position(64, 64), 0);
        assert_eq!(dma_write_position(64, 0), 0);
        assert_eq!(dma_write_position(64, 63), 1);
        assert_eq!(dma_write_position(64, 1), 63);
    }

    #[test]
    fn test_write_position_advances_as_counter_drains() {
        let capacity = 16;
        let mut last = dma_write_position(capacity, capacity);
        // Two full laps of the circular channel
        for step in 1..=(2 * capacity) {
            let remaining = capacity - (step % capacity);
            let pos = dma_write_position(capacity, remaining);
            assert_eq!(pos, (last + 1) % capacity);
            last = pos;
        }
    }

    #[test]
    fn test_cursor_rejects_non_power_of_two() {
        assert!(RxCursor::new(0).is_none());
        assert!(RxCursor::new(100).is_none());
        assert_eq!(RxCursor::new(128).map(|c| c.capacity()), Some(128));
    }

    #[test]
    fn test_cursor_pending_across_wrap() {
        let mut cursor = RxCursor::new(8).unwrap();
        cursor.sync_to(6);
        assert_eq!(cursor.pending(6), 0);
        assert_eq!(cursor.pending(1), 3);

        cursor.advance();
        cursor.advance();
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.pending(1), 1);
    }
}
