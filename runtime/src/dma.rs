//! # DMA Receive Ring
//!
//! Memory shared between the serial receiver's circular DMA channel and
//! the port's I/O task. The DMA side stores bytes and counts its transfer
//! counter down; the task side derives the write position from that
//! counter and reads the bytes behind it.
//!
//! ```text
//! ┌──────────────────────── capacity (power of 2) ────────────────────────┐
//! │ b0 │ b1 │ b2 │ ...                                        │ b(cap-1) │
//! └───────────────────────────────────────────────────────────────────────┘
//!              ▲ write position = (capacity - remaining) & (capacity - 1)
//! ```
//!
//! The ring is allocated when the task starts and shared with the
//! peripheral by `Arc`; it is freed when both sides have dropped it.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use termio_shared::dma_write_position;

/// Circular receive buffer written by a DMA channel
#[derive(Debug)]
pub struct DmaRing {
    slots: Box<[AtomicU8]>,
    /// Transfer counter: bytes left until the channel reloads
    remaining: AtomicUsize,
}

impl DmaRing {
    /// Allocate a ring; `capacity` must be a non-zero power of two
    pub fn new(capacity: usize) -> Option<Self> {
        if !capacity.is_power_of_two() {
            return None;
        }
        let slots = (0..capacity).map(|_| AtomicU8::new(0)).collect();
        Some(Self {
            slots,
            remaining: AtomicUsize::new(capacity),
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Current value of the DMA transfer counter
    #[inline]
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Position the DMA channel will write next
    #[inline]
    pub fn write_position(&self) -> usize {
        dma_write_position(self.capacity(), self.remaining())
    }

    /// Byte at `index` (masked into the ring)
    #[inline]
    pub fn read(&self, index: usize) -> u8 {
        self.slots[index & (self.capacity() - 1)].load(Ordering::Relaxed)
    }

    /// DMA side: store one byte and count the transfer down.
    ///
    /// The counter reloads to `capacity` when it would reach zero, as a
    /// circular-mode channel does.
    pub fn dma_store(&self, byte: u8) {
        let capacity = self.capacity();
        self.slots[self.write_position()].store(byte, Ordering::Relaxed);
        let _ = self
            .remaining
            .fetch_update(Ordering::Release, Ordering::Relaxed, |r| {
                Some(if r <= 1 { capacity } else { r - 1 })
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ring_is_at_zero() {
        let ring = DmaRing::new(32).unwrap();
        assert_eq!(ring.remaining(), 32);
        assert_eq!(ring.write_position(), 0);
    }

    #[test]
    fn test_rejects_bad_capacity() {
        assert!(DmaRing::new(0).is_none());
        assert!(DmaRing::new(48).is_none());
    }

    #[test]
    fn test_dma_store_wraps() {
        let ring = DmaRing::new(4).unwrap();
        for byte in 1..=6u8 {
            ring.dma_store(byte);
        }
        assert_eq!(ring.write_position(), 2);
        assert_eq!(ring.remaining(), 2);
        // Slots 0 and 1 were overwritten on the second lap
        assert_eq!(
            [ring.read(0), ring.read(1), ring.read(2), ring.read(3)],
            [5, 6, 3, 4]
        );
    }
}
