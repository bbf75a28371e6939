//! Serial-DMA shim
//!
//! Reception runs a circular DMA channel into a ring owned by the I/O
//! task. Transmission hands the buffer to DMA and polls the busy flag,
//! turning the receiver off around it on half-duplex lines.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use termio_shared::RxCursor;
use tokio::time::sleep;

use crate::dma::DmaRing;
use crate::error::{PortError, Result};
use crate::hal::{HwCell, SerialPeripheral};

pub struct SerialShim {
    hw: HwCell<Box<dyn SerialPeripheral>>,
    half_duplex: bool,
}

impl SerialShim {
    pub fn new(hw: Box<dyn SerialPeripheral>, half_duplex: bool) -> Self {
        Self {
            hw: HwCell::new(hw),
            half_duplex,
        }
    }

    /// Allocate the receive ring and arm circular reception into it
    pub fn init(&self, capacity: usize) -> Result<SerialRx> {
        let ring = DmaRing::new(capacity)
            .map(Arc::new)
            .ok_or(PortError::InvalidConfig(
                "serial rx capacity must be a power of two",
            ))?;
        let cursor = RxCursor::new(capacity).ok_or(PortError::InvalidConfig(
            "serial rx capacity must be a power of two",
        ))?;

        self.hw.with(|hw| {
            hw.init(self.half_duplex);
            hw.start_receive(ring.clone());
        });
        debug!("serial rx armed, {} byte ring", capacity);
        Ok(SerialRx { ring, cursor })
    }

    /// Stop reception and release the ring
    pub fn deinit(&self, rx: SerialRx) {
        self.hw.with(|hw| hw.deinit());
        drop(rx);
    }

    /// Transmit `data` and return once the last byte has left the line
    pub async fn send(&self, data: &[u8], tick: Duration) {
        // Held until the send completes or the future is dropped
        let _gate = if self.half_duplex {
            let gate = RxGate::close(&self.hw);
            sleep(tick).await;
            Some(gate)
        } else {
            None
        };

        self.hw.with(|hw| hw.start_transmit(data));
        sleep(tick).await;
        while self.hw.with(|hw| hw.is_transmitting()) {
            sleep(tick).await;
        }
    }
}

/// Half-duplex receiver turned off for as long as the gate lives
struct RxGate<'a> {
    hw: &'a HwCell<Box<dyn SerialPeripheral>>,
}

impl<'a> RxGate<'a> {
    fn close(hw: &'a HwCell<Box<dyn SerialPeripheral>>) -> Self {
        hw.with(|hw| hw.set_receiver_enabled(false));
        Self { hw }
    }
}

impl Drop for RxGate<'_> {
    fn drop(&mut self) {
        self.hw.with(|hw| hw.set_receiver_enabled(true));
    }
}

/// Receive side of a running serial port: the DMA ring and the read cursor
#[derive(Debug)]
pub struct SerialRx {
    ring: Arc<DmaRing>,
    cursor: RxCursor,
}

impl SerialRx {
    /// Skip everything received so far
    pub fn discard_pending(&mut self) {
        self.cursor.sync_to(self.ring.write_position());
    }

    /// Bytes received since the cursor last moved
    #[inline]
    pub fn available_ahead(&self) -> usize {
        self.cursor.pending(self.ring.write_position())
    }

    /// Take the next received byte, if the DMA write cursor is ahead
    pub fn next_byte(&mut self) -> Option<u8> {
        if self.available_ahead() == 0 {
            return None;
        }
        let byte = self.ring.read(self.cursor.position());
        self.cursor.advance();
        Some(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSerial;
    use tokio::time::timeout;

    const TICK: Duration = Duration::from_millis(1);

    fn drain(rx: &mut SerialRx) -> Vec<u8> {
        std::iter::from_fn(|| rx.next_byte()).collect()
    }

    #[test]
    fn test_available_ahead_across_wrap() {
        let serial = MockSerial::new();
        let shim = SerialShim::new(Box::new(serial.clone()), false);
        let mut rx = shim.init(8).unwrap();
        assert_eq!(rx.available_ahead(), 0);

        serial.inject_rx(b"abcdef");
        assert_eq!(rx.available_ahead(), 6);
        assert_eq!(drain(&mut rx), b"abcdef");
        assert_eq!(rx.available_ahead(), 0);

        // Write cursor laps past the end of the ring
        serial.inject_rx(b"ghijk");
        assert_eq!(rx.available_ahead(), 5);
        assert_eq!(rx.next_byte(), Some(b'g'));
        assert_eq!(rx.available_ahead(), 4);
        assert_eq!(drain(&mut rx), b"hijk");

        shim.deinit(rx);
    }

    #[test]
    fn test_discard_pending_skips_received_bytes() {
        let serial = MockSerial::new();
        let shim = SerialShim::new(Box::new(serial.clone()), false);
        let mut rx = shim.init(16).unwrap();

        serial.inject_rx(b"stale");
        rx.discard_pending();
        assert_eq!(rx.available_ahead(), 0);

        serial.inject_rx(b"ok");
        assert_eq!(drain(&mut rx), b"ok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_half_duplex_send_reenables_receiver() {
        let serial = MockSerial::new().with_tx_busy_polls(50);
        let shim = SerialShim::new(Box::new(serial.clone()), true);
        let mut rx = shim.init(64).unwrap();

        let sent = timeout(5 * TICK, shim.send(b"long response", TICK)).await;
        assert!(sent.is_err());
        assert!(serial.receiver_enabled());

        tokio::time::sleep(500 * TICK).await;
        assert!(serial.receiver_enabled());
        assert_eq!(serial.inject_rx(b"at"), 2);
        assert_eq!(drain(&mut rx), b"at");
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_duplex_send_restores_receiver() {
        let serial = MockSerial::new().with_tx_busy_polls(3);
        let shim = SerialShim::new(Box::new(serial.clone()), true);
        let _rx = shim.init(64).unwrap();

        shim.send(b"ping", TICK).await;
        assert!(serial.receiver_enabled());
        assert_eq!(serial.half_duplex_violations(), 0);
        assert_eq!(serial.tx_data(), b"ping");
    }
}
