//! Peripheral interfaces the transport shims drive
//!
//! Board support code implements these over the vendor HAL; the `mock`
//! module implements them in memory.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::trace;
use termio_shared::{CanFilter, CanFrame};
use tokio::sync::mpsc;

use crate::dma::DmaRing;

/// Errors from a peripheral request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// Resource temporarily occupied; retry later
    Busy,
    /// Request refused by the hardware
    Rejected,
}

/// Result of handing a buffer to the USB device stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbStatus {
    Ok,
    Busy,
}

/// DMA-capable UART
pub trait SerialPeripheral: Send {
    /// Bring up the line; half duplex shares one wire for both directions
    fn init(&mut self, half_duplex: bool);

    /// Start circular DMA reception into `ring`
    fn start_receive(&mut self, ring: Arc<DmaRing>);

    /// Stop reception and release the ring
    fn deinit(&mut self);

    /// Gate the receiver (half-duplex turnaround)
    fn set_receiver_enabled(&mut self, enabled: bool);

    /// Start a DMA transmit of `data`
    fn start_transmit(&mut self, data: &[u8]);

    /// Whether the last transmit is still shifting out
    fn is_transmitting(&self) -> bool;
}

/// USB CDC device class
pub trait UsbPeripheral: Send {
    /// Route received bytes to `sink` from the device's receive callback
    fn attach_receiver(&mut self, sink: UsbRxSink);

    /// Stop delivering received bytes
    fn detach_receiver(&mut self);

    /// Queue `data` for the host
    fn transmit(&mut self, data: &[u8]) -> UsbStatus;
}

/// bxCAN-style controller with three transmit mailboxes
pub trait CanPeripheral: Send {
    fn configure_filter(&mut self, filter: &CanFilter) -> Result<(), HalError>;

    fn start(&mut self) -> Result<(), HalError>;

    fn stop(&mut self);

    /// Empty transmit mailboxes
    fn free_tx_mailboxes(&self) -> usize;

    fn add_tx_message(&mut self, frame: &CanFrame) -> Result<(), HalError>;

    /// Frames waiting in receive FIFO 0
    fn rx_fifo_fill_level(&self) -> usize;

    /// Pop the oldest frame from receive FIFO 0
    fn receive(&mut self) -> Option<CanFrame>;
}

/// Counters shared by a port, its task and its receive sink
#[derive(Debug, Default)]
pub struct StatCounters {
    pub bytes_fed: AtomicU64,
    pub frames_fed: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub rx_dropped: AtomicU64,
}

/// Producer end of a USB port's receive queue.
///
/// Handed to the USB peripheral by the I/O task; the device's receive
/// callback pushes into it without blocking.
#[derive(Debug, Clone)]
pub struct UsbRxSink {
    tx: mpsc::Sender<u8>,
    stats: Arc<StatCounters>,
}

impl UsbRxSink {
    pub(crate) fn new(tx: mpsc::Sender<u8>, stats: Arc<StatCounters>) -> Self {
        Self { tx, stats }
    }

    /// Enqueue `data` from interrupt context.
    ///
    /// Bytes beyond the queue's free space are dropped. Returns the number
    /// of bytes accepted.
    pub fn push_from_isr(&self, data: &[u8]) -> usize {
        let mut accepted = 0;
        for &byte in data {
            if self.tx.try_send(byte).is_ok() {
                accepted += 1;
            }
        }
        let dropped = data.len() - accepted;
        if dropped > 0 {
            self.stats
                .rx_dropped
                .fetch_add(dropped as u64, Ordering::Relaxed);
            trace!("usb rx queue full, dropped {} bytes", dropped);
        }
        accepted
    }

    /// Whether the consuming task has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Peripheral slot shared by a port's task and its transmit path
#[derive(Debug)]
pub(crate) struct HwCell<T: ?Sized>(Mutex<T>);

impl<T> HwCell<T> {
    pub(crate) fn new(hw: T) -> Self {
        Self(Mutex::new(hw))
    }
}

impl<T: ?Sized> HwCell<T> {
    /// Run `f` with exclusive access to the peripheral.
    ///
    /// Never held across an await point.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}
