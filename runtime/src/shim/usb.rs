//! USB-Stream shim

use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use crate::error::{PortError, Result};
use crate::hal::{HwCell, StatCounters, UsbPeripheral, UsbRxSink, UsbStatus};

pub struct UsbShim {
    hw: HwCell<Box<dyn UsbPeripheral>>,
}

impl UsbShim {
    pub fn new(hw: Box<dyn UsbPeripheral>) -> Self {
        Self {
            hw: HwCell::new(hw),
        }
    }

    /// Create the receive queue and route the device callback into it
    pub fn init(&self, capacity: usize, stats: Arc<StatCounters>) -> Result<UsbRx> {
        if capacity == 0 {
            return Err(PortError::InvalidConfig("usb rx capacity must be non-zero"));
        }
        let (tx, rx) = mpsc::channel(capacity);
        self.hw
            .with(|hw| hw.attach_receiver(UsbRxSink::new(tx, stats)));
        debug!("usb rx queue attached, {} bytes", capacity);
        Ok(UsbRx { rx })
    }

    /// Detach the device callback and drop the queue
    pub fn deinit(&self, rx: UsbRx) {
        self.hw.with(|hw| hw.detach_receiver());
        drop(rx);
    }

    /// Hand `data` to the device stack, retrying each tick while it is busy
    pub async fn send(&self, data: &[u8], tick: Duration) {
        while self.hw.with(|hw| hw.transmit(data)) == UsbStatus::Busy {
            trace!("usb tx busy");
            sleep(tick).await;
        }
    }
}

/// Consumer end of a running USB port's receive queue
#[derive(Debug)]
pub struct UsbRx {
    rx: mpsc::Receiver<u8>,
}

impl UsbRx {
    /// Wait up to `wait` for the next byte
    pub async fn recv_timeout(&mut self, wait: Duration) -> Option<u8> {
        match timeout(wait, self.rx.recv()).await {
            Ok(byte) => byte,
            Err(_) => None,
        }
    }
}
