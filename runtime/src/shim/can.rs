//! CAN-Frame shim
//!
//! Terminal traffic travels as classic frames under one standard
//! identifier. Outbound payloads are split into 8-byte fragments, each
//! retried until a transmit mailbox takes it.

use std::time::Duration;

use log::{debug, error, trace};
use termio_shared::{fragment, CanFilter, CanFrame, StandardId};
use tokio::time::sleep;

use crate::error::{PortError, Result};
use crate::hal::{CanPeripheral, HwCell};

pub struct CanShim {
    hw: HwCell<Box<dyn CanPeripheral>>,
    id: StandardId,
    filter: CanFilter,
}

impl CanShim {
    pub fn new(hw: Box<dyn CanPeripheral>, id: StandardId, filter: CanFilter) -> Self {
        Self {
            hw: HwCell::new(hw),
            id,
            filter,
        }
    }

    /// Program the acceptance filter and start the controller
    pub fn init(&self) -> Result<()> {
        self.hw.with(|hw| {
            hw.configure_filter(&self.filter).map_err(|e| {
                error!("CAN filter bank {} rejected: {:?}", self.filter.bank, e);
                PortError::FilterRejected
            })?;
            hw.start().map_err(|e| {
                error!("CAN start failed: {:?}", e);
                PortError::StartFailed
            })
        })
    }

    pub fn deinit(&self) {
        self.hw.with(|hw| hw.stop());
    }

    /// Send `data` as consecutive frames.
    ///
    /// Each attempt is followed by one tick; a fragment is retried until
    /// the controller accepts it.
    pub async fn send(&self, data: &[u8], tick: Duration) {
        for frame in fragment(self.id, data) {
            loop {
                let accepted = self.hw.with(|hw| {
                    hw.free_tx_mailboxes() > 0 && hw.add_tx_message(&frame).is_ok()
                });
                sleep(tick).await;
                if accepted {
                    trace!("CAN tx {} bytes", frame.dlc());
                    break;
                }
            }
        }
    }

    /// Pop the next terminal frame from the receive FIFO.
    ///
    /// Frames carrying another identifier are discarded.
    pub fn pop_frame(&self) -> Option<CanFrame> {
        self.hw.with(|hw| {
            while hw.rx_fifo_fill_level() > 0 {
                let frame = hw.receive()?;
                if frame.id() == self.id {
                    return Some(frame);
                }
                debug!("CAN rx ignoring id {:#05x}", frame.id().as_raw());
            }
            None
        })
    }
}
