//! Transport driver shims
//!
//! One adapter per physical transport. They share the send contract;
//! each keeps its own receive model, which the I/O task polls directly.

mod can;
mod serial;
mod usb;

pub use can::CanShim;
pub use serial::{SerialRx, SerialShim};
pub use usb::{UsbRx, UsbShim};

use std::time::Duration;

use crate::config::TransportKind;

/// The shim bound to a port
pub enum Transport {
    Serial(SerialShim),
    Usb(UsbShim),
    Can(CanShim),
}

impl Transport {
    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::Serial(_) => TransportKind::Serial,
            Transport::Usb(_) => TransportKind::Usb,
            Transport::Can(_) => TransportKind::Can,
        }
    }

    /// Transmit `data`, yielding `tick` between hardware polls
    pub async fn send(&self, data: &[u8], tick: Duration) {
        match self {
            Transport::Serial(shim) => shim.send(data, tick).await,
            Transport::Usb(shim) => shim.send(data, tick).await,
            Transport::Can(shim) => shim.send(data, tick).await,
        }
    }
}
