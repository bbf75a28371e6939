//! Mock USB CDC device

use std::sync::{Arc, Mutex};

use super::locked;
use crate::hal::{UsbPeripheral, UsbRxSink, UsbStatus};

#[derive(Debug, Default)]
struct UsbState {
    sink: Option<UsbRxSink>,
    tx_data: Vec<u8>,
    busy_attempts: usize,
    attempts: usize,
}

/// USB device whose receive callback is driven by the test
#[derive(Debug, Clone, Default)]
pub struct MockUsb {
    state: Arc<Mutex<UsbState>>,
}

impl MockUsb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer busy to the next `attempts` transmit calls
    pub fn with_busy_attempts(self, attempts: usize) -> Self {
        locked(&self.state).busy_attempts = attempts;
        self
    }

    /// Run the receive callback with `data`; returns the bytes queued
    pub fn inject_rx(&self, data: &[u8]) -> usize {
        let sink = locked(&self.state).sink.clone();
        sink.map_or(0, |sink| sink.push_from_isr(data))
    }

    pub fn is_attached(&self) -> bool {
        locked(&self.state).sink.is_some()
    }

    pub fn tx_data(&self) -> Vec<u8> {
        locked(&self.state).tx_data.clone()
    }

    /// Transmit calls so far, busy answers included
    pub fn transmit_attempts(&self) -> usize {
        locked(&self.state).attempts
    }
}

impl UsbPeripheral for MockUsb {
    fn attach_receiver(&mut self, sink: UsbRxSink) {
        locked(&self.state).sink = Some(sink);
    }

    fn detach_receiver(&mut self) {
        locked(&self.state).sink = None;
    }

    fn transmit(&mut self, data: &[u8]) -> UsbStatus {
        let mut state = locked(&self.state);
        state.attempts += 1;
        if state.busy_attempts > 0 {
            state.busy_attempts -= 1;
            return UsbStatus::Busy;
        }
        state.tx_data.extend_from_slice(data);
        UsbStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_then_ok() {
        let mut usb = MockUsb::new().with_busy_attempts(1);
        assert_eq!(usb.transmit(b"a"), UsbStatus::Busy);
        assert_eq!(usb.transmit(b"a"), UsbStatus::Ok);
        assert_eq!(usb.tx_data(), b"a");
        assert_eq!(usb.transmit_attempts(), 2);
    }

    #[test]
    fn test_inject_without_receiver() {
        let usb = MockUsb::new();
        assert_eq!(usb.inject_rx(b"lost"), 0);
    }
}
