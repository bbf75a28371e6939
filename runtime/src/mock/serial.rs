//! Mock DMA UART

use std::sync::{Arc, Mutex, Weak};

use super::locked;
use crate::dma::DmaRing;
use crate::hal::SerialPeripheral;

#[derive(Debug)]
struct SerialState {
    half_duplex: bool,
    receiver_enabled: bool,
    ring: Option<Arc<DmaRing>>,
    last_ring: Option<Weak<DmaRing>>,
    pre_start_noise: Vec<u8>,
    tx_data: Vec<u8>,
    transmit_count: usize,
    busy_polls: usize,
    busy_remaining: usize,
    overlap_count: usize,
}

/// UART whose "DMA channel" writes injected bytes into the armed ring
#[derive(Debug, Clone)]
pub struct MockSerial {
    state: Arc<Mutex<SerialState>>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SerialState {
                half_duplex: false,
                receiver_enabled: true,
                ring: None,
                last_ring: None,
                pre_start_noise: Vec::new(),
                tx_data: Vec::new(),
                transmit_count: 0,
                busy_polls: 0,
                busy_remaining: 0,
                overlap_count: 0,
            })),
        }
    }

    /// Report busy for `polls` checks after each transmit starts
    pub fn with_tx_busy_polls(self, polls: usize) -> Self {
        locked(&self.state).busy_polls = polls;
        self
    }

    /// Bytes the channel stores as soon as reception is armed
    pub fn set_pre_start_noise(&self, noise: &[u8]) {
        locked(&self.state).pre_start_noise = noise.to_vec();
    }

    /// Deliver `data` through the DMA channel.
    ///
    /// Returns the number of bytes stored; nothing is stored while
    /// reception is not armed or the receiver is disabled.
    pub fn inject_rx(&self, data: &[u8]) -> usize {
        let state = locked(&self.state);
        match &state.ring {
            Some(ring) if state.receiver_enabled => {
                data.iter().for_each(|&b| ring.dma_store(b));
                data.len()
            }
            _ => 0,
        }
    }

    pub fn is_receiving(&self) -> bool {
        locked(&self.state).ring.is_some()
    }

    /// Weak reference to the most recently armed ring
    pub fn ring(&self) -> Option<Weak<DmaRing>> {
        locked(&self.state).last_ring.clone()
    }

    pub fn receiver_enabled(&self) -> bool {
        locked(&self.state).receiver_enabled
    }

    pub fn is_half_duplex(&self) -> bool {
        locked(&self.state).half_duplex
    }

    pub fn tx_data(&self) -> Vec<u8> {
        locked(&self.state).tx_data.clone()
    }

    pub fn transmit_count(&self) -> usize {
        locked(&self.state).transmit_count
    }

    /// Times the receiver was seen enabled while a transmit was in flight
    pub fn half_duplex_violations(&self) -> usize {
        locked(&self.state).overlap_count
    }
}

impl Default for MockSerial {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialPeripheral for MockSerial {
    fn init(&mut self, half_duplex: bool) {
        let mut state = locked(&self.state);
        state.half_duplex = half_duplex;
        state.receiver_enabled = true;
    }

    fn start_receive(&mut self, ring: Arc<DmaRing>) {
        let mut state = locked(&self.state);
        for byte in std::mem::take(&mut state.pre_start_noise) {
            ring.dma_store(byte);
        }
        state.last_ring = Some(Arc::downgrade(&ring));
        state.ring = Some(ring);
    }

    fn deinit(&mut self) {
        locked(&self.state).ring = None;
    }

    fn set_receiver_enabled(&mut self, enabled: bool) {
        let mut state = locked(&self.state);
        if enabled && state.busy_remaining > 0 {
            state.overlap_count += 1;
        }
        state.receiver_enabled = enabled;
    }

    fn start_transmit(&mut self, data: &[u8]) {
        let mut state = locked(&self.state);
        if state.receiver_enabled {
            state.overlap_count += 1;
        }
        state.tx_data.extend_from_slice(data);
        state.transmit_count += 1;
        state.busy_remaining = state.busy_polls;
    }

    fn is_transmitting(&self) -> bool {
        let mut state = locked(&self.state);
        if state.busy_remaining == 0 {
            return false;
        }
        if state.receiver_enabled {
            state.overlap_count += 1;
        }
        state.busy_remaining -= 1;
        true
    }
}
