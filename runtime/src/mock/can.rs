//! Mock CAN controller

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use termio_shared::{CanFilter, CanFrame};

use super::locked;
use crate::hal::{CanPeripheral, HalError};

const TX_MAILBOXES: usize = 3;

#[derive(Debug, Default)]
struct CanState {
    reject_filter: bool,
    filter: Option<CanFilter>,
    started: bool,
    full_mailbox_polls: usize,
    tx_frames: Vec<CanFrame>,
    rx_fifo: VecDeque<CanFrame>,
}

/// CAN controller with a software acceptance filter and receive FIFO
#[derive(Debug, Clone, Default)]
pub struct MockCan {
    state: Arc<Mutex<CanState>>,
}

impl MockCan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every filter configuration
    pub fn rejecting_filter(self) -> Self {
        locked(&self.state).reject_filter = true;
        self
    }

    /// Report all mailboxes full for the next `polls` checks
    pub fn with_full_mailbox_polls(self, polls: usize) -> Self {
        locked(&self.state).full_mailbox_polls = polls;
        self
    }

    /// Put `frame` on the bus; returns whether it reached the FIFO
    pub fn inject_rx(&self, frame: CanFrame) -> bool {
        let mut state = locked(&self.state);
        let accepted = state.started
            && state
                .filter
                .as_ref()
                .is_some_and(|filter| filter.accepts(frame.id()));
        if accepted {
            state.rx_fifo.push_back(frame);
        }
        accepted
    }

    pub fn is_started(&self) -> bool {
        locked(&self.state).started
    }

    pub fn tx_frames(&self) -> Vec<CanFrame> {
        locked(&self.state).tx_frames.clone()
    }
}

impl CanPeripheral for MockCan {
    fn configure_filter(&mut self, filter: &CanFilter) -> Result<(), HalError> {
        let mut state = locked(&self.state);
        if state.reject_filter {
            return Err(HalError::Rejected);
        }
        state.filter = Some(*filter);
        Ok(())
    }

    fn start(&mut self) -> Result<(), HalError> {
        locked(&self.state).started = true;
        Ok(())
    }

    fn stop(&mut self) {
        locked(&self.state).started = false;
    }

    fn free_tx_mailboxes(&self) -> usize {
        let mut state = locked(&self.state);
        if state.full_mailbox_polls > 0 {
            state.full_mailbox_polls -= 1;
            return 0;
        }
        TX_MAILBOXES
    }

    fn add_tx_message(&mut self, frame: &CanFrame) -> Result<(), HalError> {
        locked(&self.state).tx_frames.push(frame.clone());
        Ok(())
    }

    fn rx_fifo_fill_level(&self) -> usize {
        locked(&self.state).rx_fifo.len()
    }

    fn receive(&mut self) -> Option<CanFrame> {
        locked(&self.state).rx_fifo.pop_front()
    }
}
