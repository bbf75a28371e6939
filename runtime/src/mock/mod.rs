//! Simulated peripherals and interpreter
//!
//! Each mock is a cheap `Clone` over shared state: one clone is moved
//! into the port, the test keeps another to inject traffic and inspect
//! what the port did.

mod can;
mod interpreter;
mod serial;
mod usb;

pub use can::MockCan;
pub use interpreter::RecordingInterpreter;
pub use serial::MockSerial;
pub use usb::MockUsb;

use std::sync::{Mutex, MutexGuard, PoisonError};

fn locked<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
