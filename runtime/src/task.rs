//! # I/O Task
//!
//! One tokio task per running port. It arms reception, obtains the
//! interpreter, then polls the transport and feeds the interpreter until
//! told to shut down.
//!
//! ```text
//! Starting ──► Running ──► Draining ──► Terminated
//!     │                        ▲
//!     └── init failure ────────┘
//! ```
//!
//! Every feed runs under the interpreter's processing lock: one byte for
//! serial and USB, a whole FIFO drain for CAN. Responses collected during
//! a feed are sent after the lock is released, under the port's transmit
//! lock. Shutdown is only observed between poll iterations, so a feed in
//! progress always completes.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{watch, Notify};
use tokio::time::timeout;

use crate::error::{PortError, Result};
use crate::fault::{FaultCode, FaultState};
use crate::interp::{acquire_processing, InterpreterHandle, InterpreterLayer};
use crate::output::OutputWriter;
use crate::port::Port;
use crate::shim::{CanShim, SerialRx, SerialShim, Transport, UsbRx, UsbShim};

/// Lifecycle of one I/O task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Starting,
    Running,
    Draining,
    Terminated,
}

/// Receive side of a started transport
enum Receiver<'p> {
    Serial(&'p SerialShim, SerialRx),
    Usb(&'p UsbShim, UsbRx),
    Can(&'p CanShim),
}

pub(crate) struct IoTask {
    port: Arc<Port>,
    layer: Arc<dyn InterpreterLayer>,
    fault: Arc<FaultState>,
    shutdown: Arc<Notify>,
    state: watch::Sender<TaskState>,
    generation: u64,
}

impl IoTask {
    pub(crate) fn new(
        port: Arc<Port>,
        layer: Arc<dyn InterpreterLayer>,
        fault: Arc<FaultState>,
        shutdown: Arc<Notify>,
        state: watch::Sender<TaskState>,
        generation: u64,
    ) -> Self {
        Self {
            port,
            layer,
            fault,
            shutdown,
            state,
            generation,
        }
    }

    pub(crate) async fn run(self) {
        info!("{}: starting", self.port.name());

        match self.start().await {
            Ok((mut rx, handle)) => {
                self.set_state(TaskState::Running);
                self.poll(&mut rx, &handle).await;
                self.set_state(TaskState::Draining);
                self.release(rx);
            }
            Err(e) => {
                error!("{}: start failed: {}", self.port.name(), e);
                self.set_state(TaskState::Draining);
            }
        }

        self.port.unbind(self.generation);
        self.set_state(TaskState::Terminated);
    }

    fn set_state(&self, state: TaskState) {
        debug!("{}: {:?}", self.port.name(), state);
        self.state.send_replace(state);
    }

    async fn start(&self) -> Result<(Receiver<'_>, InterpreterHandle)> {
        let port = &*self.port;
        let mut rx = match port.transport() {
            Transport::Serial(shim) => Receiver::Serial(shim, shim.init(port.config().rx_capacity)?),
            Transport::Usb(shim) => Receiver::Usb(
                shim,
                shim.init(port.config().rx_capacity, port.counters().clone())?,
            ),
            Transport::Can(shim) => {
                if let Err(e) = shim.init() {
                    let code = match e {
                        PortError::FilterRejected => FaultCode::CanFilterRejected,
                        _ => FaultCode::CanStartFailed,
                    };
                    self.fault.raise(code, port.config().can_filter.bank as u32);
                    return Err(e);
                }
                Receiver::Can(shim)
            }
        };

        let Some(handle) = self.layer.create_handle(port.kind().handle_name()) else {
            self.fault.raise(FaultCode::InterpreterUnavailable, 0);
            self.release(rx);
            return Err(PortError::InterpreterUnavailable);
        };
        port.attach_interpreter(self.generation, handle.clone());

        if let Some(store) = port.store() {
            acquire_processing(&handle)
                .await
                .register_persisted_store(store.clone());
        }

        // Bytes that arrived before the task existed are not replayed
        if let Receiver::Serial(_, serial) = &mut rx {
            serial.discard_pending();
        }
        Ok((rx, handle))
    }

    async fn poll(&self, rx: &mut Receiver<'_>, handle: &InterpreterHandle) {
        let config = *self.port.task_config();
        loop {
            match rx {
                Receiver::Serial(_, serial) => {
                    while let Some(byte) = serial.next_byte() {
                        self.feed(handle, byte).await;
                    }
                }
                Receiver::Usb(_, usb) => {
                    while let Some(byte) = usb.recv_timeout(config.usb_poll_timeout).await {
                        self.feed(handle, byte).await;
                    }
                }
                Receiver::Can(shim) => self.drain_frames(*shim, handle).await,
            }

            if timeout(config.tick, self.shutdown.notified()).await.is_ok() {
                info!("{}: shutdown requested", self.port.name());
                break;
            }
        }
    }

    async fn feed(&self, handle: &InterpreterHandle, byte: u8) {
        let mut out = OutputWriter::new();
        acquire_processing(handle).await.feed(&[byte], &mut out);
        self.port.counters().bytes_fed.fetch_add(1, Ordering::Relaxed);
        self.flush(out).await;
    }

    /// Hand every waiting frame to the interpreter under one lock
    async fn drain_frames(&self, shim: &CanShim, handle: &InterpreterHandle) {
        let mut out = OutputWriter::new();
        let mut frames = 0u64;
        let mut bytes = 0u64;
        {
            let mut interpreter = acquire_processing(handle).await;
            while let Some(frame) = shim.pop_frame() {
                interpreter.feed(frame.data(), &mut out);
                frames += 1;
                bytes += frame.dlc() as u64;
            }
        }
        if frames > 0 {
            let counters = self.port.counters();
            counters.frames_fed.fetch_add(frames, Ordering::Relaxed);
            counters.bytes_fed.fetch_add(bytes, Ordering::Relaxed);
        }
        self.flush(out).await;
    }

    async fn flush(&self, mut out: OutputWriter) {
        if out.is_empty() {
            return;
        }
        let bytes = out.take();
        if let Err(e) = self.port.send(&bytes).await {
            warn!("{}: response dropped: {}", self.port.name(), e);
        }
    }

    /// Stop reception and free the receive buffer
    fn release(&self, rx: Receiver<'_>) {
        match rx {
            Receiver::Serial(shim, serial) => shim.deinit(serial),
            Receiver::Usb(shim, usb) => shim.deinit(usb),
            Receiver::Can(shim) => shim.deinit(),
        }
        debug!("{}: receive path released", self.port.name());
    }
}
