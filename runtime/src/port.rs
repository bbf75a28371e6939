//! # Port
//!
//! One configured physical channel: its transport shim, its transmit
//! lock and the binding to the I/O task currently serving it.
//!
//! ```text
//!            ┌──────────── Port ─────────────┐
//! writers ──►│ tx permit ──► Transport::send │──► wire
//!            │ binding: task gen, shutdown,  │
//!            │          state, interpreter   │
//!            └───────────────────────────────┘
//! ```
//!
//! Receive buffers are not held here: the I/O task allocates them when it
//! starts and frees them when it exits.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{watch, Notify, Semaphore, SemaphorePermit};

use crate::config::{PortConfig, TaskConfig, TransportKind};
use crate::error::{PortError, Result};
use crate::hal::{CanPeripheral, SerialPeripheral, StatCounters, UsbPeripheral};
use crate::interp::{acquire_processing, InterpreterHandle, PersistedStore, ProcessingGuard};
use crate::output::{Output, PortWriter};
use crate::shim::{CanShim, SerialShim, Transport, UsbShim};
use crate::task::TaskState;

/// Snapshot of a port's traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortStats {
    /// Bytes handed to the interpreter
    pub bytes_fed: u64,
    /// CAN frames handed to the interpreter
    pub frames_fed: u64,
    /// Bytes put on the wire
    pub bytes_sent: u64,
    /// USB bytes dropped on a full receive queue
    pub rx_dropped: u64,
}

/// Task currently serving a port
pub(crate) struct TaskBinding {
    pub generation: u64,
    pub shutdown: Arc<Notify>,
    pub state: watch::Receiver<TaskState>,
    pub interpreter: Option<InterpreterHandle>,
}

pub struct Port {
    config: PortConfig,
    transport: Transport,
    tx_permit: Semaphore,
    binding: Mutex<Option<TaskBinding>>,
    next_generation: AtomicU64,
    stats: Arc<StatCounters>,
    task_config: TaskConfig,
    store: Option<PersistedStore>,
}

impl Port {
    fn new(config: PortConfig, transport: Transport) -> Result<Self> {
        config.validate(transport.kind())?;
        Ok(Self {
            config,
            transport,
            tx_permit: Semaphore::new(1),
            binding: Mutex::new(None),
            next_generation: AtomicU64::new(0),
            stats: Arc::new(StatCounters::default()),
            task_config: TaskConfig::default(),
            store: None,
        })
    }

    pub fn serial(config: PortConfig, hw: impl SerialPeripheral + 'static) -> Result<Self> {
        let shim = SerialShim::new(Box::new(hw), config.half_duplex);
        Self::new(config, Transport::Serial(shim))
    }

    pub fn usb(config: PortConfig, hw: impl UsbPeripheral + 'static) -> Result<Self> {
        let shim = UsbShim::new(Box::new(hw));
        Self::new(config, Transport::Usb(shim))
    }

    pub fn can(config: PortConfig, hw: impl CanPeripheral + 'static) -> Result<Self> {
        let shim = CanShim::new(Box::new(hw), config.can_id, config.can_filter);
        Self::new(config, Transport::Can(shim))
    }

    /// Register `store` with the interpreter whenever a task starts
    pub fn with_store(mut self, store: PersistedStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_task_config(mut self, task_config: TaskConfig) -> Self {
        self.task_config = task_config;
        self
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.config.name
    }

    #[inline]
    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    #[inline]
    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    #[inline]
    pub fn task_config(&self) -> &TaskConfig {
        &self.task_config
    }

    pub fn store(&self) -> Option<&PersistedStore> {
        self.store.as_ref()
    }

    pub(crate) fn transport(&self) -> &Transport {
        &self.transport
    }

    pub(crate) fn counters(&self) -> &Arc<StatCounters> {
        &self.stats
    }

    /// Take the transmit lock; released when the permit drops
    pub async fn acquire_transmit(&self) -> Result<SemaphorePermit<'_>> {
        self.tx_permit.acquire().await.map_err(|_| PortError::Closed)
    }

    /// Take the processing lock of the interpreter this port feeds.
    ///
    /// Fails when no task is bound or the task has not yet obtained its
    /// interpreter.
    pub async fn acquire_processing(&self) -> Result<ProcessingGuard> {
        let handle = self
            .binding()
            .as_ref()
            .and_then(|binding| binding.interpreter.clone())
            .ok_or(PortError::NotRunning)?;
        Ok(acquire_processing(&handle).await)
    }

    /// Transmit `data` as one uninterrupted write
    pub async fn send(&self, data: &[u8]) -> Result<usize> {
        let _permit = self.acquire_transmit().await?;
        self.transport.send(data, self.task_config.tick).await;
        self.stats
            .bytes_sent
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(data.len())
    }

    /// Render `output` and transmit it.
    ///
    /// Rendering happens before the returned future is first polled.
    pub fn print(&self, output: Output<'_>) -> impl Future<Output = Result<usize>> + Send + '_ {
        let bytes = output.render();
        async move { self.send(&bytes).await }
    }

    /// Async `embedded_io_async::Write` adapter over [`send`](Self::send)
    pub fn writer(&self) -> PortWriter<'_> {
        PortWriter::new(self)
    }

    pub fn stats(&self) -> PortStats {
        PortStats {
            bytes_fed: self.stats.bytes_fed.load(Ordering::Relaxed),
            frames_fed: self.stats.frames_fed.load(Ordering::Relaxed),
            bytes_sent: self.stats.bytes_sent.load(Ordering::Relaxed),
            rx_dropped: self.stats.rx_dropped.load(Ordering::Relaxed),
        }
    }

    /// Whether an I/O task is bound
    pub fn is_running(&self) -> bool {
        self.binding().is_some()
    }

    /// State of the bound task, if any
    pub fn task_state(&self) -> Option<TaskState> {
        self.binding().as_ref().map(|binding| *binding.state.borrow())
    }

    pub(crate) fn binding(&self) -> MutexGuard<'_, Option<TaskBinding>> {
        match self.binding.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Bind a new task; fails if one is already bound
    pub(crate) fn bind(
        &self,
        shutdown: Arc<Notify>,
        state: watch::Receiver<TaskState>,
    ) -> Result<u64> {
        let mut binding = self.binding();
        if binding.is_some() {
            return Err(PortError::AlreadyRunning);
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        *binding = Some(TaskBinding {
            generation,
            shutdown,
            state,
            interpreter: None,
        });
        Ok(generation)
    }

    /// Record the interpreter the task with `generation` feeds
    pub(crate) fn attach_interpreter(&self, generation: u64, handle: InterpreterHandle) {
        if let Some(binding) = self.binding().as_mut() {
            if binding.generation == generation {
                binding.interpreter = Some(handle);
            }
        }
    }

    /// Clear the binding if it still belongs to `generation`
    pub(crate) fn unbind(&self, generation: u64) {
        let mut binding = self.binding();
        if binding.as_ref().map(|b| b.generation) == Some(generation) {
            *binding = None;
        }
    }
}

impl core::fmt::Debug for Port {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.config.name)
            .field("kind", &self.kind())
            .field("running", &self.is_running())
            .finish()
    }
}
