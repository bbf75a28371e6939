//! Lifecycle controller: start and stop port tasks on demand

use std::sync::Arc;

use log::{info, warn};
use tokio::sync::{watch, Notify};
use tokio::time::timeout;

use crate::error::Result;
use crate::fault::FaultState;
use crate::interp::InterpreterLayer;
use crate::port::Port;
use crate::task::{IoTask, TaskState};

/// Starts and kills I/O tasks, all feeding interpreters from one layer
pub struct Lifecycle {
    layer: Arc<dyn InterpreterLayer>,
    fault: Arc<FaultState>,
}

impl Lifecycle {
    pub fn new(layer: impl InterpreterLayer + 'static) -> Self {
        Self {
            layer: Arc::new(layer),
            fault: Arc::new(FaultState::new()),
        }
    }

    /// Share an existing fault state instead of a private one
    pub fn with_fault_state(mut self, fault: Arc<FaultState>) -> Self {
        self.fault = fault;
        self
    }

    pub fn fault(&self) -> &Arc<FaultState> {
        &self.fault
    }

    /// Spawn an I/O task for `port` unless one is already bound.
    ///
    /// Must be called within a tokio runtime. The returned receiver
    /// follows the task through its states.
    pub fn start(&self, port: &Arc<Port>) -> Result<watch::Receiver<TaskState>> {
        let shutdown = Arc::new(Notify::new());
        let (state_tx, state_rx) = watch::channel(TaskState::Starting);
        let generation = port.bind(shutdown.clone(), state_rx.clone())?;

        let task = IoTask::new(
            port.clone(),
            self.layer.clone(),
            self.fault.clone(),
            shutdown,
            state_tx,
            generation,
        );
        tokio::spawn(task.run());
        info!("{}: task spawned", port.name());
        Ok(state_rx)
    }

    /// Signal the task bound to `port` and wait out the grace period.
    ///
    /// Returns true once no task is bound, false if the task was still
    /// running when the grace period expired.
    pub async fn kill(&self, port: &Port) -> bool {
        let bound = {
            let binding = port.binding();
            binding
                .as_ref()
                .map(|b| (b.shutdown.clone(), b.state.clone()))
        };
        let Some((shutdown, mut state)) = bound else {
            return true;
        };

        shutdown.notify_one();
        let grace = port.task_config().kill_grace;
        let terminated = matches!(
            timeout(grace, state.wait_for(|s| *s == TaskState::Terminated)).await,
            Ok(Ok(_))
        );
        if !terminated {
            warn!("{}: task still running after {:?}", port.name(), grace);
        }
        terminated
    }
}
