//! # Terminal I/O Runtime
//!
//! Binds physical transports to a command interpreter:
//!
//! - **Ports**: one per channel, owning a transport shim and a transmit lock
//! - **I/O tasks**: one tokio task per running port, feeding the interpreter
//! - **Lifecycle**: start and kill tasks on demand, e.g. on USB hot-plug
//! - **Output**: bounded formatted writes and raw passthrough
//! - **Persisted store**: flash-backed variables for the interpreter
//!
//! ## Example
//!
//! ```ignore
//! let handle = share(MyInterpreter::new());
//! let lifecycle = Lifecycle::new(move |_: &'static str| -> Option<InterpreterHandle> {
//!     Some(handle.clone())
//! });
//!
//! let uart = Arc::new(Port::serial(PortConfig::serial("uart1", 256), board.uart1)?);
//! let can = Arc::new(Port::can(PortConfig::can("can1"), board.can1)?);
//! lifecycle.start(&uart)?;
//! lifecycle.start(&can)?;
//!
//! tprintf!(uart, "vbus={:.1}V\r\n", vbus).await?;
//! ```

pub mod config;
pub mod dma;
pub mod error;
pub mod fault;
pub mod hal;
pub mod interp;
pub mod lifecycle;
pub mod output;
pub mod port;
pub mod shim;
pub mod task;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use config::{PortConfig, TaskConfig, TransportKind};
pub use error::{PortError, Result};
pub use fault::{FaultCode, FaultState};
pub use interp::{
    acquire_processing, share, Interpreter, InterpreterHandle, InterpreterLayer, PersistedStore,
    ProcessingGuard,
};
pub use lifecycle::Lifecycle;
pub use output::{Output, OutputWriter, PortWriter};
pub use port::{Port, PortStats};
pub use task::TaskState;

/// Formatted write to a port or an [`OutputWriter`].
///
/// On an `OutputWriter` it appends synchronously; on a [`Port`] it
/// returns the send future.
#[macro_export]
macro_rules! tprintf {
    ($target:expr, $($arg:tt)*) => {
        $target.print($crate::Output::Formatted(format_args!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tprintf_on_output_writer() {
        let mut out = OutputWriter::new();
        tprintf!(out, "{}:{}\r\n", "temp", 41);
        assert_eq!(out.as_bytes(), b"temp:41\r\n");
    }
}
