//! Port error types

use thiserror::Error;

/// Errors raised while configuring, starting or writing to a port
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortError {
    #[error("invalid port configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("CAN acceptance filter rejected by hardware")]
    FilterRejected,
    #[error("CAN controller failed to start")]
    StartFailed,
    #[error("interpreter layer did not provide a handle")]
    InterpreterUnavailable,
    #[error("an I/O task is already bound to this port")]
    AlreadyRunning,
    #[error("no I/O task is bound to this port")]
    NotRunning,
    #[error("port transmit path closed")]
    Closed,
}

impl embedded_io::Error for PortError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            PortError::InvalidConfig(_) => embedded_io::ErrorKind::InvalidInput,
            PortError::Closed | PortError::NotRunning => embedded_io::ErrorKind::NotConnected,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

/// Result type alias for port operations
pub type Result<T> = core::result::Result<T, PortError>;
