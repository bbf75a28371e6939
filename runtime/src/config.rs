//! Port and task configuration

use std::time::Duration;

use termio_shared::{CanFilter, StandardId, CLI_CAN_ID};

use crate::error::{PortError, Result};

/// Physical transport behind a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// DMA-fed asynchronous serial line
    Serial,
    /// USB CDC virtual serial interface
    Usb,
    /// CAN bus, frame addressed
    Can,
}

impl TransportKind {
    /// Name the interpreter handle is registered under
    pub const fn handle_name(&self) -> &'static str {
        match self {
            TransportKind::Serial => "uart",
            TransportKind::Usb => "usb",
            TransportKind::Can => "CAN",
        }
    }
}

/// Static parameters of one physical channel
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Name used in log messages
    pub name: &'static str,
    /// Receive buffer capacity in bytes (power of two for serial)
    pub rx_capacity: usize,
    /// Suppress the receiver while transmitting (serial only)
    pub half_duplex: bool,
    /// Identifier for terminal frames (CAN only)
    pub can_id: StandardId,
    /// Hardware acceptance filter (CAN only)
    pub can_filter: CanFilter,
}

impl PortConfig {
    /// Serial port with a `rx_capacity` byte DMA ring
    pub fn serial(name: &'static str, rx_capacity: usize) -> Self {
        Self {
            name,
            rx_capacity,
            ..Self::default()
        }
    }

    /// USB port with a `rx_capacity` byte receive queue
    pub fn usb(name: &'static str, rx_capacity: usize) -> Self {
        Self {
            name,
            rx_capacity,
            ..Self::default()
        }
    }

    /// CAN port using the default terminal identifier
    pub fn can(name: &'static str) -> Self {
        Self {
            name,
            rx_capacity: 0,
            ..Self::default()
        }
    }

    pub fn with_half_duplex(mut self, half_duplex: bool) -> Self {
        self.half_duplex = half_duplex;
        self
    }

    pub fn with_can_id(mut self, id: StandardId) -> Self {
        self.can_id = id;
        self
    }

    /// Check the parameters that matter for `kind`
    pub fn validate(&self, kind: TransportKind) -> Result<()> {
        match kind {
            TransportKind::Serial if !self.rx_capacity.is_power_of_two() => Err(
                PortError::InvalidConfig("serial rx capacity must be a power of two"),
            ),
            TransportKind::Usb if self.rx_capacity == 0 => {
                Err(PortError::InvalidConfig("usb rx capacity must be non-zero"))
            }
            TransportKind::Usb | TransportKind::Can if self.half_duplex => Err(
                PortError::InvalidConfig("half duplex applies to serial ports only"),
            ),
            _ => Ok(()),
        }
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            name: "term",
            rx_capacity: 256,
            half_duplex: false,
            can_id: CLI_CAN_ID,
            can_filter: CanFilter::accept_all(),
        }
    }
}

/// Timing of the I/O task
#[derive(Debug, Clone, Copy)]
pub struct TaskConfig {
    /// Scheduler tick: yield granularity and shutdown poll interval
    pub tick: Duration,
    /// How long one USB queue read waits before giving up
    pub usb_poll_timeout: Duration,
    /// How long `kill` waits for the task to terminate
    pub kill_grace: Duration,
}

impl Default for TaskConfig {
    fn default() -> Self {
        let tick = Duration::from_millis(1);
        Self {
            tick,
            usb_poll_timeout: tick,
            kill_grace: tick * 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_config_default() {
        let config = TaskConfig::default();
        assert_eq!(config.tick, Duration::from_millis(1));
        assert_eq!(config.usb_poll_timeout, config.tick);
        assert_eq!(config.kill_grace, Duration::from_millis(200));
    }

    #[test]
    fn test_serial_capacity_must_be_power_of_two() {
        assert!(PortConfig::serial("uart1", 256)
            .validate(TransportKind::Serial)
            .is_ok());
        assert_eq!(
            PortConfig::serial("uart1", 100).validate(TransportKind::Serial),
            Err(PortError::InvalidConfig(
                "serial rx capacity must be a power of two"
            ))
        );
    }

    #[test]
    fn test_half_duplex_is_serial_only() {
        let config = PortConfig::usb("usb", 64).with_half_duplex(true);
        assert!(config.validate(TransportKind::Usb).is_err());
        let config = PortConfig::serial("uart", 64).with_half_duplex(true);
        assert!(config.validate(TransportKind::Serial).is_ok());
    }

    #[test]
    fn test_usb_capacity_non_zero() {
        assert!(PortConfig::usb("usb", 0).validate(TransportKind::Usb).is_err());
    }
}
