//! Formatted-output adapter
//!
//! Interpreter responses are collected in an [`OutputWriter`] while the
//! processing lock is held, then sent by the I/O task through the port's
//! transmit path. Code outside the task writes directly with
//! [`Port::print`](crate::Port::print) or a [`PortWriter`].

use core::convert::Infallible;
use core::fmt;

use log::trace;
use termio_shared::{format_bounded, FormatBuffer, PRINTF_BUFFER_LEN};

use crate::error::PortError;
use crate::port::Port;

/// One terminal write: formatted, or pre-formatted bytes passed through
#[derive(Debug, Clone, Copy)]
pub enum Output<'a> {
    /// Rendered into at most `PRINTF_BUFFER_LEN` bytes
    Formatted(fmt::Arguments<'a>),
    /// Sent unmodified
    Raw(&'a [u8]),
}

impl Output<'_> {
    /// Bytes this write puts on the wire
    pub fn render(&self) -> Vec<u8> {
        match self {
            Output::Formatted(args) => {
                let buf: FormatBuffer<PRINTF_BUFFER_LEN> = format_bounded(*args);
                if buf.is_truncated() {
                    trace!("formatted output truncated to {} bytes", buf.len());
                }
                buf.as_bytes().to_vec()
            }
            Output::Raw(bytes) => bytes.to_vec(),
        }
    }
}

/// Response sink passed to the interpreter on every feed
#[derive(Debug, Default)]
pub struct OutputWriter {
    pending: Vec<u8>,
}

impl OutputWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one formatted write, truncated like a bounded `snprintf`
    pub fn printf(&mut self, args: fmt::Arguments<'_>) {
        self.print(Output::Formatted(args));
    }

    /// Append pre-formatted bytes unmodified
    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    pub fn print(&mut self, output: Output<'_>) {
        match output {
            Output::Raw(bytes) => self.put_raw(bytes),
            formatted => self.pending.extend_from_slice(&formatted.render()),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.pending
    }

    /// Take everything written so far
    pub fn take(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.pending)
    }
}

impl fmt::Write for OutputWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.put_raw(s.as_bytes());
        Ok(())
    }

    // `write!` counts as one bounded formatted write
    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> fmt::Result {
        self.printf(args);
        Ok(())
    }
}

impl embedded_io::ErrorType for OutputWriter {
    type Error = Infallible;
}

impl embedded_io::Write for OutputWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.put_raw(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Async writer straight onto a port's transmit path.
///
/// Each `write` holds the transmit permit for the whole buffer.
pub struct PortWriter<'a> {
    port: &'a Port,
}

impl<'a> PortWriter<'a> {
    pub fn new(port: &'a Port) -> Self {
        Self { port }
    }
}

impl embedded_io_async::ErrorType for PortWriter<'_> {
    type Error = PortError;
}

impl embedded_io_async::Write for PortWriter<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.port.send(buf).await
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write as _;

    #[test]
    fn test_printf_formats() {
        let mut out = OutputWriter::new();
        out.printf(format_args!("rpm={} dir={}\r\n", 1200, "fwd"));
        assert_eq!(out.as_bytes(), b"rpm=1200 dir=fwd\r\n");
    }

    #[test]
    fn test_printf_truncates_each_call() {
        let mut out = OutputWriter::new();
        let long = "a".repeat(200);
        out.printf(format_args!("{long}"));
        out.printf(format_args!("{long}"));
        assert_eq!(out.as_bytes().len(), 2 * PRINTF_BUFFER_LEN);
    }

    #[test]
    fn test_raw_passthrough_is_unbounded() {
        let mut out = OutputWriter::new();
        let blob = vec![0x5Au8; 300];
        out.print(Output::Raw(&blob));
        assert_eq!(out.take(), blob);
        assert!(out.is_empty());
    }

    #[test]
    fn test_write_macro_is_bounded() {
        let mut out = OutputWriter::new();
        write!(out, "{}", "b".repeat(500)).unwrap();
        assert_eq!(out.as_bytes().len(), PRINTF_BUFFER_LEN);
    }

    #[test]
    fn test_embedded_io_write() {
        let mut out = OutputWriter::new();
        embedded_io::Write::write_all(&mut out, b"\x1b[2J").unwrap();
        assert_eq!(out.as_bytes(), b"\x1b[2J");
    }
}
