//! Bounded formatting for terminal output
//!
//! Formatted writes render into a fixed stack buffer and are cut off at
//! its capacity, the way a bounded `snprintf` behaves. Formatting never
//! fails because of truncation.

use core::fmt;

use heapless::Vec;

/// Capacity of one formatted terminal write
pub const PRINTF_BUFFER_LEN: usize = 128;

/// Fixed-capacity byte sink implementing [`fmt::Write`]
#[derive(Debug, Clone, Default)]
pub struct FormatBuffer<const N: usize = PRINTF_BUFFER_LEN> {
    buf: Vec<u8, N>,
    truncated: bool,
}

impl<const N: usize> FormatBuffer<N> {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            truncated: false,
        }
    }

    /// Rendered bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Whether output was cut off at capacity
    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl<const N: usize> fmt::Write for FormatBuffer<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = N - self.buf.len();
        let bytes = s.as_bytes();
        let take = bytes.len().min(room);
        // take <= remaining capacity
        let _ = self.buf.extend_from_slice(&bytes[..take]);
        if take < bytes.len() {
            self.truncated = true;
        }
        Ok(())
    }
}

/// Render `args` into a buffer of at most `N` bytes
pub fn format_bounded<const N: usize>(args: fmt::Arguments<'_>) -> FormatBuffer<N> {
    let mut out = FormatBuffer::new();
    let _ = fmt::write(&mut out, args);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_output_fits() {
        let out: FormatBuffer = format_bounded(format_args!("vbus={:.1}V", 48.31));
        assert_eq!(out.as_bytes(), b"vbus=48.3V");
        assert!(!out.is_truncated());
    }

    #[test]
    fn test_long_output_truncates_at_capacity() {
        let long = "x".repeat(300);
        let out: FormatBuffer = format_bounded(format_args!("{long}"));
        assert_eq!(out.len(), PRINTF_BUFFER_LEN);
        assert!(out.is_truncated());
    }

    #[test]
    fn test_truncation_spans_pieces() {
        let out: FormatBuffer<8> = format_bounded(format_args!("{}-{}", "abcde", "fghij"));
        assert_eq!(out.as_bytes(), b"abcde-fg");
    }
}
