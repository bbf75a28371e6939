//! # Shared Terminal I/O Core
//!
//! Hardware-independent building blocks for the multi-transport terminal:
//!
//! - **Ring Cursor**: DMA write-position arithmetic for the serial receiver
//! - **CAN Framing**: 8-byte fragmentation under a fixed identifier
//! - **NVM Sequencer**: clear / start / write / end flash programming
//! - **Persisted Codec**: `serde` values stored as flash records
//! - **Bounded Formatting**: truncating formatter for terminal writes
//!
//! ## Data Flow
//!
//! ```text
//! DMA ring ──┐
//! USB queue ─┼──► I/O task ──► interpreter ──► formatter ──► transport send
//! CAN FIFO ──┘                     │
//!                                  └──► NVM sequencer ──► flash
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

pub mod can;
pub mod fmt;
pub mod nvm;
pub mod persist;
pub mod ring;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export main types for convenience
pub use can::{fragment, CanFilter, CanFrame, FrameError, StandardId, CLASSIC_MTU, CLI_CAN_ID};
pub use fmt::{format_bounded, FormatBuffer, PRINTF_BUFFER_LEN};
pub use nvm::{FlashController, FlashError, NvmSequencer, WriteSession, FLASH_TIMEOUT_MS};
pub use persist::{CodecError, PersistRegion, WriteOutcome};
pub use ring::{dma_write_position, RxCursor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
