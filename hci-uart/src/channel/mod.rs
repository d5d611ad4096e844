//! Byte channel abstraction.
//!
//! This module provides the `Channel` trait that lets a session drive any
//! raw, flow-controlled byte device (a UART, a pty, a test double).
//! Optional capabilities default to `Error::Unsupported`.
//!
//! # Implementations
//!
//! - `RecordingChannel`: scriptable in-memory channel for testing

mod recording;

pub use recording::RecordingChannel;

use crate::error::{Error, Result};

/// How the channel should treat a requested baud rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudMode {
    /// Program the literal rate, no snapping.
    Exact,

    /// Let the driver pick the closest standard rate.
    Nearest,
}

/// Channel trait for the raw byte device under a session.
///
/// All methods take `&self`: receive, transmit-ready, upper-layer and
/// control contexts call into the same channel concurrently.
pub trait Channel: Send + Sync {
    /// Writes as many bytes as the device accepts right now.
    ///
    /// Returns the number of bytes accepted. A closed or full device
    /// returns `Ok(0)`.
    fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Returns false if the device has no write path at all.
    fn can_write(&self) -> bool {
        true
    }

    /// Asks the device to report back once it can accept more data.
    fn request_write_wakeup(&self) {}

    /// Stops the device from delivering more input.
    fn throttle(&self);

    /// Allows the device to deliver input again.
    fn unthrottle(&self);

    /// Discards any output buffered in the device driver.
    fn flush_buffer(&self);

    /// Discards stale input queued below the session.
    fn flush_input(&self) {}

    /// Returns the number of output bytes still queued in the driver.
    fn chars_in_buffer(&self) -> usize;

    /// Advertises how many bytes the session accepts per delivery.
    fn set_receive_room(&self, _room: usize) {}

    /// Turns a break condition on or off.
    fn set_break(&self, _on: bool) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// Programs the line speed.
    fn set_baud_rate(&self, _baud: u32, _mode: BaudMode) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// Returns the modem control line status bits.
    fn modem_status(&self) -> Result<u32> {
        Err(Error::Unsupported)
    }
}
