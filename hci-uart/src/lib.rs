//! # hci-uart - UART Transport Multiplexing Layer
//!
//! hci-uart bridges a raw, flow-controlled byte channel (a UART or any
//! other tty-like device) to a pluggable packet protocol. It provides:
//!
//! - **Protocol registry**: protocols are registered under a small integer id
//!   and selected when a session is bound
//! - **One-shot binding**: a session binds to exactly one protocol for its
//!   whole lifetime
//! - **Non-blocking transmit draining**: outbound frames are moved to the
//!   channel with short-write handling and coalesced wakeups
//! - **Serialized receive dispatch**: inbound chunks reach the protocol one
//!   at a time, in arrival order, with drip-feed flow control
//! - **Upper device registration**: optional packet endpoint with statistics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Upper Dispatch Subsystem (Dispatcher)       │
//! ├─────────────────────────────────────────────────────────┤
//! │                    Protocol Layer                        │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────┐   │
//! │  │  Registry   │ │     H4      │ │ custom protocol │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────┘   │
//! ├─────────────────────────────────────────────────────────┤
//! │                    Session Layer                         │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────┐   │
//! │  │ Control     │ │  TX Drain   │ │  RX Dispatch    │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────┘   │
//! ├─────────────────────────────────────────────────────────┤
//! │                    Channel Layer                         │
//! │  ┌─────────────────────────────────────────────────┐   │
//! │  │        Port + Channel (write/break/baud/...)     │   │
//! │  └─────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hci_uart::{Config, Port, Registry, protocol::{H4, HCI_UART_H4}};
//! use hci_uart::channel::RecordingChannel;
//! use hci_uart::dispatch::LocalDispatcher;
//!
//! let registry = Arc::new(Registry::new());
//! registry.register(HCI_UART_H4, Arc::new(H4::new()))?;
//!
//! let port = Port::new(Arc::new(RecordingChannel::new()));
//! let session = port.open_session(registry, Arc::new(LocalDispatcher::new()), Config::default())?;
//! session.bind_protocol(HCI_UART_H4)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod ioctl;
pub mod port;
pub mod protocol;
pub mod registry;
pub mod session;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use channel::{BaudMode, Channel};
pub use config::{Config, DeviceFlags};
pub use device::{DeviceStats, Dispatcher, UpperDevice};
pub use error::{ChannelError, Error, Result};
pub use frame::{Frame, FrameType};
pub use ioctl::Command;
pub use port::Port;
pub use protocol::{Protocol, ProtocolInstance};
pub use registry::Registry;
pub use session::Session;

/// Driver version reported at registry initialization.
pub const VERSION: &str = "2.3";

/// Number of protocol slots in the registry.
pub const MAX_PROTO: usize = 8;

/// Default receive room advertised to the channel on open.
pub const DEFAULT_RECEIVE_ROOM: usize = 65536;

/// Default number of consecutive zero-length accepts before a stall is reported.
pub const DEFAULT_STALL_THRESHOLD: u32 = 16;
