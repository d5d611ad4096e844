//! Pluggable packet protocols.
//!
//! A `Protocol` is the registry entry: it names the protocol and opens a
//! per-session `ProtocolInstance` when a session binds to it. The instance
//! owns the outbound queue and any receive reassembly state.

mod h4;

pub use h4::H4;

use crate::error::Result;
use crate::frame::Frame;
use crate::session::Session;

/// H4 (UART, packet type prefix).
pub const HCI_UART_H4: u32 = 0;

// Reserved ids for protocols registered from outside this crate. Only H4
// ships here; the numbers stay stable so `SetProto` callers agree on them.

/// BlueCore Serial Protocol.
pub const HCI_UART_BCSP: u32 = 1;
/// Three-wire UART.
pub const HCI_UART_3WIRE: u32 = 2;
/// H4 with deep sleep.
pub const HCI_UART_H4DS: u32 = 3;
/// HCILL low-power protocol.
pub const HCI_UART_LL: u32 = 4;
/// Atheros AR300x.
pub const HCI_UART_ATH3K: u32 = 5;

/// A protocol implementation selectable by id.
pub trait Protocol: Send + Sync {
    /// Short protocol name for logs.
    fn name(&self) -> &'static str;

    /// Returns true if the protocol registers its own upper device.
    ///
    /// When false, the session creates and registers one after `open`.
    fn self_registers_device(&self) -> bool {
        false
    }

    /// Opens the protocol on a session.
    ///
    /// Called exactly once per successful bind. The returned instance lives
    /// until the session closes.
    fn open(&self, session: &Session) -> Result<Box<dyn ProtocolInstance>>;
}

/// Per-session protocol state.
///
/// Every method may be called from a different context than the previous
/// one. `recv` calls never overlap for one session.
pub trait ProtocolInstance: Send + Sync {
    /// Queues one outbound frame.
    fn enqueue(&self, session: &Session, frame: Frame);

    /// Pops the next outbound frame, already framed for the wire.
    fn dequeue(&self, session: &Session) -> Option<Frame>;

    /// Consumes one inbound chunk.
    ///
    /// Returns the number of bytes consumed.
    fn recv(&self, session: &Session, data: &[u8]) -> Result<usize>;

    /// Discards queued outbound frames.
    fn flush(&self, session: &Session);

    /// Called when the channel can accept more data.
    fn send_callback(&self, session: &Session) -> Result<()> {
        session.tx_wakeup()
    }

    /// Releases the queue and any protocol-owned registration.
    fn close(&self, session: &Session);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::MAX_PROTO;
    use std::sync::Arc;

    #[test]
    fn test_ids_fit_registry() {
        let ids = [
            HCI_UART_H4,
            HCI_UART_BCSP,
            HCI_UART_3WIRE,
            HCI_UART_H4DS,
            HCI_UART_LL,
            HCI_UART_ATH3K,
        ];
        let registry = Registry::new();
        for (i, id) in ids.iter().enumerate() {
            assert!((*id as usize) < MAX_PROTO);
            assert!(!ids[..i].contains(id));
            registry.register(*id, Arc::new(H4::new())).unwrap();
        }
        assert_eq!(registry.registered().len(), ids.len());
    }
}
