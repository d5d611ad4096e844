//! Upper device: the packet endpoint registered with the dispatch subsystem.
//!
//! The dispatch subsystem drives the device through four hooks (`open`,
//! `close`, `flush`, `send_frame`); the session feeds its statistics.

use core::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::frame::{Frame, FrameType};
use crate::session::Session;

/// Maximum length of a device name.
pub const DEVICE_NAME_LEN: usize = 16;

/// Upper packet-dispatch subsystem.
///
/// Owns device registration and receives completed inbound frames.
pub trait Dispatcher: Send + Sync {
    /// Registers a device and returns the id assigned to it.
    fn register_device(&self, device: Arc<UpperDevice>) -> Result<u16>;

    /// Removes a device. Unknown ids are ignored.
    fn unregister_device(&self, id: u16);

    /// Hands a completed inbound frame to the device's consumers.
    fn deliver(&self, id: u16, frame: Frame) -> Result<()>;
}

/// Device quirks announced to the dispatch subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quirks(u32);

impl Quirks {
    /// No quirks.
    pub const NONE: Self = Self(0);

    /// Do not reset the controller on initialization.
    pub const NO_RESET: Self = Self(1 << 0);

    /// Raw device, no protocol-level setup.
    pub const RAW_DEVICE: Self = Self(1 << 1);

    /// Returns the raw bits.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Checks if a quirk is set.
    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns the union of two quirk sets.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Snapshot of device statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStats {
    /// Bytes accepted by the channel.
    pub byte_tx: u64,

    /// Bytes delivered to the protocol.
    pub byte_rx: u64,

    /// Command frames fully sent.
    pub cmd_tx: u64,

    /// ACL frames fully sent.
    pub acl_tx: u64,

    /// SCO frames fully sent.
    pub sco_tx: u64,

    /// Receive errors reported by the protocol.
    pub err_rx: u64,
}

#[derive(Debug, Default)]
struct Counters {
    byte_tx: AtomicU64,
    byte_rx: AtomicU64,
    cmd_tx: AtomicU64,
    acl_tx: AtomicU64,
    sco_tx: AtomicU64,
    err_rx: AtomicU64,
}

#[derive(Debug)]
struct Identity {
    id: u16,
    name: heapless::String<DEVICE_NAME_LEN>,
}

/// A registered packet endpoint backed by a session.
#[derive(Debug)]
pub struct UpperDevice {
    identity: OnceLock<Identity>,
    running: AtomicBool,
    quirks: Quirks,
    counters: Counters,
    session: Weak<Session>,
}

impl UpperDevice {
    pub(crate) fn new(quirks: Quirks, session: Weak<Session>) -> Self {
        Self {
            identity: OnceLock::new(),
            running: AtomicBool::new(false),
            quirks,
            counters: Counters::default(),
            session,
        }
    }

    /// Records the id and name assigned at registration.
    pub(crate) fn assign_id(&self, id: u16, prefix: &str) {
        let mut name = heapless::String::new();
        if write!(name, "{}{}", prefix, id).is_err() {
            warn!("device name {}{} truncated", prefix, id);
        }
        if self.identity.set(Identity { id, name }).is_err() {
            warn!("device id already assigned, keeping the first one");
        }
    }

    /// Returns the id assigned by the dispatch subsystem.
    pub fn id(&self) -> Option<u16> {
        self.identity.get().map(|identity| identity.id)
    }

    /// Returns the device name, empty until registered.
    pub fn name(&self) -> &str {
        self.identity.get().map_or("", |identity| identity.name.as_str())
    }

    /// Returns the quirks set at creation.
    pub fn quirks(&self) -> Quirks {
        self.quirks
    }

    /// Returns true between `open` and `close`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns a snapshot of the statistics.
    pub fn stats(&self) -> DeviceStats {
        let c = &self.counters;
        DeviceStats {
            byte_tx: c.byte_tx.load(Ordering::Relaxed),
            byte_rx: c.byte_rx.load(Ordering::Relaxed),
            cmd_tx: c.cmd_tx.load(Ordering::Relaxed),
            acl_tx: c.acl_tx.load(Ordering::Relaxed),
            sco_tx: c.sco_tx.load(Ordering::Relaxed),
            err_rx: c.err_rx.load(Ordering::Relaxed),
        }
    }

    /// Open hook: marks the device running. Nothing else to do for a UART.
    pub fn open(&self) -> Result<()> {
        debug!("{} open", self.name());
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    /// Close hook: stops the device and flushes the session if it was running.
    pub fn close(&self) -> Result<()> {
        debug!("{} close", self.name());
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        match self.session.upgrade() {
            Some(session) => session.flush_buffers(),
            None => Ok(()),
        }
    }

    /// Flush hook: discards pending output in the session.
    pub fn flush(&self) -> Result<()> {
        let session = self.session.upgrade().ok_or(Error::NoSuchDevice)?;
        session.flush_buffers()
    }

    /// Send hook: queues one frame on the bound protocol and triggers a drain.
    pub fn send_frame(&self, frame: Frame) -> Result<()> {
        let session = self.session.upgrade().ok_or(Error::NoSuchDevice)?;
        if session.is_closed() {
            return Err(Error::Gone);
        }
        if !self.is_running() {
            return Err(Error::DeviceNotRunning);
        }

        debug!("{}: type {:?} len {}", self.name(), frame.category(), frame.len());
        session.send_frame(frame)
    }

    pub(crate) fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub(crate) fn record_tx_bytes(&self, n: usize) {
        self.counters.byte_tx.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_rx_bytes(&self, n: usize) {
        self.counters.byte_rx.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_rx_error(&self) {
        self.counters.err_rx.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_tx_complete(&self, category: FrameType) {
        let counter = match category {
            FrameType::Command => &self.counters.cmd_tx,
            FrameType::AclData => &self.counters.acl_tx,
            FrameType::ScoData => &self.counters.sco_tx,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_id_names_device() {
        let device = UpperDevice::new(Quirks::NO_RESET, Weak::new());
        assert_eq!(device.id(), None);
        assert_eq!(device.name(), "");

        device.assign_id(3, "hci");
        assert_eq!(device.id(), Some(3));
        assert_eq!(device.name(), "hci3");

        device.assign_id(4, "hci");
        assert_eq!(device.id(), Some(3));
    }

    #[test]
    fn test_tx_complete_counts_per_category() {
        let device = UpperDevice::new(Quirks::NONE, Weak::new());
        device.record_tx_complete(FrameType::Command);
        device.record_tx_complete(FrameType::AclData);
        device.record_tx_complete(FrameType::AclData);
        device.record_tx_complete(FrameType::Event);
        device.record_tx_bytes(12);

        let stats = device.stats();
        assert_eq!(stats.cmd_tx, 1);
        assert_eq!(stats.acl_tx, 2);
        assert_eq!(stats.sco_tx, 0);
        assert_eq!(stats.byte_tx, 12);
    }

    #[test]
    fn test_send_without_session() {
        let device = UpperDevice::new(Quirks::NONE, Weak::new());
        device.open().unwrap();
        let result = device.send_frame(Frame::new(FrameType::Command, vec![1]));
        assert_eq!(result, Err(Error::NoSuchDevice));
    }

    #[test]
    fn test_close_is_idempotent() {
        let device = UpperDevice::new(Quirks::NONE, Weak::new());
        device.open().unwrap();
        assert!(device.is_running());
        device.close().unwrap();
        device.close().unwrap();
        assert!(!device.is_running());
    }
}
