//! In-process dispatch subsystem.
//!
//! `LocalDispatcher` keeps registered devices in a table and records every
//! delivered frame. It stands in for the packet stack above the session in
//! tests and demos.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info};

use crate::device::{Dispatcher, UpperDevice};
use crate::error::{Error, Result};
use crate::frame::Frame;

#[derive(Debug, Default)]
struct Inner {
    devices: HashMap<u16, Arc<UpperDevice>>,
    received: HashMap<u16, Vec<Frame>>,
    next_id: u16,
    refuse: bool,
}

/// Device table plus a log of delivered frames.
#[derive(Debug, Default)]
pub struct LocalDispatcher {
    inner: Mutex<Inner>,
}

impl LocalDispatcher {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every following registration fail.
    pub fn refuse_registrations(&self, refuse: bool) {
        self.lock().refuse = refuse;
    }

    /// Returns a registered device.
    pub fn device(&self, id: u16) -> Option<Arc<UpperDevice>> {
        self.lock().devices.get(&id).cloned()
    }

    /// Returns the ids of all registered devices.
    pub fn device_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.lock().devices.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the frames delivered for a device so far.
    pub fn received(&self, id: u16) -> Vec<Frame> {
        self.lock().received.get(&id).cloned().unwrap_or_default()
    }

    /// Opens a registered device.
    pub fn open_device(&self, id: u16) -> Result<()> {
        let device = self.device(id).ok_or(Error::NoSuchDevice)?;
        device.open()
    }

    /// Closes a registered device.
    pub fn close_device(&self, id: u16) -> Result<()> {
        let device = self.device(id).ok_or(Error::NoSuchDevice)?;
        device.close()
    }

    /// Submits an outbound frame to a device by id.
    pub fn submit(&self, id: u16, frame: Frame) -> Result<()> {
        let device = self.device(id).ok_or(Error::NoSuchDevice)?;
        device.send_frame(frame)
    }
}

impl Dispatcher for LocalDispatcher {
    fn register_device(&self, device: Arc<UpperDevice>) -> Result<u16> {
        let mut inner = self.lock();
        if inner.refuse {
            return Err(Error::RegistrationFailed);
        }
        let id = inner.next_id;
        inner.next_id = inner.next_id.wrapping_add(1);
        inner.devices.insert(id, device);
        info!("registered device {}", id);
        Ok(id)
    }

    fn unregister_device(&self, id: u16) {
        if self.lock().devices.remove(&id).is_some() {
            info!("unregistered device {}", id);
        }
    }

    fn deliver(&self, id: u16, frame: Frame) -> Result<()> {
        let mut inner = self.lock();
        if !inner.devices.contains_key(&id) {
            return Err(Error::NoSuchDevice);
        }
        debug!("device {} received {:?} frame, {} bytes", id, frame.category(), frame.len());
        inner.received.entry(id).or_default().push(frame);
        Ok(())
    }
}
