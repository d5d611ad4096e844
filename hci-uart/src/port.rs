//! Channel port.
//!
//! A `Port` is one channel plus the slot for the session attached to it.
//! Its methods are the callbacks the channel driver invokes: open, close,
//! receive, write wakeup and control commands.

use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, trace};

use crate::channel::Channel;
use crate::config::Config;
use crate::device::Dispatcher;
use crate::error::{Error, Result};
use crate::ioctl::Command;
use crate::registry::Registry;
use crate::session::Session;

/// A channel and its attached session.
pub struct Port {
    channel: Arc<dyn Channel>,
    session: RwLock<Option<Arc<Session>>>,
}

impl Port {
    /// Creates a port with no session attached.
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self {
            channel,
            session: RwLock::new(None),
        }
    }

    /// Returns the channel.
    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    /// Returns the attached session.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Attaches a new session to the channel.
    pub fn open_session(
        &self,
        registry: Arc<Registry>,
        dispatcher: Arc<dyn Dispatcher>,
        config: Config,
    ) -> Result<Arc<Session>> {
        let mut slot = self.session.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(Error::AlreadyOpen);
        }
        let session = Session::open(self.channel.clone(), registry, dispatcher, config)?;
        *slot = Some(session.clone());
        Ok(session)
    }

    /// Detaches and tears down the session. Does nothing if none is attached.
    pub fn close(&self) {
        let session = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(session) = session {
            session.close();
            debug!("session detached from port");
        }
    }

    /// Channel callback: inbound bytes.
    pub fn receive(&self, data: &[u8]) {
        let Some(session) = self.session() else {
            return;
        };
        if let Err(e) = session.receive(data) {
            trace!("receive dropped {} bytes: {}", data.len(), e);
        }
    }

    /// Channel callback: the device can take more output.
    pub fn write_wakeup(&self) {
        let Some(session) = self.session() else {
            return;
        };
        if let Err(e) = session.write_wakeup() {
            debug!("write wakeup failed: {}", e);
        }
    }

    /// Control command on the port.
    pub fn ioctl(&self, cmd: u32, arg: u32) -> Result<u32> {
        let session = self.session().ok_or(Error::Gone)?;
        session.ioctl(Command::decode(cmd, arg)?)
    }
}

impl core::fmt::Debug for Port {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Port")
            .field("session", &self.session())
            .finish()
    }
}
