//! Transport session.
//!
//! A session binds one channel to at most one protocol instance for its
//! whole lifetime. It owns the TX drain state, the held partial frame and
//! the RX guard, and exposes the control plane:
//!
//! - `bind_protocol`: one-shot, rolled back on failure
//! - `protocol_id` / `device_id`: queries on the binding
//! - `set_pre_bind_flags` / `flags`: device options, frozen once bound
//!
//! Teardown happens through `Port::close`: output is flushed, the protocol
//! is closed, its upper device unregistered, and the port drops the session
//! together with its channel.

mod rx;
mod tx;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use log::{debug, error, info, warn};

use crate::channel::{BaudMode, Channel};
use crate::config::{Config, DeviceFlags};
use crate::device::{DeviceStats, Dispatcher, Quirks, UpperDevice};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::protocol::{Protocol, ProtocolInstance};
use crate::registry::Registry;

use tx::TxState;

/// A bound protocol and everything created with it.
struct Binding {
    id: u32,
    protocol: Arc<dyn Protocol>,
    instance: Box<dyn ProtocolInstance>,
    device: Option<Arc<UpperDevice>>,
}

/// Live binding between one channel and one protocol instance.
pub struct Session {
    channel: Arc<dyn Channel>,
    registry: Arc<Registry>,
    dispatcher: Arc<dyn Dispatcher>,
    config: Config,
    self_ref: Weak<Session>,

    /// Set once a bind has been claimed; cleared only by a failed bind or close.
    proto_set: AtomicBool,
    binding: RwLock<Option<Arc<Binding>>>,
    flags: AtomicU32,
    /// Orders the bind claim against pre-bind flag updates.
    control: Mutex<()>,
    closed: AtomicBool,

    tx: TxState,
    rx_lock: Mutex<()>,
}

impl Session {
    /// Creates a session on a channel and clears stale input.
    pub(crate) fn open(
        channel: Arc<dyn Channel>,
        registry: Arc<Registry>,
        dispatcher: Arc<dyn Dispatcher>,
        config: Config,
    ) -> Result<Arc<Self>> {
        if !channel.can_write() {
            warn!("refusing session on a channel without a write path");
            return Err(Error::Unsupported);
        }

        channel.set_receive_room(config.receive_room);
        channel.flush_input();
        channel.flush_buffer();

        let session = Arc::new_cyclic(|self_ref| Session {
            channel,
            registry,
            dispatcher,
            config,
            self_ref: self_ref.clone(),
            proto_set: AtomicBool::new(false),
            binding: RwLock::new(None),
            flags: AtomicU32::new(0),
            control: Mutex::new(()),
            closed: AtomicBool::new(false),
            tx: TxState::new(),
            rx_lock: Mutex::new(()),
        });
        debug!("session opened");
        Ok(session)
    }

    /// Returns the session configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the channel under this session.
    pub fn channel(&self) -> &dyn Channel {
        self.channel.as_ref()
    }

    /// Returns true once the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Gone);
        }
        Ok(())
    }

    fn current(&self) -> Option<Arc<Binding>> {
        self.binding
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn bound(&self) -> Result<Arc<Binding>> {
        self.ensure_open()?;
        self.current().ok_or(Error::NotBound)
    }

    // ------------------------------------------------------------------
    // Control plane
    // ------------------------------------------------------------------

    /// Binds the protocol registered under `id`.
    ///
    /// Succeeds at most once per session. If the protocol's open hook or the
    /// upper device registration fails, the session returns to the unbound
    /// state and the error is propagated.
    pub fn bind_protocol(&self, id: u32) -> Result<()> {
        self.ensure_open()?;
        {
            let _control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
            if self.proto_set.swap(true, Ordering::AcqRel) {
                warn!("protocol already bound, rejecting bind to {}", id);
                return Err(Error::AlreadyBound);
            }
        }

        match self.set_proto(id) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.proto_set.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn set_proto(&self, id: u32) -> Result<()> {
        let protocol = self.registry.lookup(id)?;
        let instance = protocol.open(self)?;
        debug!("protocol {} (id {}) opened", protocol.name(), id);

        let device = if protocol.self_registers_device() {
            None
        } else {
            Some(Arc::new(UpperDevice::new(self.quirks(), self.self_ref.clone())))
        };

        let binding = Arc::new(Binding {
            id,
            protocol,
            instance,
            device,
        });

        {
            let mut slot = self.binding.write().unwrap_or_else(PoisonError::into_inner);
            if self.is_closed() {
                drop(slot);
                binding.instance.close(self);
                return Err(Error::Gone);
            }
            *slot = Some(binding.clone());
        }

        if let Some(device) = &binding.device {
            if let Err(e) = self.register_device(device) {
                error!("can't register upper device: {}", e);
                if self.unpublish(&binding) {
                    binding.instance.close(self);
                }
                return Err(e);
            }
        }

        info!("bound protocol {} (id {})", binding.protocol.name(), id);
        Ok(())
    }

    /// Withdraws `binding` if it is still the published one.
    ///
    /// Returns false when a concurrent close already took it, in which case
    /// that close owns the protocol teardown.
    fn unpublish(&self, binding: &Arc<Binding>) -> bool {
        let mut slot = self.binding.write().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(current) if Arc::ptr_eq(current, binding) => {
                slot.take();
                true
            }
            _ => false,
        }
    }

    fn quirks(&self) -> Quirks {
        let flags = self.flags();
        let mut quirks = Quirks::NONE;
        if !(self.config.reset_on_init || flags.contains(DeviceFlags::RESET_ON_INIT)) {
            quirks = quirks.union(Quirks::NO_RESET);
        }
        if flags.contains(DeviceFlags::RAW_DEVICE) {
            quirks = quirks.union(Quirks::RAW_DEVICE);
        }
        quirks
    }

    /// Registers the upper device created for this binding.
    fn register_device(&self, device: &Arc<UpperDevice>) -> Result<()> {
        let id = self.dispatcher.register_device(device.clone())?;
        device.assign_id(id, self.config.device_name_prefix);
        if self.is_closed() {
            device.shutdown();
            self.dispatcher.unregister_device(id);
            return Err(Error::Gone);
        }
        info!("registered upper device {}", device.name());
        Ok(())
    }

    /// Returns the id of the bound protocol.
    pub fn protocol_id(&self) -> Result<u32> {
        if !self.proto_set.load(Ordering::Acquire) {
            return Err(Error::NotBound);
        }
        self.bound().map(|binding| binding.id)
    }

    /// Returns the id of the upper device registered for the binding.
    pub fn device_id(&self) -> Result<u16> {
        if !self.proto_set.load(Ordering::Acquire) {
            return Err(Error::NotBound);
        }
        let binding = self.bound()?;
        binding
            .device
            .as_ref()
            .and_then(|device| device.id())
            .ok_or(Error::NoDevice)
    }

    /// Sets the device flags used when the protocol is bound.
    pub fn set_pre_bind_flags(&self, flags: DeviceFlags) -> Result<()> {
        let _control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        if self.proto_set.load(Ordering::Acquire) {
            return Err(Error::AlreadyBound);
        }
        self.flags.store(flags.bits(), Ordering::Release);
        Ok(())
    }

    /// Returns the device flags.
    pub fn flags(&self) -> DeviceFlags {
        DeviceFlags::from_bits(self.flags.load(Ordering::Acquire))
    }

    /// Returns the upper device, if the session registered one.
    pub fn device(&self) -> Option<Arc<UpperDevice>> {
        self.current().and_then(|binding| binding.device.clone())
    }

    /// Returns the upper device statistics, if the session registered one.
    pub fn stats(&self) -> Option<DeviceStats> {
        self.device().map(|device| device.stats())
    }

    /// Tears the session down: flush output, close the protocol, unregister
    /// the upper device.
    ///
    /// Only the owning port calls this. A second call is a no-op.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("session closing");

        let binding = self
            .binding
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.proto_set.store(false, Ordering::Release);

        self.tx.discard_held();
        let Some(binding) = binding else {
            self.channel.flush_buffer();
            return;
        };

        if let Some(device) = &binding.device {
            device.shutdown();
        }
        binding.instance.flush(self);
        self.channel.flush_buffer();

        binding.instance.close(self);
        debug!("protocol {} closed", binding.protocol.name());

        if let Some(id) = binding.device.as_ref().and_then(|device| device.id()) {
            self.dispatcher.unregister_device(id);
        }
    }

    // ------------------------------------------------------------------
    // Frame paths
    // ------------------------------------------------------------------

    /// Queues an outbound frame on the bound protocol and triggers a drain.
    pub fn send_frame(&self, frame: Frame) -> Result<()> {
        let binding = self.bound()?;
        binding.instance.enqueue(self, frame);
        self.tx_wakeup()
    }

    /// Hands a completed inbound frame to the upper device.
    pub fn deliver_frame(&self, frame: Frame) -> Result<()> {
        let binding = self.bound()?;
        let id = binding
            .device
            .as_ref()
            .and_then(|device| device.id())
            .ok_or(Error::NoDevice)?;
        self.dispatcher.deliver(id, frame)
    }

    /// Counts a receive error against the upper device.
    pub fn record_rx_error(&self) {
        if let Some(device) = self.device() {
            device.record_rx_error();
        }
    }

    /// Channel callback: the device can accept more data.
    pub fn write_wakeup(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        match self.current() {
            Some(binding) => binding.instance.send_callback(self),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Channel control
    // ------------------------------------------------------------------

    /// Programs the literal line speed, bypassing nearest-rate snapping.
    pub fn set_baud_rate(&self, baud: u32) -> Result<()> {
        self.ensure_open()?;
        debug!("set baud rate {}", baud);
        self.channel.set_baud_rate(baud, BaudMode::Exact)
    }

    /// Turns a break condition on or off.
    pub fn set_break(&self, on: bool) -> Result<()> {
        self.ensure_open()?;
        self.channel.set_break(on)
    }

    /// `false` throttles input, `true` unthrottles it.
    pub fn flow_control(&self, on: bool) {
        if on {
            self.channel.unthrottle();
        } else {
            self.channel.throttle();
        }
    }

    /// Discards pending output: the held frame, the protocol queue, then the
    /// channel buffers.
    pub fn flush_buffers(&self) -> Result<()> {
        self.ensure_open()?;
        debug!("flush buffers");
        self.tx.discard_held();
        if let Some(binding) = self.current() {
            binding.instance.flush(self);
        }
        self.channel.flush_input();
        self.channel.flush_buffer();
        Ok(())
    }

    /// Returns the number of output bytes still queued in the channel.
    pub fn chars_pending(&self) -> usize {
        self.channel.chars_in_buffer()
    }

    /// Returns the modem control lines. Requires a bound protocol.
    pub fn modem_status(&self) -> Result<u32> {
        self.ensure_open()?;
        if !self.proto_set.load(Ordering::Acquire) {
            return Err(Error::Unsupported);
        }
        self.channel.modem_status()
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("protocol", &self.protocol_id().ok())
            .field("flags", &self.flags())
            .field("closed", &self.is_closed())
            .finish()
    }
}
