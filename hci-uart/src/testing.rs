//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::channel::RecordingChannel;
use crate::config::Config;
use crate::dispatch::LocalDispatcher;
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameType};
use crate::port::Port;
use crate::protocol::{Protocol, ProtocolInstance};
use crate::registry::Registry;
use crate::session::Session;

/// Registry id used for the probe protocol.
pub(crate) const PROBE_ID: u32 = 3;

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Observable state shared between a probe protocol and the test.
#[derive(Debug, Default)]
pub(crate) struct ProbeState {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub flushes: AtomicUsize,
    pub dequeues: AtomicUsize,
    pub queue: Mutex<VecDeque<Frame>>,
    pub chunks: Mutex<Vec<Vec<u8>>>,
    pub in_recv: AtomicUsize,
    pub max_in_recv: AtomicUsize,
    /// `chars_pending` observed by the last protocol flush.
    pub pending_at_flush: AtomicUsize,
    pub fail_recv: AtomicBool,
    /// Re-enters `tx_wakeup` from inside the next dequeue.
    pub reenter_once: AtomicBool,
    pub reentrant_result: Mutex<Option<Result<()>>>,
}

impl ProbeState {
    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.chunks.lock().unwrap().clone()
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

/// A protocol that queues frames unchanged and records every hook call.
#[derive(Debug, Default)]
pub(crate) struct Probe {
    pub state: Arc<ProbeState>,
    pub fail_open: bool,
    pub self_registers: bool,
    pub recv_delay: Option<Duration>,
}

impl Probe {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Protocol for Probe {
    fn name(&self) -> &'static str {
        "probe"
    }

    fn self_registers_device(&self) -> bool {
        self.self_registers
    }

    fn open(&self, _session: &Session) -> Result<Box<dyn ProtocolInstance>> {
        self.state.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(Error::Protocol("probe open failed"));
        }
        Ok(Box::new(ProbeInstance {
            state: self.state.clone(),
            recv_delay: self.recv_delay,
        }))
    }
}

struct ProbeInstance {
    state: Arc<ProbeState>,
    recv_delay: Option<Duration>,
}

impl ProtocolInstance for ProbeInstance {
    fn enqueue(&self, _session: &Session, frame: Frame) {
        self.state.queue.lock().unwrap().push_back(frame);
    }

    fn dequeue(&self, session: &Session) -> Option<Frame> {
        self.state.dequeues.fetch_add(1, Ordering::SeqCst);
        if self.state.reenter_once.swap(false, Ordering::SeqCst) {
            let result = session.tx_wakeup();
            *self.state.reentrant_result.lock().unwrap() = Some(result);
        }
        self.state.queue.lock().unwrap().pop_front()
    }

    fn recv(&self, _session: &Session, data: &[u8]) -> Result<usize> {
        let active = self.state.in_recv.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_recv.fetch_max(active, Ordering::SeqCst);
        if let Some(delay) = self.recv_delay {
            std::thread::sleep(delay);
        }
        self.state.chunks.lock().unwrap().push(data.to_vec());
        self.state.in_recv.fetch_sub(1, Ordering::SeqCst);

        if self.state.fail_recv.load(Ordering::SeqCst) {
            return Err(Error::Protocol("probe recv failed"));
        }
        Ok(data.len())
    }

    fn flush(&self, session: &Session) {
        self.state
            .pending_at_flush
            .store(session.chars_pending(), Ordering::SeqCst);
        self.state.flushes.fetch_add(1, Ordering::SeqCst);
        self.state.queue.lock().unwrap().clear();
    }

    fn close(&self, _session: &Session) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.state.queue.lock().unwrap().clear();
    }
}

/// A port with an open session and a probe protocol registered.
pub(crate) struct Fixture {
    pub registry: Arc<Registry>,
    pub dispatcher: Arc<LocalDispatcher>,
    pub channel: Arc<RecordingChannel>,
    pub port: Port,
    pub session: Arc<Session>,
    pub probe: Arc<ProbeState>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with(Probe::new(), RecordingChannel::new(), Config::default())
    }

    pub fn with(probe: Probe, channel: RecordingChannel, config: Config) -> Self {
        init_logger();
        let registry = Arc::new(Registry::new());
        let state = probe.state.clone();
        registry.register(PROBE_ID, Arc::new(probe)).unwrap();

        let dispatcher = Arc::new(LocalDispatcher::new());
        let channel = Arc::new(channel);
        let port = Port::new(channel.clone());
        let session = port
            .open_session(registry.clone(), dispatcher.clone(), config)
            .unwrap();

        Self {
            registry,
            dispatcher,
            channel,
            port,
            session,
            probe: state,
        }
    }

    /// Binds the probe and opens its upper device.
    pub fn bound(self) -> Self {
        self.session.bind_protocol(PROBE_ID).unwrap();
        let id = self.session.device_id().unwrap();
        self.dispatcher.open_device(id).unwrap();
        self
    }
}

pub(crate) fn frame(category: FrameType, bytes: &[u8]) -> Frame {
    Frame::new(category, bytes.to_vec())
}
