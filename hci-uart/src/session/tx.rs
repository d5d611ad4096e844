//! TX drain engine.
//!
//! Moves frames from the protocol's outbound queue to the channel. The
//! drain is claimed with an atomic swap on `sending`; a caller that loses
//! the claim sets `wakeup` instead and returns, and the claiming drain
//! restarts its pass. Nobody ever blocks on the drain, so a transmit-ready
//! callback fired from inside a channel write cannot wait on itself.
//!
//! A frame the channel only partly accepted stays in `held` and is always
//! finished before the next frame is dequeued.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, trace, warn};

use super::{Binding, Session};
use crate::error::Result;
use crate::frame::Frame;

#[derive(Debug)]
pub(super) struct TxState {
    sending: AtomicBool,
    wakeup: AtomicBool,
    held: Mutex<Option<Frame>>,
    /// Bumped on every discard, under the `held` lock.
    flush_gen: AtomicU64,
    zero_accepts: AtomicU32,
    stalled: AtomicBool,
}

impl TxState {
    pub(super) fn new() -> Self {
        Self {
            sending: AtomicBool::new(false),
            wakeup: AtomicBool::new(false),
            held: Mutex::new(None),
            flush_gen: AtomicU64::new(0),
            zero_accepts: AtomicU32::new(0),
            stalled: AtomicBool::new(false),
        }
    }

    fn held(&self) -> MutexGuard<'_, Option<Frame>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops the partially sent frame, if any.
    ///
    /// A frame that is out on the wire right now is dropped when its write
    /// returns.
    pub(super) fn discard_held(&self) {
        let mut held = self.held();
        self.flush_gen.fetch_add(1, Ordering::SeqCst);
        if let Some(frame) = held.take() {
            debug!("discarding held frame, {} bytes unsent", frame.len());
        }
        drop(held);
        self.zero_accepts.store(0, Ordering::Relaxed);
    }
}

impl Session {
    /// Requests a drain of the outbound queue.
    ///
    /// Returns immediately if another context is draining; that drain picks
    /// up the request before it lets go of the claim. Channel write errors
    /// abort the pass and are returned to the caller.
    pub fn tx_wakeup(&self) -> Result<()> {
        let binding = self.bound()?;

        if !self.claim() {
            trace!("tx busy, wakeup deferred");
            return Ok(());
        }

        loop {
            let result = self.drain(&binding);
            self.tx.sending.store(false, Ordering::SeqCst);
            result?;

            // A wakeup posted between the last check and the release above
            // would otherwise be lost.
            if !self.tx.wakeup.load(Ordering::SeqCst) || !self.try_claim() {
                return Ok(());
            }
        }
    }

    fn try_claim(&self) -> bool {
        !self.tx.sending.swap(true, Ordering::SeqCst)
    }

    /// Claims the drain, or leaves a wakeup request for the current owner.
    fn claim(&self) -> bool {
        if self.try_claim() {
            return true;
        }
        self.tx.wakeup.store(true, Ordering::SeqCst);
        // The owner may have released the claim before seeing the request.
        self.try_claim()
    }

    /// Runs passes until no wakeup arrived during the last one.
    fn drain(&self, binding: &Binding) -> Result<()> {
        loop {
            self.tx.wakeup.store(false, Ordering::SeqCst);
            self.drain_pass(binding)?;
            if !self.tx.wakeup.load(Ordering::SeqCst) {
                return Ok(());
            }
            debug!("tx wakeup during drain, restarting");
        }
    }

    /// Writes frames until the queue is empty or the channel is full.
    fn drain_pass(&self, binding: &Binding) -> Result<()> {
        while !self.is_closed() {
            let Some((mut frame, generation)) = self.next_frame(binding) else {
                break;
            };

            self.channel.request_write_wakeup();
            let n = match self.channel.write(frame.remaining()) {
                Ok(n) => n,
                Err(e) => {
                    warn!("channel write failed: {}", e);
                    self.hold(frame, generation);
                    return Err(e);
                }
            };
            let n = n.min(frame.len());
            trace!("channel accepted {}/{} bytes", n, frame.len());

            if let Some(device) = &binding.device {
                device.record_tx_bytes(n);
            }
            frame.advance(n);
            self.note_progress(n, frame.is_empty());

            if !frame.is_empty() {
                self.hold(frame, generation);
                break;
            }

            if let Some(device) = &binding.device {
                device.record_tx_complete(frame.category());
            }
        }
        Ok(())
    }

    /// The held frame first, then the protocol queue.
    ///
    /// Also returns the flush generation the frame was taken under.
    fn next_frame(&self, binding: &Binding) -> Option<(Frame, u64)> {
        let (held, generation) = {
            let mut held = self.tx.held();
            (held.take(), self.tx.flush_gen.load(Ordering::SeqCst))
        };
        held.or_else(|| binding.instance.dequeue(self))
            .map(|frame| (frame, generation))
    }

    /// Keeps the unsent tail for the next pass, unless the session closed
    /// or the output was flushed since the frame was taken.
    fn hold(&self, frame: Frame, generation: u64) {
        let mut held = self.tx.held();
        if self.is_closed() {
            debug!("session closed, dropping {} unsent bytes", frame.len());
            return;
        }
        if self.tx.flush_gen.load(Ordering::SeqCst) != generation {
            debug!("output flushed, dropping {} unsent bytes", frame.len());
            return;
        }
        *held = Some(frame);
    }

    fn note_progress(&self, accepted: usize, complete: bool) {
        if accepted > 0 || complete {
            self.tx.zero_accepts.store(0, Ordering::Relaxed);
            if self.tx.stalled.swap(false, Ordering::AcqRel) {
                info!("transmitter resumed");
            }
            return;
        }

        let count = self.tx.zero_accepts.fetch_add(1, Ordering::Relaxed) + 1;
        if count >= self.config.stall_threshold && !self.tx.stalled.swap(true, Ordering::AcqRel) {
            warn!("transmitter stalled: {} consecutive zero-length writes", count);
        }
    }

    /// Returns true while the channel keeps refusing the held frame.
    pub fn tx_stalled(&self) -> bool {
        self.tx.stalled.load(Ordering::Acquire)
    }

    /// Returns the number of unsent bytes in the held frame.
    pub fn held_len(&self) -> usize {
        self.tx.held().as_ref().map_or(0, Frame::len)
    }
}
