//! Scriptable in-memory channel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{BaudMode, Channel};
use crate::error::{ChannelError, Error, Result};

#[derive(Debug, Default)]
struct State {
    written: Vec<u8>,
    writes: Vec<Vec<u8>>,
    accept_budget: Option<usize>,
    accept_script: VecDeque<usize>,
    fail_next: Option<ChannelError>,
    hung_up: bool,
    throttled: bool,
    throttle_calls: usize,
    unthrottle_calls: usize,
    break_on: bool,
    baud: Option<(u32, BaudMode)>,
    pending: usize,
    output_flushes: usize,
    input_flushes: usize,
    wakeup_requests: usize,
    receive_room: usize,
    modem_status: u32,
}

/// A channel that records every write and lets tests script how many bytes
/// each write accepts.
///
/// Useful for testing short writes, stalled devices and write ordering.
#[derive(Debug)]
pub struct RecordingChannel {
    state: Mutex<State>,
    writable: bool,
    supports_break: bool,
    supports_baud: bool,
    supports_modem: bool,
    write_delay: Option<Duration>,
    in_write: AtomicUsize,
    max_in_write: AtomicUsize,
}

impl RecordingChannel {
    /// Creates a channel that accepts everything and supports every capability.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            writable: true,
            supports_break: true,
            supports_baud: true,
            supports_modem: true,
            write_delay: None,
            in_write: AtomicUsize::new(0),
            max_in_write: AtomicUsize::new(0),
        }
    }

    /// Creates a channel without break, baud rate or modem status support.
    pub fn minimal() -> Self {
        Self {
            supports_break: false,
            supports_baud: false,
            supports_modem: false,
            ..Self::new()
        }
    }

    /// Creates a channel with no write path.
    pub fn read_only() -> Self {
        Self {
            writable: false,
            ..Self::new()
        }
    }

    /// Makes every write sleep, widening race windows in tests.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Limits every write to at most `budget` bytes, `None` for unlimited.
    pub fn set_accept_budget(&self, budget: Option<usize>) {
        self.lock().accept_budget = budget;
    }

    /// Queues per-call accept limits consumed before the budget applies.
    pub fn script_accepts(&self, limits: &[usize]) {
        self.lock().accept_script.extend(limits.iter().copied());
    }

    /// Makes the next write fail with the given error.
    pub fn fail_next_write(&self, err: ChannelError) {
        self.lock().fail_next = Some(err);
    }

    /// Simulates a hangup: every following write accepts zero bytes.
    pub fn hang_up(&self) {
        self.lock().hung_up = true;
    }

    /// Sets the value returned by `chars_in_buffer`.
    pub fn set_pending(&self, pending: usize) {
        self.lock().pending = pending;
    }

    /// Sets the value returned by `modem_status`.
    pub fn set_modem_status(&self, status: u32) {
        self.lock().modem_status = status;
    }

    /// Returns every accepted byte, in order.
    pub fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    /// Returns the accepted bytes of each write call.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// Returns true if input is currently throttled.
    pub fn is_throttled(&self) -> bool {
        self.lock().throttled
    }

    /// Returns the number of unthrottle calls.
    pub fn unthrottle_calls(&self) -> usize {
        self.lock().unthrottle_calls
    }

    /// Returns the number of throttle calls.
    pub fn throttle_calls(&self) -> usize {
        self.lock().throttle_calls
    }

    /// Returns the current break state.
    pub fn break_on(&self) -> bool {
        self.lock().break_on
    }

    /// Returns the last programmed baud rate.
    pub fn baud(&self) -> Option<(u32, BaudMode)> {
        self.lock().baud
    }

    /// Returns how many times output was flushed.
    pub fn output_flushes(&self) -> usize {
        self.lock().output_flushes
    }

    /// Returns how many times input was flushed.
    pub fn input_flushes(&self) -> usize {
        self.lock().input_flushes
    }

    /// Returns how many write wakeups were requested.
    pub fn wakeup_requests(&self) -> usize {
        self.lock().wakeup_requests
    }

    /// Returns the advertised receive room.
    pub fn receive_room(&self) -> usize {
        self.lock().receive_room
    }

    /// Returns the highest number of writes observed in flight at once.
    pub fn max_concurrent_writes(&self) -> usize {
        self.max_in_write.load(Ordering::SeqCst)
    }
}

impl Default for RecordingChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for RecordingChannel {
    fn write(&self, buf: &[u8]) -> Result<usize> {
        let active = self.in_write.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_write.fetch_max(active, Ordering::SeqCst);

        if let Some(delay) = self.write_delay {
            std::thread::sleep(delay);
        }

        let result = {
            let mut state = self.lock();
            if let Some(err) = state.fail_next.take() {
                Err(Error::Channel(err))
            } else if state.hung_up {
                Ok(0)
            } else {
                let limit = state
                    .accept_script
                    .pop_front()
                    .or(state.accept_budget)
                    .unwrap_or(buf.len());
                let n = core::cmp::min(limit, buf.len());
                state.written.extend_from_slice(&buf[..n]);
                if n > 0 {
                    state.writes.push(buf[..n].to_vec());
                }
                Ok(n)
            }
        };

        self.in_write.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn can_write(&self) -> bool {
        self.writable
    }

    fn request_write_wakeup(&self) {
        self.lock().wakeup_requests += 1;
    }

    fn throttle(&self) {
        let mut state = self.lock();
        state.throttled = true;
        state.throttle_calls += 1;
    }

    fn unthrottle(&self) {
        let mut state = self.lock();
        state.throttled = false;
        state.unthrottle_calls += 1;
    }

    fn flush_buffer(&self) {
        let mut state = self.lock();
        state.pending = 0;
        state.output_flushes += 1;
    }

    fn flush_input(&self) {
        self.lock().input_flushes += 1;
    }

    fn chars_in_buffer(&self) -> usize {
        self.lock().pending
    }

    fn set_receive_room(&self, room: usize) {
        self.lock().receive_room = room;
    }

    fn set_break(&self, on: bool) -> Result<()> {
        if !self.supports_break {
            return Err(Error::Unsupported);
        }
        self.lock().break_on = on;
        Ok(())
    }

    fn set_baud_rate(&self, baud: u32, mode: BaudMode) -> Result<()> {
        if !self.supports_baud {
            return Err(Error::Unsupported);
        }
        self.lock().baud = Some((baud, mode));
        Ok(())
    }

    fn modem_status(&self) -> Result<u32> {
        if !self.supports_modem {
            return Err(Error::Unsupported);
        }
        Ok(self.lock().modem_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_accepts_all() {
        let channel = RecordingChannel::new();
        assert_eq!(channel.write(b"Hello").unwrap(), 5);
        assert_eq!(channel.written(), b"Hello");
    }

    #[test]
    fn test_scripted_short_writes() {
        let channel = RecordingChannel::new();
        channel.script_accepts(&[2, 0]);

        assert_eq!(channel.write(b"abcd").unwrap(), 2);
        assert_eq!(channel.write(b"cd").unwrap(), 0);
        assert_eq!(channel.write(b"cd").unwrap(), 2);
        assert_eq!(channel.writes(), vec![b"ab".to_vec(), b"cd".to_vec()]);
    }

    #[test]
    fn test_hang_up_accepts_nothing() {
        let channel = RecordingChannel::new();
        channel.hang_up();
        assert_eq!(channel.write(b"data").unwrap(), 0);
        assert!(channel.written().is_empty());
    }

    #[test]
    fn test_minimal_capabilities() {
        let channel = RecordingChannel::minimal();
        assert_eq!(channel.set_break(true), Err(Error::Unsupported));
        assert_eq!(channel.set_baud_rate(115200, BaudMode::Exact), Err(Error::Unsupported));
        assert_eq!(channel.modem_status(), Err(Error::Unsupported));
    }
}
