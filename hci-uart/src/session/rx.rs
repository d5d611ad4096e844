//! RX dispatcher.
//!
//! Inbound chunks are handed to the bound protocol one at a time under the
//! session's RX guard. The channel is unthrottled only after the protocol
//! has taken a chunk, so at most one chunk is buffered below the protocol.

use std::sync::PoisonError;
use std::sync::atomic::Ordering;

use log::{trace, warn};

use super::Session;
use crate::error::{Error, Result};

impl Session {
    /// Delivers one inbound chunk to the bound protocol.
    ///
    /// Returns the number of bytes handed to the protocol: the whole chunk,
    /// or zero if no protocol is bound and the data was dropped. The RX guard
    /// is not re-entrant; a protocol must not call `receive` from `recv`.
    pub fn receive(&self, data: &[u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(Error::Gone);
        }
        if !self.proto_set.load(Ordering::Acquire) {
            trace!("no protocol bound, dropping {} bytes", data.len());
            return Ok(0);
        }
        let Some(binding) = self.current() else {
            trace!("bind in progress, dropping {} bytes", data.len());
            return Ok(0);
        };

        {
            let _guard = self.rx_lock.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = binding.instance.recv(self, data) {
                warn!("protocol {} recv failed: {}", binding.protocol.name(), e);
                if let Some(device) = &binding.device {
                    device.record_rx_error();
                }
            }
            if let Some(device) = &binding.device {
                device.record_rx_bytes(data.len());
            }
        }

        self.channel.unthrottle();
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use crate::channel::RecordingChannel;
    use crate::config::Config;
    use crate::error::Error;
    use crate::testing::{Fixture, Probe, PROBE_ID};
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_receive_without_protocol_drops() {
        let fx = Fixture::new();

        assert_eq!(fx.session.receive(&[0x01, 0x02]), Ok(0));
        assert_eq!(fx.session.receive(&[0x03]), Ok(0));
        assert!(fx.probe.chunks().is_empty());
        assert_eq!(fx.channel.unthrottle_calls(), 0);
    }

    #[test]
    fn test_receive_delivers_chunks_in_order() {
        let fx = Fixture::new().bound();

        fx.port.receive(&[0x01, 0x02]);
        fx.port.receive(&[0x03]);
        fx.port.receive(&[]);

        assert_eq!(fx.probe.chunks(), vec![vec![0x01, 0x02], vec![0x03], vec![]]);
        assert_eq!(fx.channel.unthrottle_calls(), 3);
        assert_eq!(fx.session.stats().unwrap().byte_rx, 3);
    }

    #[test]
    fn test_receive_is_serialized() {
        let probe = Probe {
            recv_delay: Some(Duration::from_millis(1)),
            ..Probe::new()
        };
        let fx = Fixture::with(probe, RecordingChannel::new(), Config::default());
        fx.session.bind_protocol(PROBE_ID).unwrap();
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4u8)
            .map(|t| {
                let session = fx.session.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for seq in 0..10u8 {
                        session.receive(&[t, seq]).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let chunks = fx.probe.chunks();
        assert_eq!(chunks.len(), 40);
        assert_eq!(fx.probe.max_in_recv.load(Ordering::SeqCst), 1);
        for t in 0..4u8 {
            let seqs: Vec<u8> = chunks.iter().filter(|c| c[0] == t).map(|c| c[1]).collect();
            assert_eq!(seqs, (0..10u8).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_recv_error_counted_and_unthrottled() {
        let fx = Fixture::new().bound();
        fx.probe.fail_recv.store(true, Ordering::SeqCst);

        assert_eq!(fx.session.receive(&[0xaa]), Ok(1));
        assert_eq!(fx.session.stats().unwrap().err_rx, 1);
        assert_eq!(fx.channel.unthrottle_calls(), 1);
    }

    #[test]
    fn test_receive_after_close() {
        let fx = Fixture::new().bound();
        fx.port.close();

        assert_eq!(fx.session.receive(&[0x01]), Err(Error::Gone));
        fx.port.receive(&[0x02]);
        assert!(fx.probe.chunks().is_empty());
    }
}
