//! H4 framing.
//!
//! Every frame on the wire is prefixed with its packet type byte. Inbound
//! frames are reassembled from the header length fields:
//!
//! ```text
//! Command: 0x01 | opcode(2) | len(1)     | payload
//! ACL:     0x02 | handle(2) | len(2, le) | payload
//! SCO:     0x03 | handle(2) | len(1)     | payload
//! Event:   0x04 | code(1)   | len(1)     | payload
//! ```

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, trace, warn};

use super::{Protocol, ProtocolInstance};
use crate::error::Result;
use crate::frame::{Frame, FrameType};
use crate::session::Session;

/// Largest header among the H4 packet types.
const MAX_HEADER: usize = 4;

/// Header length for a packet type, `None` if H4 does not carry it.
const fn header_len(category: FrameType) -> Option<usize> {
    match category {
        FrameType::Command => Some(3),
        FrameType::AclData => Some(4),
        FrameType::ScoData => Some(3),
        FrameType::Event => Some(2),
        FrameType::Vendor => None,
    }
}

/// Payload length encoded in a complete header.
fn payload_len(category: FrameType, header: &[u8]) -> usize {
    match category {
        FrameType::Event => header[1] as usize,
        FrameType::AclData => u16::from_le_bytes([header[2], header[3]]) as usize,
        _ => header[2] as usize,
    }
}

/// The H4 protocol.
#[derive(Debug, Default)]
pub struct H4;

impl H4 {
    /// Creates the protocol entry.
    pub fn new() -> Self {
        Self
    }
}

impl Protocol for H4 {
    fn name(&self) -> &'static str {
        "h4"
    }

    fn open(&self, _session: &Session) -> Result<Box<dyn ProtocolInstance>> {
        debug!("h4 open");
        Ok(Box::new(H4Instance::default()))
    }
}

#[derive(Debug, Default)]
enum RxState {
    /// Waiting for a packet type byte.
    #[default]
    Type,

    /// Collecting the header.
    Header {
        category: FrameType,
        header: heapless::Vec<u8, MAX_HEADER>,
    },

    /// Collecting the payload.
    Payload {
        category: FrameType,
        data: Vec<u8>,
        remaining: usize,
    },
}

#[derive(Debug, Default)]
struct H4Instance {
    txq: Mutex<VecDeque<Frame>>,
    rx: Mutex<RxState>,
}

impl H4Instance {
    fn txq(&self) -> MutexGuard<'_, VecDeque<Frame>> {
        self.txq.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rx(&self) -> MutexGuard<'_, RxState> {
        self.rx.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hands a reassembled frame to the session, dropping it if nobody listens.
fn complete(session: &Session, category: FrameType, data: Vec<u8>) {
    trace!("h4 frame complete: {:?}, {} bytes", category, data.len());
    if let Err(e) = session.deliver_frame(Frame::new(category, data)) {
        debug!("h4 dropping {:?} frame: {}", category, e);
    }
}

impl ProtocolInstance for H4Instance {
    fn enqueue(&self, _session: &Session, mut frame: Frame) {
        frame.push_front(frame.category().as_u8());
        self.txq().push_back(frame);
    }

    fn dequeue(&self, _session: &Session) -> Option<Frame> {
        self.txq().pop_front()
    }

    fn recv(&self, session: &Session, data: &[u8]) -> Result<usize> {
        let mut state = self.rx();
        let mut pos = 0;

        while pos < data.len() {
            match &mut *state {
                RxState::Type => {
                    let byte = data[pos];
                    pos += 1;
                    match FrameType::from_u8(byte).filter(|c| header_len(*c).is_some()) {
                        Some(category) => {
                            *state = RxState::Header {
                                category,
                                header: heapless::Vec::new(),
                            };
                        }
                        None => {
                            warn!("h4 unknown packet type 0x{:02x}", byte);
                            session.record_rx_error();
                        }
                    }
                }
                RxState::Header { category, header } => {
                    let category = *category;
                    let need = header_len(category).unwrap_or(0);
                    let take = core::cmp::min(need - header.len(), data.len() - pos);
                    if header.extend_from_slice(&data[pos..pos + take]).is_err() {
                        session.record_rx_error();
                        *state = RxState::Type;
                        continue;
                    }
                    pos += take;
                    if header.len() < need {
                        continue;
                    }

                    let remaining = payload_len(category, header);
                    let mut buf = Vec::with_capacity(need + remaining);
                    buf.extend_from_slice(header);
                    if remaining == 0 {
                        *state = RxState::Type;
                        complete(session, category, buf);
                    } else {
                        *state = RxState::Payload {
                            category,
                            data: buf,
                            remaining,
                        };
                    }
                }
                RxState::Payload {
                    category,
                    data: buf,
                    remaining,
                } => {
                    let take = core::cmp::min(*remaining, data.len() - pos);
                    buf.extend_from_slice(&data[pos..pos + take]);
                    *remaining -= take;
                    pos += take;
                    if *remaining == 0 {
                        let category = *category;
                        let buf = core::mem::take(buf);
                        *state = RxState::Type;
                        complete(session, category, buf);
                    }
                }
            }
        }

        Ok(data.len())
    }

    fn flush(&self, _session: &Session) {
        debug!("h4 flush");
        self.txq().clear();
    }

    fn close(&self, _session: &Session) {
        debug!("h4 close");
        self.txq().clear();
        *self.rx() = RxState::Type;
    }
}
