//! Frames exchanged between the protocol and the upper subsystem.
//!
//! A frame is one logical unit of outbound or inbound data. On the transmit
//! path a frame may take several channel writes; the unsent tail is tracked
//! with an internal cursor so the TX drain can resume where it stopped.

/// Frame category, used for per-category statistics and H4 framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// HCI command.
    Command = 0x01,

    /// ACL data.
    AclData = 0x02,

    /// SCO data.
    ScoData = 0x03,

    /// HCI event.
    Event = 0x04,

    /// Vendor specific packet.
    Vendor = 0xff,
}

impl FrameType {
    /// Converts a byte to a FrameType.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Command),
            0x02 => Some(Self::AclData),
            0x03 => Some(Self::ScoData),
            0x04 => Some(Self::Event),
            0xff => Some(Self::Vendor),
            _ => None,
        }
    }

    /// Returns the wire value of this category.
    pub const fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// A frame with an unsent-tail cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    category: FrameType,
    data: Vec<u8>,
    offset: usize,
}

impl Frame {
    /// Creates a new frame from a payload.
    pub fn new(category: FrameType, data: impl Into<Vec<u8>>) -> Self {
        Self {
            category,
            data: data.into(),
            offset: 0,
        }
    }

    /// Returns the frame category.
    pub fn category(&self) -> FrameType {
        self.category
    }

    /// Returns the bytes not yet consumed.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.offset..]
    }

    /// Returns the number of bytes not yet consumed.
    pub fn len(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Returns true if every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes `n` bytes from the front of the frame.
    ///
    /// Advancing past the end clamps to the end.
    pub fn advance(&mut self, n: usize) {
        self.offset = core::cmp::min(self.offset.saturating_add(n), self.data.len());
    }

    /// Prepends a byte to the unsent data.
    pub fn push_front(&mut self, byte: u8) {
        self.data.drain(..self.offset);
        self.offset = 0;
        self.data.insert(0, byte);
    }

    /// Consumes the frame and returns the unsent bytes.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.data.drain(..self.offset);
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type_conversion() {
        assert_eq!(FrameType::from_u8(0x02), Some(FrameType::AclData));
        assert_eq!(FrameType::from_u8(0x05), None);
        assert_eq!(FrameType::Vendor.as_u8(), 0xff);
    }

    #[test]
    fn test_advance_tracks_tail() {
        let mut frame = Frame::new(FrameType::Command, vec![1, 2, 3, 4]);
        frame.advance(3);
        assert_eq!(frame.remaining(), &[4]);
        assert_eq!(frame.len(), 1);

        frame.advance(10);
        assert!(frame.is_empty());

        frame.advance(usize::MAX);
        assert!(frame.is_empty());
    }

    #[test]
    fn test_push_front_after_advance() {
        let mut frame = Frame::new(FrameType::Event, vec![9, 8, 7]);
        frame.advance(1);
        frame.push_front(0x04);
        assert_eq!(frame.into_bytes(), vec![0x04, 8, 7]);
    }
}
