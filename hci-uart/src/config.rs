use crate::{DEFAULT_RECEIVE_ROOM, DEFAULT_STALL_THRESHOLD};

/// Session configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Receive room advertised to the channel on open.
    pub receive_room: usize,
    /// Whether upper devices should be reset on initialization.
    pub reset_on_init: bool,
    /// Consecutive zero-length accepts before the transmitter is reported stalled.
    pub stall_threshold: u32,
    /// Prefix used to name registered upper devices.
    pub device_name_prefix: &'static str,
}

impl Config {
    pub fn new() -> Self {
        Self {
            receive_room: DEFAULT_RECEIVE_ROOM,
            reset_on_init: false,
            stall_threshold: DEFAULT_STALL_THRESHOLD,
            device_name_prefix: "hci",
        }
    }

    pub fn with_receive_room(mut self, room: usize) -> Self {
        self.receive_room = room;
        self
    }

    pub fn with_reset_on_init(mut self, reset: bool) -> Self {
        self.reset_on_init = reset;
        self
    }

    pub fn with_stall_threshold(mut self, threshold: u32) -> Self {
        self.stall_threshold = threshold.max(1);
        self
    }

    pub fn with_device_name_prefix(mut self, prefix: &'static str) -> Self {
        self.device_name_prefix = prefix;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Device options requested before a protocol is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceFlags(u32);

impl DeviceFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);

    /// Register the upper device as a raw device.
    pub const RAW_DEVICE: Self = Self(1 << 0);

    /// Reset the controller when the device initializes.
    pub const RESET_ON_INIT: Self = Self(1 << 1);

    /// Create an AMP controller instead of a primary one.
    pub const CREATE_AMP: Self = Self(1 << 2);

    /// Initialize as primary controller.
    pub const INIT_PRIMARY: Self = Self(1 << 3);

    /// Controller requires external configuration.
    pub const EXT_CONFIG: Self = Self(1 << 4);

    /// Run vendor detection.
    pub const VND_DETECT: Self = Self(1 << 5);

    /// Creates flags from raw value.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Checks if a flag is set.
    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns the union of two flag sets.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}
