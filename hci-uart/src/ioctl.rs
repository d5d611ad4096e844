//! Numeric control commands.
//!
//! The control plane is reachable through a small fixed command set, each
//! command taking and returning a 32-bit value.

use crate::config::DeviceFlags;
use crate::error::{Error, Result};
use crate::session::Session;

/// Bind a protocol (`_IOW('U', 200, int)`).
pub const HCIUARTSETPROTO: u32 = 0x4004_55c8;
/// Get the bound protocol id (`_IOR('U', 201, int)`).
pub const HCIUARTGETPROTO: u32 = 0x8004_55c9;
/// Get the upper device id (`_IOR('U', 202, int)`).
pub const HCIUARTGETDEVICE: u32 = 0x8004_55ca;
/// Set pre-bind device flags (`_IOW('U', 203, int)`).
pub const HCIUARTSETFLAGS: u32 = 0x4004_55cb;
/// Get device flags (`_IOR('U', 204, int)`).
pub const HCIUARTGETFLAGS: u32 = 0x8004_55cc;

/// A decoded control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Bind the protocol with this id.
    SetProto(u32),
    /// Query the bound protocol id.
    GetProto,
    /// Query the upper device id.
    GetDevice,
    /// Set pre-bind flags.
    SetFlags(DeviceFlags),
    /// Query flags.
    GetFlags,
}

impl Command {
    /// Decodes a raw command code and argument.
    pub fn decode(cmd: u32, arg: u32) -> Result<Self> {
        match cmd {
            HCIUARTSETPROTO => Ok(Command::SetProto(arg)),
            HCIUARTGETPROTO => Ok(Command::GetProto),
            HCIUARTGETDEVICE => Ok(Command::GetDevice),
            HCIUARTSETFLAGS => Ok(Command::SetFlags(DeviceFlags::from_bits(arg))),
            HCIUARTGETFLAGS => Ok(Command::GetFlags),
            _ => Err(Error::Unsupported),
        }
    }

    /// Returns the raw command code.
    pub const fn code(&self) -> u32 {
        match self {
            Command::SetProto(_) => HCIUARTSETPROTO,
            Command::GetProto => HCIUARTGETPROTO,
            Command::GetDevice => HCIUARTGETDEVICE,
            Command::SetFlags(_) => HCIUARTSETFLAGS,
            Command::GetFlags => HCIUARTGETFLAGS,
        }
    }
}

impl Session {
    /// Executes a control command.
    pub fn ioctl(&self, cmd: Command) -> Result<u32> {
        match cmd {
            Command::SetProto(id) => self.bind_protocol(id).map(|()| 0),
            Command::GetProto => self.protocol_id(),
            Command::GetDevice => self.device_id().map(u32::from),
            Command::SetFlags(flags) => self.set_pre_bind_flags(flags).map(|()| 0),
            Command::GetFlags => Ok(self.flags().bits()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_commands() {
        assert_eq!(Command::decode(HCIUARTSETPROTO, 2), Ok(Command::SetProto(2)));
        assert_eq!(Command::decode(HCIUARTGETDEVICE, 0), Ok(Command::GetDevice));
        assert_eq!(
            Command::decode(HCIUARTSETFLAGS, 1),
            Ok(Command::SetFlags(DeviceFlags::RAW_DEVICE))
        );
    }

    #[test]
    fn test_decode_unknown_command() {
        assert_eq!(Command::decode(0x5401, 0), Err(Error::Unsupported));
    }

    #[test]
    fn test_code_matches_decode() {
        for cmd in [Command::SetProto(1), Command::GetProto, Command::GetFlags] {
            assert_eq!(Command::decode(cmd.code(), 1).map(|c| c.code()), Ok(cmd.code()));
        }
    }
}
