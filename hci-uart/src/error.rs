use core::fmt;

/// Errors reported by the underlying byte channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel hung up.
    Hangup,
    /// The operation was interrupted and may be retried.
    Interrupted,
    /// Generic I/O failure with the driver's error code.
    Io(i32),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Hangup => write!(f, "channel hung up"),
            ChannelError::Interrupted => write!(f, "channel operation interrupted"),
            ChannelError::Io(code) => write!(f, "channel I/O error ({})", code),
        }
    }
}

/// Errors of the transport multiplexing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Protocol id is outside the registry range.
    InvalidId,
    /// A protocol is already registered under this id.
    AlreadyRegistered,
    /// No protocol is registered under this id.
    NotRegistered,
    /// Lookup of an unknown protocol id.
    NotFound,
    /// The channel already carries a session.
    AlreadyOpen,
    /// The session is already bound to a protocol.
    AlreadyBound,
    /// No protocol is bound to the session.
    NotBound,
    /// The bound protocol has no upper device.
    NoDevice,
    /// The channel lacks the requested capability.
    Unsupported,
    /// The upper device has not completed open.
    DeviceNotRunning,
    /// The frame references an unknown upper device.
    NoSuchDevice,
    /// The session has been closed.
    Gone,
    /// The upper dispatch subsystem refused the device.
    RegistrationFailed,
    /// The byte channel reported an error.
    Channel(ChannelError),
    /// A protocol hook failed.
    Protocol(&'static str),
}

impl Error {
    /// Returns the negative errno a line discipline reports for this error.
    pub const fn errno(&self) -> i32 {
        match self {
            Error::InvalidId | Error::NotRegistered => -22, // EINVAL
            Error::AlreadyRegistered | Error::AlreadyOpen => -17, // EEXIST
            Error::NotFound => -93, // EPROTONOSUPPORT
            Error::AlreadyBound | Error::DeviceNotRunning => -16, // EBUSY
            Error::NotBound => -49, // EUNATCH
            Error::NoDevice => -42, // ENOMSG
            Error::Unsupported => -95, // EOPNOTSUPP
            Error::NoSuchDevice | Error::RegistrationFailed => -19, // ENODEV
            Error::Gone => -9, // EBADF
            Error::Channel(_) | Error::Protocol(_) => -5, // EIO
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidId => write!(f, "Invalid protocol id"),
            Error::AlreadyRegistered => write!(f, "Protocol already registered"),
            Error::NotRegistered => write!(f, "Protocol not registered"),
            Error::NotFound => write!(f, "Protocol not found"),
            Error::AlreadyOpen => write!(f, "Channel already carries a session"),
            Error::AlreadyBound => write!(f, "Session already bound to a protocol"),
            Error::NotBound => write!(f, "No protocol bound"),
            Error::NoDevice => write!(f, "No upper device registered"),
            Error::Unsupported => write!(f, "Operation not supported by channel"),
            Error::DeviceNotRunning => write!(f, "Upper device not running"),
            Error::NoSuchDevice => write!(f, "No such device"),
            Error::Gone => write!(f, "Session closed"),
            Error::RegistrationFailed => write!(f, "Upper device registration failed"),
            Error::Channel(e) => write!(f, "Channel error: {}", e),
            Error::Protocol(msg) => write!(f, "Protocol error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<ChannelError> for Error {
    fn from(err: ChannelError) -> Self {
        Error::Channel(err)
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> std::io::Error {
        let kind = match err {
            Error::Channel(ChannelError::Interrupted) => std::io::ErrorKind::Interrupted,
            Error::Unsupported => std::io::ErrorKind::Unsupported,
            Error::AlreadyOpen | Error::AlreadyRegistered => std::io::ErrorKind::AlreadyExists,
            Error::NotFound | Error::NoSuchDevice => std::io::ErrorKind::NotFound,
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}

/// Result alias for this crate.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(Error::AlreadyBound.errno(), -16);
        assert_eq!(Error::NotBound.errno(), -49);
        assert_eq!(Error::NoDevice.errno(), -42);
        assert_eq!(Error::NotFound.errno(), -93);
        assert_eq!(Error::Channel(ChannelError::Io(-5)).errno(), -5);
    }

    #[test]
    fn test_display_wraps_channel_error() {
        let err: Error = ChannelError::Hangup.into();
        assert_eq!(err.to_string(), "Channel error: channel hung up");
    }
}
