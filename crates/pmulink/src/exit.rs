use std::fmt;
use std::io;

use pmulink_channel::ChannelError;
use pmulink_frame::FrameError;
use pmulink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { ref source, .. } | TransportError::Connect { ref source, .. }
            if source.kind() == io::ErrorKind::PermissionDenied =>
        {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        TransportError::Accept(source) | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::PayloadTooLarge { .. } | FrameError::TruncatedPayload { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    match err {
        ChannelError::Transport(err) => transport_error(context, err),
        ChannelError::Frame(err) => frame_error(context, err),
        ChannelError::Timeout { .. } | ChannelError::NoReport(_) => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        ChannelError::Disconnected => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;

    #[test]
    fn timeouts_map_to_timeout_code() {
        let err = ChannelError::Timeout {
            frame_id: 1,
            command: 0x03,
            attempts: 4,
        };
        let cli = channel_error("info failed", err);
        assert_eq!(cli.code, TIMEOUT);
        assert!(cli.message.contains("PMU_HW_VERSION_GET"));

        let cli = channel_error("status failed", ChannelError::NoReport(Duration::from_secs(5)));
        assert_eq!(cli.code, TIMEOUT);
    }

    #[test]
    fn missing_device_is_transport_error() {
        let err = TransportError::Connect {
            path: PathBuf::from("/dev/ttyPMU"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(transport_error("open failed", err).code, TRANSPORT_ERROR);
    }

    #[test]
    fn oversized_payload_is_data_invalid() {
        let err = ChannelError::Frame(FrameError::PayloadTooLarge { size: 9000, max: 8179 });
        assert_eq!(channel_error("send failed", err).code, DATA_INVALID);
    }
}
