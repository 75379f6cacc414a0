use std::fmt;
use std::io;

use tsb_frame::FrameError;
use tsb_line::LineError;
use tsb_relay::RelayError;
use tsb_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
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
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        io::ErrorKind::NotFound | io::ErrorKind::InvalidInput => USAGE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { source, .. } | TransportError::Bind { source, .. }
            if source.kind() == io::ErrorKind::TimedOut =>
        {
            CliError::new(TIMEOUT, format!("{context}: {source}"))
        }
        TransportError::Unresolved { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::InvalidChannel(_) | FrameError::InvalidType(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        FrameError::TooShort { .. } | FrameError::Malformed(_) | FrameError::Cobs(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn line_error(context: &str, err: LineError) -> CliError {
    match err {
        LineError::Transport(err) => transport_error(context, err),
        LineError::Frame(err) => frame_error(context, err),
        LineError::Config(_) | LineError::UnknownAnchor(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        LineError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        LineError::Closed | LineError::Disconnected => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

pub fn relay_error(context: &str, err: RelayError) -> CliError {
    match err {
        RelayError::Transport(err) => transport_error(context, err),
        RelayError::Frame(err) => frame_error(context, err),
        RelayError::Config(_) => CliError::new(USAGE, format!("{context}: {err}")),
        RelayError::Io(err) => io_error(context, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_connect_is_a_transport_error() {
        let err = TransportError::Connect {
            addr: "127.0.0.1:1".into(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(transport_error("connect failed", err).code, TRANSPORT_ERROR);
    }

    #[test]
    fn line_errors_map_to_distinct_codes() {
        assert_eq!(
            line_error("read", LineError::Timeout(std::time::Duration::from_secs(5))).code,
            TIMEOUT
        );
        assert_eq!(line_error("open", LineError::UnknownAnchor(9)).code, USAGE);
        assert_eq!(line_error("read", LineError::Disconnected).code, FAILURE);
    }

    #[test]
    fn corrupt_data_is_data_invalid() {
        assert_eq!(
            frame_error("decode", FrameError::Cobs("zero inside block")).code,
            DATA_INVALID
        );
        assert_eq!(
            frame_error("parse", FrameError::InvalidChannel("x".into())).code,
            USAGE
        );
    }
}
