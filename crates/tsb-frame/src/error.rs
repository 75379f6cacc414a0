/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The de-stuffed packet cannot hold channel, type, and trailer.
    #[error("packet too short ({len} bytes, need at least {min})")]
    TooShort { len: usize, min: usize },

    /// The packet could not be split into channel, type, and payload.
    #[error("malformed packet: {0}")]
    Malformed(&'static str),

    /// The byte-stuffed block structure is broken.
    #[error("invalid cobs encoding: {0}")]
    Cobs(&'static str),

    /// A channel path string or component is out of range.
    #[error("invalid channel path: {0}")]
    InvalidChannel(String),

    /// A type code does not fit in a single path component.
    #[error("invalid type code 0x{0:02X} (high bit is reserved for continuation)")]
    InvalidType(u8),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
