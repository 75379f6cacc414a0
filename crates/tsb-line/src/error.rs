use std::time::Duration;

/// Errors that can occur on a beacon line or an anchor socket.
#[derive(Debug, thiserror::Error)]
pub enum LineError {
    /// Transport-level error (dial failure).
    #[error("transport error: {0}")]
    Transport(#[from] tsb_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] tsb_frame::FrameError),

    /// Configuration rejected before connecting.
    #[error("invalid line config: {0}")]
    Config(String),

    /// No inbox is registered for this anchor id.
    #[error("anchor {0} is not registered on this line")]
    UnknownAnchor(u8),

    /// A read waited the full window without data.
    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    /// The anchor socket was closed (end of stream).
    #[error("anchor socket closed")]
    Closed,

    /// The line's connection is gone.
    #[error("beacon line disconnected")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, LineError>;
