/// Errors that can occur while running the relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Bind or accept failure.
    #[error("transport error: {0}")]
    Transport(#[from] tsb_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] tsb_frame::FrameError),

    /// Configuration rejected before binding.
    #[error("invalid relay config: {0}")]
    Config(String),

    /// I/O error on a client connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
