use tsb_frame::FrameConfig;

use crate::error::{RelayError, Result};

pub const DEFAULT_BIND: &str = "0.0.0.0:7777";
pub const DEFAULT_INBOUND_QUEUE: usize = 100;
pub const DEFAULT_OUTBOUND_QUEUE: usize = 100;
pub const DEFAULT_CLIENT_QUEUE: usize = 64;

/// Configuration for a [`RelayServer`](crate::RelayServer).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listen address.
    pub bind: String,
    /// Frames from all clients waiting for the application.
    pub inbound_queue: usize,
    /// Frames from the application waiting to be broadcast.
    pub outbound_queue: usize,
    /// Encoded packets buffered per client before that client starts dropping.
    pub client_queue: usize,
    pub frame: FrameConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            inbound_queue: DEFAULT_INBOUND_QUEUE,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            client_queue: DEFAULT_CLIENT_QUEUE,
            frame: FrameConfig::default(),
        }
    }
}

impl RelayConfig {
    pub fn new(bind: impl Into<String>) -> Self {
        Self {
            bind: bind.into(),
            ..Self::default()
        }
    }

    pub fn with_client_queue(mut self, capacity: usize) -> Self {
        self.client_queue = capacity;
        self
    }

    pub fn with_inbound_queue(mut self, capacity: usize) -> Self {
        self.inbound_queue = capacity;
        self
    }

    pub fn with_outbound_queue(mut self, capacity: usize) -> Self {
        self.outbound_queue = capacity;
        self
    }

    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("inbound_queue", self.inbound_queue),
            ("outbound_queue", self.outbound_queue),
            ("client_queue", self.client_queue),
        ] {
            if value == 0 {
                return Err(RelayError::Config(format!("{name} must be > 0")));
            }
        }
        Ok(())
    }
}
