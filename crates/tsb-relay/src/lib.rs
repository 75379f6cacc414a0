//! Broadcast relay for tsb frames.
//!
//! Every frame handed to [`RelayHandle::outbound`] is encoded once and
//! offered to each connected client; frames clients send are merged into
//! [`RelayHandle::inbound`]. A slow client loses frames instead of holding
//! up the rest.

pub mod config;
pub mod error;
pub mod registry;
pub mod server;
pub mod signal;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use registry::{BroadcastReport, ConnectionId, ConnectionRegistry};
pub use server::{RelayHandle, RelayServer};
pub use signal::shutdown_signal;
