//! TCP transport for tsb.
//!
//! This is the lowest layer of the workspace: dial and listen with typed
//! errors. Blocking helpers live in [`tcp`]; the tokio variants used by the
//! beacon line and the relay live in [`async_tcp`] behind the `async` feature.

pub mod error;
pub mod tcp;

#[cfg(feature = "async")]
pub mod async_tcp;

pub use error::{Result, TransportError};
pub use tcp::TcpTransport;

#[cfg(feature = "async")]
pub use async_tcp::TsbListener;
