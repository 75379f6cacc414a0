//! Framed binary transport for BLE anchor lines.
//!
//! tsb carries HCI traffic for many anchors over one TCP connection. Each
//! packet is COBS-stuffed, ends in a zero byte, and is addressed by a
//! channel path and a type path.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP dial and listen
//! - [`frame`]: Stuffing codec, channel/type paths, integrity trailer
//! - [`line`]: Beacon line multiplexer and anchor sockets (behind `line` feature)
//! - [`relay`]: Broadcast relay server (behind `relay` feature)

/// Re-export transport types.
pub mod transport {
    pub use tsb_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use tsb_frame::*;
}

/// Re-export beacon line types (requires `line` feature).
#[cfg(feature = "line")]
pub mod line {
    pub use tsb_line::*;
}

/// Re-export relay types (requires `relay` feature).
#[cfg(feature = "relay")]
pub mod relay {
    pub use tsb_relay::*;
}
