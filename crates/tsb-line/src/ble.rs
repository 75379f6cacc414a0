//! Types at the boundary between a beacon line and a BLE stack.
//!
//! Nothing here touches the wire. A BLE host running over
//! [`AnchorSocket`](crate::AnchorSocket)s parses advertisements itself and
//! hands them to handlers through these types.

use std::fmt;
use std::str::FromStr;

use tsb_frame::hex::{self, HexError};

use crate::line::BeaconLine;

/// Reverse a byte slice into a new vector.
///
/// BLE carries UUIDs and addresses least significant byte first.
pub fn reverse(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().rev().copied().collect()
}

/// Errors from building or parsing [`Uuid`] and [`Addr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("uuid must be 2, 4 or 16 bytes, got {0}")]
    UuidLength(usize),

    #[error("address must be 6 bytes, got {0}")]
    AddrLength(usize),

    #[error(transparent)]
    Hex(#[from] HexError),
}

/// 16-, 32- or 128-bit BLE UUID, stored most significant byte first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uuid(Vec<u8>);

impl Uuid {
    /// Build from on-air (little-endian) bytes.
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        Self::check_len(bytes.len())?;
        Ok(Self(reverse(bytes)))
    }

    /// Build from display-order (big-endian) bytes.
    pub fn from_be_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        Self::check_len(bytes.len())?;
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// On-air byte order.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        reverse(&self.0)
    }

    /// The same UUID with its byte order flipped.
    pub fn reverse(&self) -> Self {
        Self(reverse(&self.0))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn check_len(len: usize) -> Result<(), ParseError> {
        match len {
            2 | 4 | 16 => Ok(()),
            _ => Err(ParseError::UuidLength(len)),
        }
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if self.0.len() == 16 && matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for Uuid {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_be_bytes(&hex::decode(s)?)
    }
}

/// 48-bit device address, stored most significant byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Addr(pub [u8; 6]);

impl Addr {
    /// Build from on-air (little-endian) bytes.
    pub fn from_le_bytes(bytes: [u8; 6]) -> Self {
        let mut be = bytes;
        be.reverse();
        Self(be)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for Addr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 6] = hex::decode(s)?
            .try_into()
            .map_err(|raw: Vec<u8>| ParseError::AddrLength(raw.len()))?;
        Ok(Self(bytes))
    }
}

/// Service data element of an advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceData {
    pub uuid: Uuid,
    pub data: Vec<u8>,
}

/// A received advertising report.
pub trait Advertisement {
    fn local_name(&self) -> &str;
    fn manufacturer_data(&self) -> &[u8];
    fn service_data(&self) -> &[ServiceData];
    fn services(&self) -> &[Uuid];
    fn overflow_services(&self) -> &[Uuid];
    fn tx_power_level(&self) -> i32;
    fn connectable(&self) -> bool;
    fn solicited_services(&self) -> &[Uuid];
    fn rssi(&self) -> i32;
    fn addr(&self) -> Addr;
}

/// Handles an advertisement seen by `anchor` on `line`.
pub type AdvHandler = Box<dyn Fn(&dyn Advertisement, &BeaconLine, u8) + Send + Sync>;

/// Returns true if the advertisement should reach the handler.
pub type AdvFilter = Box<dyn Fn(&dyn Advertisement) -> bool + Send + Sync>;
