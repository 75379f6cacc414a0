//! Payload type codes.
//!
//! Only [`HCI`] and [`ERROR`] drive routing on a beacon line; every other
//! code is passed through opaquely. Labels live in an instance-owned
//! [`TypeRegistry`] so several lines or relays can carry their own extensions.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use bytes::BytesMut;

use crate::channel::{encode_components, scan_components, MAX_COMPONENT};
use crate::error::{FrameError, Result};

pub const UNUSED: u8 = 0x00;
pub const RAW: u8 = 0x01;
pub const TEXT: u8 = 0x02;
pub const ENVELOPE: u8 = 0x05;
pub const BLINE: u8 = 0x11;
pub const BLINE2: u8 = 0x12;
/// Bluetooth HCI packets to or from an anchor.
pub const HCI: u8 = 0x15;
pub const CWB: u8 = 0x16;
pub const COAP: u8 = 0x21;
pub const CBOR: u8 = 0x3C;
pub const CAN: u8 = 0x41;
pub const MODBUS: u8 = 0x51;
pub const UART: u8 = 0x52;
pub const I2C: u8 = 0x53;
pub const SPI: u8 = 0x54;
pub const PORT: u8 = 0x55;
pub const LOG: u8 = 0x56;
/// Error and status text reported by an anchor.
pub const ERROR: u8 = 0x57;
pub const SENML_JSON: u8 = 0x6E;
pub const SENSML_JSON: u8 = 0x6F;
pub const SENML_CBOR: u8 = 0x70;
pub const SENSML_CBOR: u8 = 0x71;
pub const SENML_EXI: u8 = 0x72;
pub const SENSML_EXI: u8 = 0x73;
pub const INFLUX: u8 = 0x75;
/// Catch-all for payloads of unknown format.
pub const UNKNOWN: u8 = 0x7F;

const BUILTIN_LABELS: &[(u8, &str)] = &[
    (RAW, "raw"),
    (TEXT, "text"),
    (ENVELOPE, "envelope"),
    (BLINE, "bline"),
    (BLINE2, "bline2"),
    (HCI, "hci"),
    (CWB, "CWB"),
    (COAP, "coap"),
    (CBOR, "cbor"),
    (CAN, "can"),
    (MODBUS, "modbus"),
    (UART, "uart"),
    (I2C, "i2c"),
    (SPI, "spi"),
    (PORT, "port"),
    (LOG, "log"),
    (ERROR, "error"),
    (SENML_JSON, "senml_json"),
    (SENSML_JSON, "sensml_json"),
    (SENML_CBOR, "senml_cbor"),
    (SENSML_CBOR, "sensml_cbor"),
    (SENML_EXI, "senml_exi"),
    (SENSML_EXI, "sensml_exi"),
    (INFLUX, "influx"),
    (UNKNOWN, "unknown"),
];

/// The type field of a frame.
///
/// Encoded like a channel path; conventionally a single code. The first
/// component is the primary code used for routing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypePath(Vec<u8>);

impl TypePath {
    /// A single type code.
    pub fn code(code: u8) -> Result<Self> {
        if code > MAX_COMPONENT {
            return Err(FrameError::InvalidType(code));
        }
        Ok(Self(vec![code]))
    }

    /// Build from several components, e.g. a vendor sub-type.
    pub fn new(codes: &[u8]) -> Result<Self> {
        match codes.iter().find(|c| **c > MAX_COMPONENT) {
            Some(bad) => Err(FrameError::InvalidType(*bad)),
            None if codes.is_empty() => Ok(Self(vec![UNUSED])),
            None => Ok(Self(codes.to_vec())),
        }
    }

    pub fn hci() -> Self {
        Self(vec![HCI])
    }

    pub fn error() -> Self {
        Self(vec![ERROR])
    }

    /// The routing-relevant code.
    pub fn primary(&self) -> u8 {
        self.0[0]
    }

    pub fn codes(&self) -> &[u8] {
        &self.0
    }

    pub fn encoded_len(&self) -> usize {
        self.0.len()
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        encode_components(&self.0, dst);
    }

    /// Decode from the start of `src`, returning the path and bytes consumed.
    pub fn decode(src: &[u8]) -> Result<(Self, usize)> {
        let (codes, used) =
            scan_components(src).ok_or(FrameError::Malformed("unterminated type field"))?;
        Ok((Self(codes), used))
    }
}

impl fmt::Display for TypePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, code) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "0x{code:02X}")?;
        }
        Ok(())
    }
}

/// Maps type codes to human-readable labels.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    labels: BTreeMap<u8, Cow<'static, str>>,
}

impl TypeRegistry {
    /// A registry with no labels at all.
    pub fn empty() -> Self {
        Self {
            labels: BTreeMap::new(),
        }
    }

    /// Register or replace the label for `code`.
    pub fn register(&mut self, code: u8, label: impl Into<Cow<'static, str>>) -> Result<()> {
        if code > MAX_COMPONENT {
            return Err(FrameError::InvalidType(code));
        }
        self.labels.insert(code, label.into());
        Ok(())
    }

    pub fn label(&self, code: u8) -> Option<&str> {
        self.labels.get(&code).map(|label| label.as_ref())
    }

    /// Reverse lookup, case-insensitive.
    pub fn lookup_name(&self, name: &str) -> Option<u8> {
        self.labels
            .iter()
            .find(|(_, label)| label.eq_ignore_ascii_case(name))
            .map(|(code, _)| *code)
    }

    /// `"0x15 (hci)"`, or `"0x99 (unregistered)"` for unknown codes.
    pub fn describe(&self, code: u8) -> String {
        format!(
            "0x{code:02X} ({})",
            self.label(code).unwrap_or("unregistered")
        )
    }

    /// All entries ordered by code.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &str)> {
        self.labels.iter().map(|(code, label)| (*code, label.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        let labels = BUILTIN_LABELS
            .iter()
            .map(|(code, label)| (*code, Cow::Borrowed(*label)))
            .collect();
        Self { labels }
    }
}
