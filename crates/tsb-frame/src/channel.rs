//! Hierarchical channel paths.
//!
//! A path such as `3.4.5` addresses device 3, sub-channel 4, leaf 5. On the
//! wire each component is one byte; every component except the last carries
//! the continuation bit (`0x80`), so `3.4.5` encodes as `83 84 05`. The empty
//! path encodes as a single zero byte.

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Continuation marker on every non-final path byte.
pub const CONTINUATION: u8 = 0x80;

/// Largest value a single path component can hold.
pub const MAX_COMPONENT: u8 = 0x7F;

/// A routing path: one or more components in `0..=127`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelPath(Vec<u8>);

impl ChannelPath {
    /// The root path `[0]`, which is also what an empty path encodes to.
    pub fn root() -> Self {
        Self(vec![0])
    }

    /// Build a path from components. An empty slice yields the root path.
    pub fn new(components: &[u8]) -> Result<Self> {
        if components.is_empty() {
            return Ok(Self::root());
        }
        if let Some(bad) = components.iter().find(|c| **c > MAX_COMPONENT) {
            return Err(FrameError::InvalidChannel(format!(
                "component {bad} exceeds {MAX_COMPONENT}"
            )));
        }
        Ok(Self(components.to_vec()))
    }

    /// A single-component path.
    pub fn single(component: u8) -> Result<Self> {
        Self::new(&[component])
    }

    /// Path components, outermost first.
    pub fn components(&self) -> &[u8] {
        &self.0
    }

    /// First (outermost) component.
    pub fn leading(&self) -> u8 {
        self.0[0]
    }

    /// First byte on the wire: the leading component, with the continuation
    /// bit set when more components follow.
    pub fn first_wire_byte(&self) -> u8 {
        if self.0.len() > 1 {
            self.0[0] | CONTINUATION
        } else {
            self.0[0]
        }
    }

    /// The component if this path has exactly one.
    pub fn as_single(&self) -> Option<u8> {
        match self.0.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Number of bytes this path occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        self.0.len()
    }

    /// Append the wire form to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        encode_components(&self.0, dst);
    }

    /// The wire form as an owned buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.to_vec()
    }

    /// Decode a path from the start of `src`, returning it and the number of
    /// bytes consumed.
    pub fn decode(src: &[u8]) -> Result<(Self, usize)> {
        let (components, used) = scan_components(src)
            .ok_or_else(|| FrameError::InvalidChannel("unterminated channel path".into()))?;
        Ok((Self(components), used))
    }
}

impl Default for ChannelPath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for ChannelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{component}")?;
        }
        Ok(())
    }
}

impl FromStr for ChannelPath {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        let components = s
            .split('.')
            .map(|part| {
                part.trim()
                    .parse::<u8>()
                    .ok()
                    .filter(|c| *c <= MAX_COMPONENT)
                    .ok_or_else(|| FrameError::InvalidChannel(s.to_string()))
            })
            .collect::<Result<Vec<u8>>>()?;
        Self::new(&components)
    }
}

/// Convert a dotted-decimal channel string to its wire bytes.
///
/// `"3.4.5"` becomes `[0x83, 0x84, 0x05]`; `""` becomes `[0x00]`.
pub fn channel_to_bytes(channel: &str) -> Result<Vec<u8>> {
    Ok(channel.parse::<ChannelPath>()?.to_bytes())
}

/// Convert wire bytes back to a dotted-decimal channel string.
///
/// Trailing bytes after the final component are rejected.
pub fn bytes_to_channel(bytes: &[u8]) -> Result<String> {
    let (path, used) = ChannelPath::decode(bytes)?;
    if used != bytes.len() {
        return Err(FrameError::InvalidChannel(format!(
            "{} trailing byte(s) after channel path",
            bytes.len() - used
        )));
    }
    Ok(path.to_string())
}

pub(crate) fn encode_components(components: &[u8], dst: &mut BytesMut) {
    let last = components.len().saturating_sub(1);
    dst.reserve(components.len());
    for (i, component) in components.iter().enumerate() {
        if i < last {
            dst.put_u8(component | CONTINUATION);
        } else {
            dst.put_u8(*component);
        }
    }
}

/// Scan bytes while the continuation bit is set, then take the first byte
/// without it. Returns `None` if `src` ends before a final byte.
pub(crate) fn scan_components(src: &[u8]) -> Option<(Vec<u8>, usize)> {
    let end = src.iter().position(|b| b & CONTINUATION == 0)?;
    let components = src[..=end].iter().map(|b| b & MAX_COMPONENT).collect();
    Some((components, end + 1))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_dotted_path_encodes_with_continuation_bits() {
        assert_eq!(channel_to_bytes("3.4.5").unwrap(), vec![0x83, 0x84, 0x05]);
    }

    #[test]
    fn test_empty_path_encodes_as_zero_byte() {
        assert_eq!(channel_to_bytes("").unwrap(), vec![0x00]);
        assert_eq!(ChannelPath::new(&[]).unwrap(), ChannelPath::root());
    }

    #[test]
    fn test_first_wire_byte_carries_continuation() {
        assert_eq!(ChannelPath::single(6).unwrap().first_wire_byte(), 0x06);
        let nested: ChannelPath = "6.1".parse().unwrap();
        assert_eq!(nested.first_wire_byte(), 0x86);
        assert_eq!(nested.first_wire_byte(), nested.to_bytes()[0]);
    }

    #[test]
    fn test_single_component_has_no_marker() {
        let path = ChannelPath::single(6).unwrap();
        assert_eq!(path.to_bytes(), vec![0x06]);
        assert_eq!(path.as_single(), Some(6));
    }

    #[test]
    fn test_decode_stops_at_first_final_byte() {
        let (path, used) = ChannelPath::decode(&[0x83, 0x04, 0x15, 0xAA]).unwrap();
        assert_eq!(path.components(), &[3, 4]);
        assert_eq!(used, 2);
    }

    #[test]
    fn test_decode_unterminated_path_fails() {
        let err = ChannelPath::decode(&[0x81, 0x82]).unwrap_err();
        assert!(matches!(err, FrameError::InvalidChannel(_)));
    }

    #[test]
    fn test_out_of_range_components_rejected() {
        assert!("3.128".parse::<ChannelPath>().is_err());
        assert!("a.b".parse::<ChannelPath>().is_err());
        assert!(ChannelPath::new(&[200]).is_err());
    }

    #[test]
    fn test_bytes_to_channel_rejects_trailing_bytes() {
        assert!(bytes_to_channel(&[0x05, 0x06]).is_err());
        assert_eq!(bytes_to_channel(&[0x83, 0x84, 0x05]).unwrap(), "3.4.5");
    }

    proptest! {
        #[test]
        fn dotted_string_survives_wire_conversion(
            parts in proptest::collection::vec(0u8..127, 1..=5)
        ) {
            let dotted = parts
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(".");
            let wire = channel_to_bytes(&dotted).unwrap();
            prop_assert_eq!(bytes_to_channel(&wire).unwrap(), dotted);
        }
    }
}
