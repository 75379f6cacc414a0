//! Lowercase hex for log lines, CLI output and address parsing.

use ::hex::FromHexError;

/// Errors from [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HexError {
    #[error("odd number of hex digits")]
    OddLength,

    #[error("invalid hex digit {digit:?} at offset {offset}")]
    InvalidDigit { digit: char, offset: usize },
}

impl From<FromHexError> for HexError {
    fn from(err: FromHexError) -> Self {
        match err {
            FromHexError::InvalidHexCharacter { c, index } => Self::InvalidDigit {
                digit: c,
                offset: index,
            },
            FromHexError::OddLength | FromHexError::InvalidStringLength => Self::OddLength,
        }
    }
}

/// Two lowercase digits per byte, joined by `sep`.
pub fn encode(bytes: &[u8], sep: &str) -> String {
    if sep.is_empty() {
        return ::hex::encode(bytes);
    }
    bytes
        .iter()
        .map(|b| ::hex::encode([*b]))
        .collect::<Vec<_>>()
        .join(sep)
}

/// Parse hex digits, skipping whitespace and the `:`/`-` separators.
///
/// Offsets in errors count digits only.
pub fn decode(input: &str) -> Result<Vec<u8>, HexError> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    Ok(::hex::decode(digits)?)
}
