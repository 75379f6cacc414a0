//! Frame integrity trailer: CRC-16/CCITT-FALSE.

const POLY: u16 = 0x1021;
const INIT: u16 = 0xFFFF;

/// Compute the 16-bit trailer value over `data`.
pub fn checksum(data: &[u8]) -> u16 {
    data.iter().fold(INIT, |crc, byte| {
        (0..8).fold(crc ^ (u16::from(*byte) << 8), |crc, _| {
            if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(checksum(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_empty_input_is_init() {
        assert_eq!(checksum(&[]), 0xFFFF);
    }

    #[test]
    fn test_single_byte_change_alters_checksum() {
        let base = [0x01, 0x15, 0xAA, 0xBB];
        let expected = checksum(&base);
        for i in 0..base.len() {
            for flip in 1..=255u8 {
                let mut corrupted = base;
                corrupted[i] ^= flip;
                assert_ne!(checksum(&corrupted), expected, "byte {i} xor {flip:#04x}");
            }
        }
    }
}
