//! Consistent overhead byte stuffing.
//!
//! A stuffed packet never contains a zero byte except the terminator, so a
//! stream reader finds frame boundaries by scanning for `0x00`. Each zero-free
//! run of the input is written as blocks of at most 254 bytes, each prefixed
//! by `len + 1`. A full block (code `0xFF`) carries no implied zero.

use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Frame terminator in the stuffed stream.
pub const TERMINATOR: u8 = 0x00;

/// Maximum data bytes per block.
pub const MAX_BLOCK: usize = 254;

const FULL_BLOCK_CODE: u8 = 0xFF;

/// Upper bound on the stuffed size of `len` input bytes, terminator included.
pub fn max_stuffed_len(len: usize) -> usize {
    len + len / MAX_BLOCK + 2
}

/// Stuff `src` and append it, terminator included, to `dst`.
pub fn stuff_into(src: &[u8], dst: &mut BytesMut) {
    dst.reserve(max_stuffed_len(src.len()));
    for run in src.split(|b| *b == 0) {
        let mut rest = run;
        // A run of exactly 254 still gets an empty trailing block so the
        // implied zero after it is not lost.
        while rest.len() >= MAX_BLOCK {
            dst.put_u8(FULL_BLOCK_CODE);
            dst.put_slice(&rest[..MAX_BLOCK]);
            rest = &rest[MAX_BLOCK..];
        }
        dst.put_u8(rest.len() as u8 + 1);
        dst.put_slice(rest);
    }
    dst.put_u8(TERMINATOR);
}

/// Stuff `src` into a new buffer.
pub fn stuff(src: &[u8]) -> BytesMut {
    let mut dst = BytesMut::with_capacity(max_stuffed_len(src.len()));
    stuff_into(src, &mut dst);
    dst
}

/// Reverse [`stuff`]. `src` must end with (or contain) the terminator.
pub fn unstuff(src: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(src.len());
    let mut pos = 0usize;
    loop {
        let code = *src.get(pos).ok_or(FrameError::Cobs("missing terminator"))?;
        if code == TERMINATOR {
            return Ok(out);
        }
        let end = pos + code as usize;
        if end >= src.len() {
            return Err(FrameError::Cobs("block overruns packet"));
        }
        let block = &src[pos + 1..end];
        if block.contains(&TERMINATOR) {
            return Err(FrameError::Cobs("zero byte inside block"));
        }
        out.extend_from_slice(block);
        pos = end;
        if code != FULL_BLOCK_CODE && src[pos] != TERMINATOR {
            out.push(0);
        }
    }
}
