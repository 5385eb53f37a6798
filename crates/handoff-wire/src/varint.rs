//! Variable-length integers, 7 bits per byte.
//!
//! Each byte carries 7 value bits (least significant group first); the
//! high bit says "more bytes follow". A `u32` needs at most 5 bytes.
//!
//! ```text
//! 300 = 0b1_0010_1100  →  [0xAC, 0x02]
//! ```
//!
//! [`peek`] and [`length`] let a framing layer ask "is there a complete
//! value yet?" without consuming input: `None` means wait for more bytes
//! (or give up if the prefix is already longer than 5 bytes).

/// Maximum encoded size of a `u32`.
pub const MAX_BYTES: usize = 5;

const CONTINUE: u8 = 0x80;
const SEGMENT: u8 = 0x7F;

/// Appends `value` to `out`.
pub fn write(out: &mut Vec<u8>, mut value: u32) {
    while value >= u32::from(CONTINUE) {
        out.push((value as u8 & SEGMENT) | CONTINUE);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Reads a value from the front of `buf` and advances it.
///
/// On `None` the slice is left untouched.
pub fn read(buf: &mut &[u8]) -> Option<u32> {
    let (value, len) = decode_prefix(buf)?;
    *buf = &buf[len..];
    Some(value)
}

/// Reads a value without consuming anything.
pub fn peek(buf: &[u8]) -> Option<u32> {
    decode_prefix(buf).map(|(value, _)| value)
}

/// Number of bytes the value at the front of `buf` occupies.
pub fn length(buf: &[u8]) -> Option<usize> {
    decode_prefix(buf).map(|(_, len)| len)
}

/// Number of bytes [`write`] will emit for `value`.
pub fn size(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}

fn decode_prefix(buf: &[u8]) -> Option<(u32, usize)> {
    let mut value = 0u32;
    for (i, &byte) in buf.iter().take(MAX_BYTES).enumerate() {
        let bits = u32::from(byte & SEGMENT);
        // The fifth byte only has room for the top 4 bits of a u32.
        if i == MAX_BYTES - 1 && bits > 0x0F {
            return None;
        }
        value |= bits << (7 * i);
        if byte & CONTINUE == 0 {
            return Some((value, i + 1));
        }
    }
    None
}
