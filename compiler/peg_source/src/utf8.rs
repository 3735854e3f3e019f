//! UTF-8 decoding driven by the lead byte.
//!
//! Continuation bytes are masked, not validated: malformed input decodes to
//! some code point rather than an error.

/// Encoded length announced by a lead byte (1 for ASCII, stray continuation
/// bytes, and invalid leads).
#[inline]
pub fn utf8_len(lead: u8) -> usize {
    match lead {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}

/// Combine a lead byte with up to three following bytes.
pub(crate) fn decode(lead: u8, rest: [u8; 3]) -> u32 {
    let cont = |b: u8| u32::from(b & 0x3F);
    match utf8_len(lead) {
        2 => (u32::from(lead & 0x1F) << 6) | cont(rest[0]),
        3 => (u32::from(lead & 0x0F) << 12) | (cont(rest[0]) << 6) | cont(rest[1]),
        4 => {
            (u32::from(lead & 0x07) << 18)
                | (cont(rest[0]) << 12)
                | (cont(rest[1]) << 6)
                | cont(rest[2])
        }
        _ => u32::from(lead),
    }
}

/// Whether `byte` continues a multi-byte sequence.
#[inline]
pub(crate) fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}
