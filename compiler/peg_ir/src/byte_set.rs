//! 256-bit byte sets for byte-class terminals.

use std::fmt;

/// Set of byte values, stored as a 256-bit bitmap.
///
/// End of input is never a member: a byte class always fails at EOF.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct ByteSet {
    bits: [u64; 4],
}

impl ByteSet {
    pub const EMPTY: ByteSet = ByteSet { bits: [0; 4] };
    pub const FULL: ByteSet = ByteSet {
        bits: [u64::MAX; 4],
    };

    #[inline]
    pub const fn new() -> Self {
        Self::EMPTY
    }

    pub fn from_byte(byte: u8) -> Self {
        let mut set = Self::EMPTY;
        set.insert(byte);
        set
    }

    /// Inclusive range `lo..=hi`. Empty when `lo > hi`.
    pub fn from_range(lo: u8, hi: u8) -> Self {
        let mut set = Self::EMPTY;
        for b in lo..=hi {
            set.insert(b);
        }
        set
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut set = Self::EMPTY;
        for &b in bytes {
            set.insert(b);
        }
        set
    }

    #[inline]
    pub fn insert(&mut self, byte: u8) {
        self.bits[usize::from(byte >> 6)] |= 1u64 << (byte & 63);
    }

    #[inline]
    pub fn remove(&mut self, byte: u8) {
        self.bits[usize::from(byte >> 6)] &= !(1u64 << (byte & 63));
    }

    #[inline]
    pub fn contains(&self, byte: u8) -> bool {
        self.bits[usize::from(byte >> 6)] & (1u64 << (byte & 63)) != 0
    }

    #[must_use]
    pub fn union(&self, other: &ByteSet) -> ByteSet {
        let mut bits = self.bits;
        for (word, other) in bits.iter_mut().zip(other.bits) {
            *word |= other;
        }
        ByteSet { bits }
    }

    #[must_use]
    pub fn complement(&self) -> ByteSet {
        ByteSet {
            bits: self.bits.map(|w| !w),
        }
    }

    pub fn len(&self) -> u32 {
        self.bits.iter().map(|w| w.count_ones()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bits == [0; 4]
    }

    /// The only member, if the set has exactly one.
    pub fn single(&self) -> Option<u8> {
        if self.len() == 1 {
            self.iter().next()
        } else {
            None
        }
    }

    /// Members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(move |&b| self.contains(b))
    }
}

impl FromIterator<u8> for ByteSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = ByteSet::EMPTY;
        for b in iter {
            set.insert(b);
        }
        set
    }
}

/// Renders as a bracketed class with ranges collapsed, e.g. `[0-9a-f]`.
impl fmt::Debug for ByteSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        let mut b: u16 = 0;
        while b < 256 {
            let lo = b as u8;
            if !self.contains(lo) {
                b += 1;
                continue;
            }
            let mut hi = lo;
            while hi < u8::MAX && self.contains(hi + 1) {
                hi += 1;
            }
            write_class_byte(f, lo)?;
            if hi > lo {
                f.write_str("-")?;
                write_class_byte(f, hi)?;
            }
            b = u16::from(hi) + 1;
        }
        f.write_str("]")
    }
}

fn write_class_byte(f: &mut fmt::Formatter<'_>, byte: u8) -> fmt::Result {
    match byte {
        b'\n' => f.write_str("\\n"),
        b'\t' => f.write_str("\\t"),
        b'\r' => f.write_str("\\r"),
        b'\\' | b']' | b'-' => write!(f, "\\{}", byte as char),
        0x21..=0x7e => write!(f, "{}", byte as char),
        _ => write!(f, "\\x{byte:02x}"),
    }
}
