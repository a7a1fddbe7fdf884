//! Bounded byte scans.
//!
//! Every scan takes an explicit slice; nothing relies on a terminator byte.

/// A set of bytes, stored as a 256-bit table.
#[derive(Debug, Clone, Copy)]
pub struct ByteSet([u32; 8]);

impl ByteSet {
    /// Build a set from the bytes of `members`.
    pub const fn new(members: &[u8]) -> Self {
        let mut bits = [0u32; 8];
        let mut i = 0;
        while i < members.len() {
            let b = members[i] as usize;
            bits[b / 32] |= 1 << (b % 32);
            i += 1;
        }
        Self(bits)
    }

    /// Whether `byte` is a member.
    #[inline]
    pub const fn contains(&self, byte: u8) -> bool {
        let b = byte as usize;
        self.0[b / 32] & (1 << (b % 32)) != 0
    }
}

/// Length of the initial run of `hay` containing no byte of `set`.
///
/// Equals `hay.len()` when no member occurs.
pub fn cspan(hay: &[u8], set: &ByteSet) -> usize {
    hay.iter().position(|&b| set.contains(b)).unwrap_or(hay.len())
}

/// Length of the initial run of `hay` consisting of bytes accepted by `pred`.
#[inline]
pub fn span_while(hay: &[u8], pred: impl Fn(u8) -> bool) -> usize {
    hay.iter().position(|&b| !pred(b)).unwrap_or(hay.len())
}

/// Offset of the first occurrence of `needle` in `hay`.
#[inline]
pub fn find(hay: &[u8], needle: &[u8]) -> Option<usize> {
    memchr::memmem::find(hay, needle)
}

/// Offset of the first `byte` in `hay`.
#[inline]
pub fn find_byte(hay: &[u8], byte: u8) -> Option<usize> {
    memchr::memchr(byte, hay)
}

/// RFC 822 linear whitespace as handled by the parser.
#[inline]
pub fn is_ws(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}
