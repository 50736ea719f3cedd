use serde::Serialize;
use std::fmt;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Addr(pub u32);

impl Addr {
    pub fn offset(self, by: i32) -> Self {
        Addr(self.0.wrapping_add(by as u32))
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Program order tag. Allocated once per dispatched instruction and never reused.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Tag(pub u64);

impl Tag {
    pub fn next(self) -> Self {
        Tag(self.0 + 1)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Mask covering the low `bytes` bytes of a word.
pub fn width_mask(bytes: u32) -> u32 {
    match bytes {
        0 => 0,
        1..=3 => (1 << (8 * bytes)) - 1,
        _ => u32::MAX,
    }
}
