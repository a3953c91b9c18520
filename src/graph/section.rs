//! gid / section / link primitives shared by the graph store and every
//! downstream component that addresses a walk by `(gid, pos)`.

use std::fmt;

/// A 32-bit graph id: low bit is strand (0 = forward, 1 = reverse), the
/// remaining bits are the section index. Every logical section occupies
/// two adjacent gids.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Gid(pub u32);

impl Gid {
    #[inline]
    pub fn new(section_idx: u32, reverse: bool) -> Self {
        Gid((section_idx << 1) | (reverse as u32))
    }

    #[inline]
    pub fn section_idx(self) -> u32 {
        self.0 >> 1
    }

    #[inline]
    pub fn is_reverse(self) -> bool {
        (self.0 & 1) != 0
    }

    #[inline]
    pub fn rev(self) -> Gid {
        Gid(self.0 ^ 1)
    }

    pub const MAX: Gid = Gid(u32::MAX);
}

impl fmt::Debug for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Gid({}, {})",
            self.section_idx(),
            if self.is_reverse() { "rv" } else { "fw" }
        )
    }
}

/// A walk position: the starting section and an in-section byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GidPos {
    pub gid: Gid,
    pub pos: u32,
}

/// A `(packed_kmer, gid, pos)` tuple, the unit the enumerator yields and the
/// k-mer index is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KmerTuple {
    pub kmer: u64,
    pub gid: Gid,
    pub pos: u32,
}

/// A section's length and the storage it reads its forward-strand 4-bit
/// codes from. The reverse-strand gid of the same section shares this
/// record; readers branch on `Gid::is_reverse`.
#[derive(Debug, Clone, Copy)]
pub struct Section {
    pub gid_fw: Gid,
    pub len: u32,
}
