use crate::utils::*;

/// One logical chunk of memory: `size` bytes starting at `addr`,
/// held by process `owner` (or free, if the owner is [`FREE`]).
///
/// Elements of the same owner form a doubly linked *chain*.
/// `next`/`prev` are positions in the owning [`Table`], so that
/// moving bytes around never invalidates them; only removing
/// elements does, and [`Table`] remaps them when that happens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    pub id:     Uid,
    pub addr:   Addr,
    pub size:   ByteSize,
    pub owner:  Pid,
    pub next:   Option<Pos>,
    pub prev:   Option<Pos>,
}

impl Element {
    #[inline]
    pub fn is_free(&self) -> bool {
        self.owner == FREE
    }

    /// One past the last byte.
    #[inline]
    pub fn end(&self) -> Addr {
        self.addr + self.size
    }

    /// Zero-length elements overlap nothing.
    pub fn overlaps(&self, other: &Element) -> bool {
        self.size != 0
            && other.size != 0
            && self.addr < other.end()
            && other.addr < self.end()
    }

    /// Single-element chains have neither neighbour.
    pub fn is_detached(&self) -> bool {
        self.next.is_none() && self.prev.is_none()
    }
}
