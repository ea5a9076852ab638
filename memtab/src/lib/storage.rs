use crate::utils::*;

/// Where the first block of the process is placed. Zero stays
/// unused, so that a default-initialized address never looks valid.
const ADDR_SPACE_START: Addr = 0x1000;
/// Block bases are rounded to this many bytes.
const BLOCK_ALIGN: ByteSize = 16;

// Every block of every table in the process is carved out of the
// same monotonically growing address space. Bases are thus unique,
// ranges of distinct blocks never overlap, and an address alone
// tells which block it belongs to.
static NEXT_BASE: AtomicUsize = AtomicUsize::new(ADDR_SPACE_START);

fn reserve(len: ByteSize) -> Addr {
    //! Reserves address space for a block of `len` bytes, plus a
    //! guard byte: a block's end address is never another block's
    //! base, not even for zero-length blocks.
    let span = (len + 1).next_multiple_of(BLOCK_ALIGN);

    NEXT_BASE.fetch_add(span, Ordering::Relaxed)
}

/// An owned, zero-initialized, contiguous byte region. Elements
/// refer into it through addresses of the form [`base`](Block::base)
/// `+ offset`.
///
/// Not [`Clone`]: a copy must live at a different base.
/// See [`Block::copy_of`].
#[derive(Debug)]
pub struct Block {
    base:   Addr,
    data:   Box<[u8]>,
}

impl Block {
    pub fn zeroed(len: ByteSize) -> Self {
        Self {
            base: reserve(len),
            data: vec![0; len].into_boxed_slice(),
        }
    }

    /// A byte-for-byte duplicate living at a fresh base.
    pub fn copy_of(src: &Block) -> Self {
        Self {
            base: reserve(src.len()),
            data: src.data.clone(),
        }
    }

    #[inline]
    pub fn base(&self) -> Addr { self.base }

    #[inline]
    pub fn len(&self) -> ByteSize { self.data.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    /// One past the last address of the block.
    #[inline]
    pub fn end(&self) -> Addr { self.base + self.len() }

    /// Whether `[addr, addr + len)` lies inside the block. A zero-length
    /// range sitting exactly at [`end`](Block::end) counts as inside.
    pub fn contains(&self, addr: Addr, len: ByteSize) -> bool {
        addr >= self.base
            && addr
                .checked_add(len)
                .is_some_and(|end| end <= self.end())
    }

    /// Translates a contained range to its offset from the base.
    pub fn offset_of(&self, addr: Addr, len: ByteSize) -> Option<ByteSize> {
        if self.contains(addr, len) { Some(addr - self.base) }
        else { None }
    }

    pub fn bytes(&self, addr: Addr, len: ByteSize) -> Option<&[u8]> {
        let off = self.offset_of(addr, len)?;

        Some(&self.data[off..off + len])
    }

    pub fn bytes_mut(&mut self, addr: Addr, len: ByteSize) -> Option<&mut [u8]> {
        let off = self.offset_of(addr, len)?;

        Some(&mut self.data[off..off + len])
    }

    pub fn as_slice(&self) -> &[u8] { &self.data }

    pub fn as_mut_slice(&mut self) -> &mut [u8] { &mut self.data }
}

/// Fills a fresh block front to back. Compaction
/// uses one per destination region.
pub(crate) struct Packer {
    pub block:  Block,
    pub cursor: ByteSize,
}

impl Packer {
    pub fn new(len: ByteSize) -> Self {
        Self {
            block:  Block::zeroed(len),
            cursor: 0,
        }
    }

    /// Appends `src` and returns the address it landed on,
    /// or `None` if the block has no room left for it.
    pub fn push(&mut self, src: &[u8]) -> Option<Addr> {
        let end = self.cursor.checked_add(src.len())?;
        if end > self.block.len() { return None; }
        self.block.as_mut_slice()[self.cursor..end].copy_from_slice(src);
        let landed = self.block.base() + self.cursor;
        self.cursor = end;

        Some(landed)
    }

    /// Address of the first byte not yet written.
    pub fn watermark(&self) -> Addr {
        self.block.base() + self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bases_never_collide() {
        let a = Block::zeroed(0);
        let b = Block::zeroed(0);
        let c = Block::zeroed(33);
        let d = Block::zeroed(1);
        assert_ne!(a.base(), b.base());
        assert!(c.end() < d.base() || d.end() < c.base());
        assert_eq!(c.base() % BLOCK_ALIGN, 0);
    }

    #[test]
    fn containment_is_by_range() {
        let b = Block::zeroed(10);
        assert!(b.contains(b.base(), 10));
        assert!(b.contains(b.base() + 3, 7));
        assert!(b.contains(b.end(), 0));
        assert!(!b.contains(b.base() + 3, 8));
        assert!(!b.contains(b.base() - 1, 1));
        assert!(!b.contains(usize::MAX, 2));
        assert_eq!(b.offset_of(b.base() + 4, 2), Some(4));
    }

    #[test]
    fn copies_move_but_keep_bytes() {
        let mut src = Block::zeroed(4);
        src.as_mut_slice().copy_from_slice(&[1, 2, 3, 4]);
        let dup = Block::copy_of(&src);
        assert_ne!(dup.base(), src.base());
        assert_eq!(dup.as_slice(), src.as_slice());
    }

    #[test]
    fn packer_stops_at_capacity() {
        let mut p = Packer::new(5);
        let first = p.push(&[7, 7, 7]).unwrap();
        assert_eq!(first, p.block.base());
        assert_eq!(p.push(&[9, 9]), Some(p.block.base() + 3));
        assert!(p.push(&[1]).is_none());
        assert_eq!(p.watermark(), p.block.end());
        assert_eq!(p.block.as_slice(), &[7, 7, 7, 9, 9]);
    }
}
