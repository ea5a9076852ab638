//! The two ways of getting rid of fragmentation.
//!
//! Both keep occupied elements in table order and move their bytes
//! to the front of fresh storage, then replace every free element
//! with a single one. They differ in where the reclaimed free bytes
//! end up:
//!
//! - [`Strategy::SingleRegion`] appends them to the same block, right
//!   after the occupied bytes.
//! - [`Strategy::SplitRegion`] moves them to a block of their own,
//!   copied in free-chain order.
//!
//! Nothing of the old storage is released until the new one is
//! complete, so an error leaves the table exactly as it was.
use crate::storage::Packer;
use crate::table::retain_occupied;
use crate::utils::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// One block, free space at its tail. A single linear pass.
    SingleRegion,
    /// An occupied block followed by a free block.
    SplitRegion,
}

impl Table {
    pub fn compact(&mut self, strategy: Strategy) -> Result<(), TableError> {
        match strategy {
            Strategy::SingleRegion  => self.compact_single_region(),
            Strategy::SplitRegion   => self.compact_split_region(),
        }
    }

    /// Copies occupied bytes to the front of one new block of
    /// `total_size` bytes. The space left behind them becomes the
    /// one free element, appended last.
    pub fn compact_single_region(&mut self) -> Result<(), TableError> {
        if self.elements.is_empty() {
            debug!("nothing to compact");
            return Ok(());
        }

        let mut region = Packer::new(self.total_size);
        let moved = self.pack_occupied(&mut region)?;
        let mut elements = retain_occupied(moved)?;
        let free_start = region.watermark();
        let tail = region.block.end() - free_start;
        if tail != self.free_size {
            return Err(TableError::SizeMismatch { what: "reclaimed tail", tracked: self.free_size, counted: tail });
        }
        elements.push(self.merged_free(free_start));

        self.install(elements, vec![region.block]);
        debug!(elements = self.elements.len(), free_size = self.free_size, "single-region compaction done");

        Ok(())
    }

    /// Copies occupied bytes, in table order, into a block of their own,
    /// then free bytes, in free-chain order, into a second block. The
    /// second block becomes the one free element, appended last.
    pub fn compact_split_region(&mut self) -> Result<(), TableError> {
        if self.elements.is_empty() {
            debug!("nothing to compact");
            return Ok(());
        }

        let head = self.free_chain_head()?;
        let occupied_len = self.total_size
            .checked_sub(self.free_size)
            .ok_or(TableError::SizeMismatch {
                what:       "free share of total",
                tracked:    self.total_size,
                counted:    self.free_size,
            })?;

        let mut occupied = Packer::new(occupied_len);
        let moved = self.pack_occupied(&mut occupied)?;
        if occupied.cursor != occupied_len {
            return Err(TableError::SizeMismatch { what: "occupied bytes", tracked: occupied_len, counted: occupied.cursor });
        }

        let mut free = Packer::new(self.free_size);
        let mut at = head;
        // Where the walk came from. The head was reached by rewinding,
        // so it is its own origin.
        let mut from = head;
        let mut visited = 0;
        while let Some(pos) = at {
            visited += 1;
            if visited > self.elements.len() {
                return Err(TableError::CyclicChain(pos));
            }
            let e = self.elements.get(pos).ok_or(TableError::BadPosition(pos))?;
            if !e.is_free() {
                return Err(TableError::CrossOwner { from: from.unwrap_or(pos), to: pos, owner: FREE, other: e.owner });
            }
            free.push(self.bytes_of(e)?)
                .ok_or(TableError::SizeMismatch { what: "free chain", tracked: self.free_size, counted: free.cursor + e.size })?;
            from = at;
            at = e.next;
        }
        if free.cursor != self.free_size {
            return Err(TableError::SizeMismatch { what: "free chain", tracked: self.free_size, counted: free.cursor });
        }

        let mut elements = retain_occupied(moved)?;
        elements.push(self.merged_free(free.block.base()));

        self.install(elements, vec![occupied.block, free.block]);
        debug!(elements = self.elements.len(), free_size = self.free_size, "split-region compaction done");

        Ok(())
    }

    /// Copies every occupied element, in table order, into `into`.
    /// Returns the element vector with occupied addresses pointing at
    /// the copies; free elements are still there, untouched.
    fn pack_occupied(&self, into: &mut Packer) -> Result<Vec<Element>, TableError> {
        let mut moved = self.elements.clone();
        for e in moved.iter_mut().filter(|e| !e.is_free()) {
            let src = self.bytes_of(e)?;
            e.addr = into.push(src)
                .ok_or(TableError::SizeMismatch {
                    what:       "packed bytes",
                    tracked:    into.block.len(),
                    counted:    into.cursor + e.size,
                })?;
        }

        Ok(moved)
    }

    /// The element standing for all free space once it is contiguous.
    /// It is a chain of its own, with neither neighbour.
    fn merged_free(&self, addr: Addr) -> Element {
        Element {
            id:     self.next_id,
            addr,
            size:   self.free_size,
            owner:  FREE,
            next:   None,
            prev:   None,
        }
    }

    // The old blocks are dropped here, and not a moment earlier.
    fn install(&mut self, elements: Vec<Element>, blocks: Vec<Block>) {
        self.next_id += 1;
        self.elements = elements;
        self.blocks = blocks;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(t: &mut Table) {
        for pos in 0..t.len() {
            let id = t.elements[pos].id as u8;
            t.bytes_mut(pos).unwrap().fill(id);
        }
    }

    // Everything a failed compaction must leave alone.
    fn frozen(t: &Table) -> (Vec<Element>, Vec<(Addr, Vec<u8>)>, Uid) {
        let blocks = t.blocks
            .iter()
            .map(|b| (b.base(), b.as_slice().to_vec()))
            .collect();

        (t.elements.clone(), blocks, t.next_id)
    }

    #[test]
    fn free_bytes_follow_the_chain_not_the_table() {
        let mut t = Table::from_layout([(FREE, 1), (1, 1), (FREE, 2), (FREE, 3)]);
        stamp(&mut t);
        // Chain becomes 2 -> 3 -> 0.
        t.elements[0].prev = Some(3);
        t.elements[0].next = None;
        t.elements[2].prev = None;
        t.elements[3].next = Some(0);

        t.compact_split_region().unwrap();
        assert_eq!(t.blocks[0].as_slice(), &[2]);
        assert_eq!(t.blocks[1].as_slice(), &[3, 3, 4, 4, 4, 1]);
        assert_eq!(t.elements.last().unwrap().size, 6);
    }

    #[test]
    fn short_free_chain_leaves_the_table_alone() {
        let mut t = Table::from_layout([(FREE, 2), (1, 1), (FREE, 2)]);
        stamp(&mut t);
        t.elements[0].next = None;
        t.elements[2].prev = None;
        let before = frozen(&t);

        assert_eq!(
            t.compact_split_region(),
            Err(TableError::SizeMismatch { what: "free chain", tracked: 4, counted: 2 })
        );
        assert_eq!(frozen(&t), before);
    }

    #[test]
    fn stray_address_leaves_the_table_alone() {
        let mut t = Table::from_layout([(1, 2), (FREE, 1), (1, 2)]);
        stamp(&mut t);
        let stray = t.blocks[0].end() + 1;
        t.elements[2].addr = stray;
        let before = frozen(&t);

        assert_eq!(
            t.compact_single_region(),
            Err(TableError::Unmapped { id: 3, addr: stray, len: 2 })
        );
        assert_eq!(frozen(&t), before);
        assert!(matches!(t.compact_split_region(), Err(TableError::Unmapped { id: 3, .. })));
        assert_eq!(frozen(&t), before);
    }

    #[test]
    fn free_chain_leaking_into_a_process_is_reported_at_the_link() {
        let mut t = Table::from_layout([(FREE, 1), (1, 1), (FREE, 1)]);
        t.elements[0].next = Some(1);
        let before = frozen(&t);

        assert_eq!(
            t.compact_split_region(),
            Err(TableError::CrossOwner { from: 0, to: 1, owner: FREE, other: 1 })
        );
        assert_eq!(frozen(&t), before);
    }
}
