use crate::utils::*;

impl Table {
    /// Duplicates the table, storage included.
    ///
    /// Every block is copied to a fresh base, and every element is
    /// rebased onto the copy of the block that contains it. Links are
    /// positions and carry over untouched. The two tables share nothing
    /// afterwards.
    ///
    /// An element that no block contains means the source is corrupt;
    /// nothing is returned in that case.
    pub fn deep_copy(&self) -> Result<Table, TableError> {
        let blocks: Vec<Block> = self.blocks
            .iter()
            .map(Block::copy_of)
            .collect();
        for (old, new) in self.blocks.iter().zip(&blocks) {
            trace!(from = old.base(), to = new.base(), len = old.len(), "block copied");
        }

        let mut elements = self.elements.clone();
        for e in &mut elements {
            let (idx, off) = self.home_of(e.addr, e.size)
                .ok_or(TableError::Unmapped { id: e.id, addr: e.addr, len: e.size })?;
            e.addr = blocks[idx].base() + off;
        }
        debug!(elements = elements.len(), blocks = blocks.len(), "table copied");

        Ok(Table {
            elements,
            blocks,
            free_size:  self.free_size,
            total_size: self.total_size,
            next_id:    self.next_id,
        })
    }
}

impl Clone for Table {
    /// Panics if the table is internally inconsistent;
    /// use [`Table::deep_copy`] to handle that case.
    fn clone(&self) -> Self {
        match self.deep_copy() {
            Ok(t)   => t,
            Err(e)  => panic!("Corrupt table cannot be cloned: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmapped_element_aborts_the_copy() {
        let mut t = Table::from_layout([(1, 8), (FREE, 8)]);
        let stray = t.blocks[0].end() + 1;
        t.elements[1].addr = stray;
        assert_eq!(
            t.deep_copy().err(),
            Some(TableError::Unmapped { id: 2, addr: stray, len: 8 })
        );
    }

    #[test]
    #[should_panic(expected = "Corrupt table")]
    fn clone_refuses_corrupt_tables() {
        let mut t = Table::from_layout([(1, 8)]);
        t.elements[0].addr = 0;
        let _ = t.clone();
    }

    #[test]
    fn copies_rebase_per_block() {
        let mut t = Table::from_layout([(1, 3), (FREE, 2), (2, 4)]);
        t.compact_split_region().unwrap();
        let dup = t.deep_copy().unwrap();
        for pos in 0..t.len() {
            assert_eq!(t.locate(pos).unwrap(), dup.locate(pos).unwrap());
        }
    }
}
