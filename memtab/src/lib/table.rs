use crate::utils::*;

/// An ordered collection of [`Element`]s together with the
/// [`Block`]s backing them.
///
/// Tables come out of [`generate`](crate::generate::generate),
/// [`Table::from_layout`] or [`Table::deep_copy`] and are then
/// rewritten in place by one of the compaction strategies.
/// Dropping a table releases its blocks.
#[derive(Debug)]
pub struct Table {
    pub(crate) elements:    Vec<Element>,
    pub(crate) blocks:      Vec<Block>,
    pub(crate) free_size:   ByteSize,
    pub(crate) total_size:  ByteSize,
    pub(crate) next_id:     Uid,
}

/// How scattered a table's free space is.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FragStats {
    pub free_fragments: usize,
    pub largest_free:   ByteSize,
    pub free_size:      ByteSize,
    /// `1 - largest_free / free_size`. Zero when all free
    /// space is contiguous, or when there is none.
    pub ratio:          f64,
}

impl Table {
    /// Lays out one element per `(owner, size)` pair, in order, back
    /// to back in a single zero-filled block. Each element is appended
    /// to the tail of its owner's chain. Ids start at 1.
    pub fn from_layout<I>(layout: I) -> Self
    where I: IntoIterator<Item = (Pid, ByteSize)> {
        let mut tails = ChainTails::default();
        let mut elements: Vec<Element> = vec![];
        let (mut total_size, mut free_size) = (0, 0);
        let mut next_id: Uid = 1;

        for (pos, (owner, size)) in layout.into_iter().enumerate() {
            let prev = tails.insert(owner, pos);
            if let Some(p) = prev {
                elements[p].next = Some(pos);
            }
            if owner == FREE { free_size += size; }
            total_size += size;
            elements.push(Element {
                id:     next_id,
                // Known only once the block exists.
                addr:   0,
                size,
                owner,
                next:   None,
                prev,
            });
            next_id += 1;
        }

        let block = Block::zeroed(total_size);
        let mut addr = block.base();
        for e in &mut elements {
            e.addr = addr;
            addr += e.size;
        }

        Self {
            elements,
            blocks: vec![block],
            free_size,
            total_size,
            next_id,
        }
    }

    pub fn elements(&self) -> &[Element] { &self.elements }

    pub fn get(&self, pos: Pos) -> Option<&Element> { self.elements.get(pos) }

    pub fn len(&self) -> usize { self.elements.len() }

    pub fn is_empty(&self) -> bool { self.elements.is_empty() }

    pub fn blocks(&self) -> &[Block] { &self.blocks }

    pub fn total_size(&self) -> ByteSize { self.total_size }

    pub fn free_size(&self) -> ByteSize { self.free_size }

    pub fn occupied_size(&self) -> ByteSize { self.total_size - self.free_size }

    /// The id the next synthesized element will receive.
    pub fn next_id(&self) -> Uid { self.next_id }

    /// Index of the owned block holding `[addr, addr + len)`, and the
    /// range's offset within it. Blocks are probed in order.
    pub(crate) fn home_of(&self, addr: Addr, len: ByteSize) -> Option<(usize, ByteSize)> {
        self.blocks
            .iter()
            .enumerate()
            .find_map(|(idx, b)| b.offset_of(addr, len).map(|off| (idx, off)))
    }

    fn element(&self, pos: Pos) -> Result<&Element, TableError> {
        self.elements.get(pos).ok_or(TableError::BadPosition(pos))
    }

    /// Which block the element at `pos` lives in, and where.
    pub fn locate(&self, pos: Pos) -> Result<(usize, ByteSize), TableError> {
        let e = self.element(pos)?;

        self.home_of(e.addr, e.size)
            .ok_or(TableError::Unmapped { id: e.id, addr: e.addr, len: e.size })
    }

    pub(crate) fn bytes_of(&self, e: &Element) -> Result<&[u8], TableError> {
        self.blocks
            .iter()
            .find_map(|b| b.bytes(e.addr, e.size))
            .ok_or(TableError::Unmapped { id: e.id, addr: e.addr, len: e.size })
    }

    /// The contents of the element at `pos`.
    pub fn bytes(&self, pos: Pos) -> Result<&[u8], TableError> {
        self.bytes_of(self.element(pos)?)
    }

    pub fn bytes_mut(&mut self, pos: Pos) -> Result<&mut [u8], TableError> {
        let e = self.element(pos)?;
        let (id, addr, len) = (e.id, e.addr, e.size);

        self.blocks
            .iter_mut()
            .find_map(|b| b.bytes_mut(addr, len))
            .ok_or(TableError::Unmapped { id, addr, len })
    }

    /// Positions visited by following `next` links from `head`.
    /// Stops early at a dangling link; [`Table::audit`] reports those.
    pub fn chain(&self, head: Pos) -> impl Iterator<Item = Pos> + '_ {
        std::iter::successors(
            self.elements.get(head).map(|_| head),
            move |&pos| self.elements[pos].next.filter(|&n| n < self.elements.len()),
        )
        // A corrupt table may loop.
        .take(self.elements.len())
    }

    /// Earliest free element in *chain* order: the first free element
    /// in table order, rewound through its `prev` links.
    pub(crate) fn free_chain_head(&self) -> Result<Option<Pos>, TableError> {
        let Some(mut at) = self.elements.iter().position(Element::is_free) else {
            return Ok(None);
        };
        let mut steps = 0;
        while let Some(prev) = self.element(at)?.prev {
            steps += 1;
            if steps > self.elements.len() {
                return Err(TableError::CyclicChain(at));
            }
            at = prev;
        }

        Ok(Some(at))
    }

    /// Checks every structural invariant of the table:
    /// - each element lies within one owned block,
    /// - no two elements overlap,
    /// - links are mirrored and never leave their owner's chain,
    /// - the size bookkeeping adds up,
    /// - ids are unique and below the id counter.
    pub fn audit(&self) -> Result<(), TableError> {
        let (mut total, mut free) = (0, 0);
        let mut seen: AHashSet<Uid> = AHashSet::with_capacity(self.elements.len());

        for (pos, e) in self.elements.iter().enumerate() {
            self.bytes_of(e)?;
            if !seen.insert(e.id) {
                return Err(TableError::DuplicateId(e.id));
            }
            if e.id >= self.next_id {
                return Err(TableError::StaleCounter { id: e.id, counter: self.next_id });
            }
            total += e.size;
            if e.is_free() { free += e.size; }

            if let Some(n) = e.next {
                let other = self.element(n)?;
                if other.prev != Some(pos) {
                    return Err(TableError::BrokenLink { from: pos, to: n });
                }
                if other.owner != e.owner {
                    return Err(TableError::CrossOwner { from: pos, to: n, owner: e.owner, other: other.owner });
                }
            }
            if let Some(p) = e.prev {
                let other = self.element(p)?;
                if other.next != Some(pos) {
                    return Err(TableError::BrokenLink { from: pos, to: p });
                }
            }
        }

        if total != self.total_size {
            return Err(TableError::SizeMismatch { what: "element sizes", tracked: self.total_size, counted: total });
        }
        if free != self.free_size {
            return Err(TableError::SizeMismatch { what: "free element sizes", tracked: self.free_size, counted: free });
        }
        let backed: ByteSize = self.blocks.iter().map(Block::len).sum();
        if backed != self.total_size {
            return Err(TableError::SizeMismatch { what: "block lengths", tracked: self.total_size, counted: backed });
        }

        // Sorting by address leaves overlapping elements adjacent,
        // zero-length ones aside.
        if let Some((a, b)) = self.elements
            .iter()
            .filter(|e| e.size != 0)
            .sorted_unstable_by_key(|e| e.addr)
            .tuple_windows()
            .find(|(a, b)| a.overlaps(b)) {
            return Err(TableError::Overlap(a.id, b.id));
        }

        Ok(())
    }

    pub fn stats(&self) -> FragStats {
        let (free_fragments, largest_free) = self.elements
            .iter()
            .filter(|e| e.is_free() && e.size > 0)
            .fold((0, 0), |(n, max), e| (n + 1, max.max(e.size)));
        let ratio = if self.free_size == 0 { 0.0 }
            else { 1.0 - largest_free as f64 / self.free_size as f64 };

        FragStats {
            free_fragments,
            largest_free,
            free_size: self.free_size,
            ratio,
        }
    }
}

/// Drops every free element and rewrites the links of the
/// survivors to their shifted positions.
///
/// Occupied chains never pass through free elements, so every
/// surviving link must have a surviving target.
pub(crate) fn retain_occupied(elements: Vec<Element>) -> Result<Vec<Element>, TableError> {
    let mut old_to_new: Vec<Option<Pos>> = Vec::with_capacity(elements.len());
    let mut survivors = 0;
    for e in &elements {
        if e.is_free() {
            old_to_new.push(None);
        } else {
            old_to_new.push(Some(survivors));
            survivors += 1;
        }
    }

    let remap = |from: Pos, link: Option<Pos>| -> Result<Option<Pos>, TableError> {
        match link {
            None    => Ok(None),
            Some(to) => match old_to_new.get(to) {
                Some(Some(new)) => Ok(Some(*new)),
                Some(None)      => Err(TableError::CrossOwner {
                    from,
                    to,
                    owner: elements[from].owner,
                    other: FREE,
                }),
                None            => Err(TableError::BadPosition(to)),
            },
        }
    };

    let mut res = Vec::with_capacity(survivors);
    for (pos, e) in elements.iter().enumerate() {
        if e.is_free() { continue; }
        res.push(Element {
            next: remap(pos, e.next)?,
            prev: remap(pos, e.prev)?,
            ..e.clone()
        });
    }

    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_threads_chains_in_table_order() {
        let t = Table::from_layout([(1, 4), (FREE, 2), (2, 3), (1, 1), (FREE, 5)]);
        let e = t.elements();
        assert_eq!((e[0].prev, e[0].next), (None, Some(3)));
        assert_eq!((e[3].prev, e[3].next), (Some(0), None));
        assert_eq!((e[1].prev, e[1].next), (None, Some(4)));
        assert!(e[2].is_detached());
        assert_eq!(t.total_size(), 15);
        assert_eq!(t.free_size(), 7);
        assert_eq!(t.next_id(), 6);
        assert_eq!(e[1].addr, e[0].end());
        assert!(t.audit().is_ok());
    }

    #[test]
    fn remapping_skips_free_positions() {
        let t = Table::from_layout([(FREE, 1), (1, 1), (FREE, 1), (2, 1), (1, 1)]);
        let kept = retain_occupied(t.elements.clone()).unwrap();
        assert_eq!(kept.len(), 3);
        assert_eq!(kept.iter().map(|e| e.owner).collect::<Vec<_>>(), vec![1, 2, 1]);
        assert_eq!((kept[0].prev, kept[0].next), (None, Some(2)));
        assert_eq!((kept[2].prev, kept[2].next), (Some(0), None));
        assert!(kept[1].is_detached());
    }

    #[test]
    fn remapping_rejects_links_into_free_space() {
        let t = Table::from_layout([(1, 1), (FREE, 1)]);
        let mut elements = t.elements.clone();
        elements[0].next = Some(1);
        assert!(matches!(
            retain_occupied(elements),
            Err(TableError::CrossOwner { from: 0, to: 1, .. })
        ));
    }

    #[test]
    fn chain_head_is_found_by_rewinding() {
        let mut t = Table::from_layout([(FREE, 1), (1, 1), (FREE, 1), (FREE, 1)]);
        // Make the chain run 2 -> 3 -> 0, so that table order
        // and chain order disagree.
        t.elements[0].prev = Some(3);
        t.elements[0].next = None;
        t.elements[2].prev = None;
        t.elements[3].next = Some(0);
        assert_eq!(t.free_chain_head().unwrap(), Some(2));
        assert_eq!(t.chain(2).collect::<Vec<_>>(), vec![2, 3, 0]);
    }

    #[test]
    fn audit_catches_a_one_sided_link() {
        let mut t = Table::from_layout([(1, 1), (1, 1)]);
        t.elements[1].prev = None;
        assert_eq!(t.audit(), Err(TableError::BrokenLink { from: 0, to: 1 }));
    }

    #[test]
    fn stats_measure_scatter() {
        let t = Table::from_layout([(FREE, 2), (1, 3), (FREE, 6)]);
        let s = t.stats();
        assert_eq!(s.free_fragments, 2);
        assert_eq!(s.largest_free, 6);
        assert!((s.ratio - 0.25).abs() < 1e-9);
    }
}
