pub use std::{
    hash::BuildHasherDefault,
    sync::atomic::{AtomicUsize, Ordering},
};
pub use ahash::{AHasher, AHashSet};
pub use indexmap::IndexMap;
pub use itertools::Itertools;
pub use thiserror::Error;
pub use tracing::{debug, trace};

pub use crate::{
    element::Element,
    storage::Block,
    table::Table,
};

/// Sizes and offsets, in bytes.
pub type ByteSize = usize;

/// A location in the virtual address space that all
/// [`Block`]s of the process share.
pub type Addr = usize;

/// An element's place in its table, i.e. its index into
/// [`Table::elements`]. Chain links are positions, never addresses.
pub type Pos = usize;

/// Element identifiers. Assigned once, never reused by a table.
pub type Uid = u64;

/// Owning process tag.
pub type Pid = u64;

/// The owner tag reserved for free space.
pub const FREE: Pid = 0;

/// Last seen element of every owner, used while chains
/// are being threaded in table order.
pub type ChainTails = IndexMap<Pid, Pos, BuildHasherDefault<AHasher>>;

#[derive(Error, Debug, Clone, PartialEq)]
/// Rejected generator settings. These are the caller's fault
/// and can always be recovered from.
pub enum ConfigError {
    #[error("free fraction must lie in [0, 1], got {0}")]
    FreeFraction(f64),
    #[error("free percentage must lie in 0..=100, got {0}")]
    FreePercent(u64),
    #[error("element sizes need a finite mean and a non-negative, finite deviation (got mean {mean}, deviation {std_dev})")]
    SizeDistribution {
        mean:       f64,
        std_dev:    f64,
    },
    #[error("{count} elements of mean size {mean} do not fit in one block")]
    TooLarge {
        count:      usize,
        mean:       f64,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// The table broke one of its own invariants. Seeing one of these
/// means a bug, not bad input: the operation that found it bails
/// out and leaves the table as it was.
pub enum TableError {
    #[error("element {id} spans {len} bytes at {addr:#x}, which lie in no owned block")]
    Unmapped {
        id:     Uid,
        addr:   Addr,
        len:    ByteSize,
    },
    #[error("position {0} is out of bounds")]
    BadPosition(Pos),
    #[error("link from position {from} to {to} is not mirrored")]
    BrokenLink {
        from:   Pos,
        to:     Pos,
    },
    #[error("position {from} (owner {owner}) links to position {to} (owner {other})")]
    CrossOwner {
        from:   Pos,
        to:     Pos,
        owner:  Pid,
        other:  Pid,
    },
    #[error("chain through position {0} never terminates")]
    CyclicChain(Pos),
    #[error("{what}: tracked {tracked} bytes, counted {counted}")]
    SizeMismatch {
        what:       &'static str,
        tracked:    ByteSize,
        counted:    ByteSize,
    },
    #[error("elements {0} and {1} overlap")]
    Overlap(Uid, Uid),
    #[error("id {0} appears more than once")]
    DuplicateId(Uid),
    #[error("id {id} is not below the id counter {counter}")]
    StaleCounter {
        id:         Uid,
        counter:    Uid,
    },
}
