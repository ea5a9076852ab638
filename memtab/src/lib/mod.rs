//! Welcome to `memtab`!
//!
//! A memory region shared by several processes is modelled as a
//! [`Table`]: an ordered list of [`Element`]s, each one a range of
//! bytes inside some [`Block`] owned by the table, tagged with the
//! process that holds it. Free space is just another owner, [`FREE`].
//!
//! Tables start out fragmented, courtesy of [`generate::generate`],
//! and are then compacted with one of two [`compact::Strategy`]s.
//! [`Table::deep_copy`] makes it possible to try both on the same input.

mod storage;
mod element;
mod table;
mod copy;
pub mod compact;
pub mod generate;
/// Type aliases, error types and the imports needed
/// all over the crate.
pub mod utils;

pub use crate::{
    compact::Strategy,
    element::Element,
    generate::{generate, generate_entropy, generate_seeded, GenConfig},
    storage::Block,
    table::{FragStats, Table},
    utils::{Addr, ByteSize, ConfigError, Pid, Pos, TableError, Uid, FREE},
};
