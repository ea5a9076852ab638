pub use std::time::{Duration, Instant};
use std::fmt::Write;

use itertools::Itertools;
use memtab::{Addr, ByteSize, FragStats, Pid, Pos, Table, TableError, Uid};
pub use serde::{Deserialize, Serialize};

/// How many rows get printed at each end of a table, by default.
pub const DEFAULT_SHOWN: usize = 100;

const HEADERS: [&str; 7] = ["Row No.", "UID", "Address", "Size", "Process", "Next", "Previous"];
const WIDTHS: [usize; 7] = [8, 18, 18, 18, 18, 18, 18];
const MISSING: &str = "N/A";

//---START RENDERING
fn border() -> String {
    format!("+{}+", WIDTHS.iter().map(|w| "-".repeat(*w)).join("+"))
}

fn line<S: AsRef<str>>(cells: &[S], centered: bool) -> String {
    let inner = cells.iter()
        .zip(WIDTHS)
        .map(|(c, w)| {
            if centered { format!(" {:^width$} ", c.as_ref(), width = w - 2) }
            else { format!(" {:>width$} ", c.as_ref(), width = w - 2) }
        })
        .join("|");

    format!("|{}|", inner)
}

fn link(l: Option<Pos>) -> String {
    l.map_or_else(|| MISSING.to_string(), |p| p.to_string())
}

fn row(t: &Table, pos: Pos) -> String {
    let e = &t.elements()[pos];
    line(&[
        pos.to_string(),
        e.id.to_string(),
        format!("0x{:012x}", e.addr),
        e.size.to_string(),
        e.owner.to_string(),
        link(e.next),
        link(e.prev),
    ], false)
}

/// Draws `t` as a bordered table. Large tables are cut short:
/// only the first and last `shown` rows make it, with an
/// ellipsis row in between.
pub fn render(t: &Table, shown: usize) -> String {
    let n = t.len();
    let mut res = String::new();
    let rule = border();

    // Writing to a `String` cannot fail.
    let _ = writeln!(res, "{rule}");
    let _ = writeln!(res, "{}", line(&HEADERS, true));
    let _ = writeln!(res, "{rule}");

    let head = shown.min(n);
    for pos in 0..head {
        let _ = writeln!(res, "{}", row(t, pos));
    }
    if n > 2 * shown {
        let _ = writeln!(res, "{}", line(&["..."; 7], true));
    }
    if n > shown {
        for pos in head.max(n - shown)..n {
            let _ = writeln!(res, "{}", row(t, pos));
        }
    }

    let _ = writeln!(res, "{rule}");
    let _ = write!(res, "Total elements: {n}");

    res
}

/// One-line summary of how fragmented a table is.
pub fn describe(s: &FragStats) -> String {
    format!(
        "Free:\t\t{} bytes in {} fragment(s)\nLargest free:\t{} bytes\nFragmentation:\t{:.2}%",
        s.free_size,
        s.free_fragments,
        s.largest_free,
        s.ratio * 100.0,
    )
}
//---END RENDERING

//---START SNAPSHOTS
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub pos:    Pos,
    pub id:     Uid,
    pub addr:   Addr,
    /// Index of the block the element lives in...
    pub block:  usize,
    /// ...and where inside it.
    pub offset: ByteSize,
    pub size:   ByteSize,
    pub owner:  Pid,
    pub next:   Option<Pos>,
    pub prev:   Option<Pos>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockRow {
    pub base:   Addr,
    pub len:    ByteSize,
}

/// Everything a reader of the table might want, in a
/// form fit for serialization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub label:          String,
    pub total_size:     ByteSize,
    pub free_size:      ByteSize,
    pub free_fragments: usize,
    pub fragmentation:  f64,
    /// Wall-clock time of the step that produced the table, if timed.
    pub elapsed_ms:     Option<f64>,
    pub blocks:         Vec<BlockRow>,
    pub rows:           Vec<Row>,
}

impl Snapshot {
    pub fn capture(label: &str, t: &Table) -> Result<Self, TableError> {
        let mut rows = Vec::with_capacity(t.len());
        for (pos, e) in t.elements().iter().enumerate() {
            let (block, offset) = t.locate(pos)?;
            rows.push(Row {
                pos,
                id:     e.id,
                addr:   e.addr,
                block,
                offset,
                size:   e.size,
                owner:  e.owner,
                next:   e.next,
                prev:   e.prev,
            });
        }
        let stats = t.stats();

        Ok(Self {
            label:          label.to_string(),
            total_size:     t.total_size(),
            free_size:      t.free_size(),
            free_fragments: stats.free_fragments,
            fragmentation:  stats.ratio,
            elapsed_ms:     None,
            blocks:         t.blocks()
                .iter()
                .map(|b| BlockRow { base: b.base(), len: b.len() })
                .collect(),
            rows,
        })
    }

    pub fn timed(mut self, took: Duration) -> Self {
        self.elapsed_ms = Some(as_ms(took));
        self
    }
}
//---END SNAPSHOTS

/// Runs `f` once and measures how long it took.
pub fn timed<T, F>(f: F) -> (T, Duration)
where F: FnOnce() -> T {
    let start = Instant::now();
    let res = f();

    (res, start.elapsed())
}

pub fn as_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1e3
}
