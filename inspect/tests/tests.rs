use inspect::*;
use memtab::{generate_seeded, GenConfig, Table, FREE};

fn data_rows(out: &str) -> Vec<&str> {
    out.lines()
        .filter(|l| l.starts_with('|'))
        .skip(1)
        .collect()
}

#[test]
fn small_tables_print_whole() {
    let mut t = Table::from_layout([(1, 10), (FREE, 5), (1, 20)]);
    let out = render(&t, DEFAULT_SHOWN);
    let rows = data_rows(&out);
    assert_eq!(rows.len(), 3);
    assert!(rows[0].contains("N/A"));
    assert!(out.ends_with("Total elements: 3"));
    assert!(out.lines().next().unwrap().starts_with("+--------+"));

    t.compact_single_region().unwrap();
    let out = render(&t, DEFAULT_SHOWN);
    let last: Vec<&str> = data_rows(&out)[2].split('|').map(str::trim).collect();
    // Leading and trailing bars leave empty cells at both ends.
    assert_eq!(&last[1..8], &["2", "4", &format!("0x{:012x}", t.elements()[2].addr)[..], "5", "0", "N/A", "N/A"]);
}

#[test]
fn large_tables_are_cut_in_the_middle() {
    let cfg = GenConfig::new(5, 0.5).unwrap();
    let t = generate_seeded(&cfg, 1).unwrap();
    let out = render(&t, 2);
    let rows = data_rows(&out);
    assert_eq!(rows.len(), 5);
    assert!(rows[2].contains("..."));
    assert!(rows[3].trim_start_matches('|').trim_start().starts_with('3'));
    assert!(out.ends_with("Total elements: 5"));

    // Exactly twice the cut: no ellipsis, no duplicates.
    let out = render(&generate_seeded(&GenConfig::new(4, 0.5).unwrap(), 1).unwrap(), 2);
    assert_eq!(data_rows(&out).len(), 4);
    assert!(!out.contains("..."));
}

#[test]
fn snapshots_survive_json() {
    let mut t = Table::from_layout([(1, 3), (FREE, 2), (2, 4)]);
    t.compact_split_region().unwrap();
    let snap = Snapshot::capture("split", &t).unwrap().timed(Duration::from_millis(2));

    assert_eq!(snap.blocks.len(), 2);
    assert_eq!(snap.rows.len(), 3);
    assert_eq!((snap.rows[2].block, snap.rows[2].offset), (1, 0));
    assert_eq!((snap.rows[1].block, snap.rows[1].offset), (0, 3));
    assert!((snap.elapsed_ms.unwrap() - 2.0).abs() < 1e-9);

    let text = serde_json::to_string(&snap).unwrap();
    let back: Snapshot = serde_json::from_str(&text).unwrap();
    assert_eq!(back, snap);
}

#[test]
fn timing_hands_back_the_result() {
    let (v, took) = timed(|| 6 * 7);
    assert_eq!(v, 42);
    assert!(took < Duration::from_secs(1));
}

#[test]
fn stats_read_like_a_report() {
    let t = Table::from_layout([(FREE, 2), (1, 3), (FREE, 6)]);
    let out = describe(&t.stats());
    assert!(out.contains("8 bytes in 2 fragment(s)"));
    assert!(out.contains("25.00%"));
}
