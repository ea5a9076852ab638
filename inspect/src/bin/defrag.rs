use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use inspect::*;
use memtab::{generate::{DEFAULT_MEAN_SIZE, DEFAULT_SIZE_STD_DEV}, generate_seeded, GenConfig, Strategy, Table};

/// Generates a fragmented memory table, then compacts
/// two copies of it, one per strategy.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of elements in the table
    #[arg(default_value_t = 100)]
    rows:           usize,

    /// Chance, in percent, that an element is free
    #[arg(default_value_t = 50)]
    free_percent:   u64,

    /// Seed for the generator (random if omitted)
    #[arg(short, long)]
    seed:           Option<u64>,

    /// Rows printed at each end of a table
    #[arg(long, default_value_t = DEFAULT_SHOWN)]
    shown:          usize,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    format:         Format,

    /// Check the table's invariants after every step
    #[arg(long)]
    audit:          bool,

    /// Mean element size, in bytes
    #[arg(long, default_value_t = DEFAULT_MEAN_SIZE)]
    mean_size:      f64,

    /// Standard deviation of element sizes
    #[arg(long, default_value_t = DEFAULT_SIZE_STD_DEV)]
    size_dev:       f64,

    /// Verbose logging
    #[arg(short, long)]
    verbose:        bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Format {
    /// Bordered tables and timings, for humans
    Table,
    /// One JSON document holding every stage
    Json,
}

fn main() -> Result<()> {
    let cli = Args::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    let cfg = GenConfig::from_percent(cli.rows, cli.free_percent)
        .and_then(|c| c.with_sizes(cli.mean_size, cli.size_dev))
        .context("Invalid table configuration")?;
    let seed = cli.seed.unwrap_or_else(rand::random);
    info!(seed, rows = cfg.count, free_fraction = cfg.free_fraction, "generating table");

    let mut single = generate_seeded(&cfg, seed)?;
    let mut split = single.deep_copy().context("Copying the generated table")?;
    check(&cli, &single, "generation")?;
    check(&cli, &split, "copy")?;

    let mut stages = vec![Snapshot::capture("generated", &single)?];
    show(&cli, &single, &stages[0]);

    for (table, strategy, label) in [
        (&mut single, Strategy::SingleRegion, "single-region"),
        (&mut split, Strategy::SplitRegion, "split-region"),
    ] {
        let (res, took) = timed(|| table.compact(strategy));
        res.with_context(|| format!("{label} compaction"))?;
        info!(strategy = label, elapsed_ms = as_ms(took), "compaction done");
        check(&cli, table, label)?;
        let snap = Snapshot::capture(label, table)?.timed(took);
        show(&cli, table, &snap);
        stages.push(snap);
    }

    if cli.format == Format::Json {
        println!("{}", serde_json::to_string_pretty(&stages)?);
    }

    Ok(())
}

fn check(cli: &Args, t: &Table, step: &str) -> Result<()> {
    if cli.audit {
        t.audit().with_context(|| format!("Audit failed after {step}"))?;
        info!(step, "audit passed");
    }

    Ok(())
}

fn show(cli: &Args, t: &Table, snap: &Snapshot) {
    if cli.format != Format::Table { return; }
    if let Some(ms) = snap.elapsed_ms {
        println!("{} compaction took {:.3} ms", snap.label, ms);
    }
    println!("{}", render(t, cli.shown));
    println!("{}\n", describe(&t.stats()));
}
