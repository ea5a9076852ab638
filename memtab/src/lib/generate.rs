use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::utils::*;

pub const DEFAULT_MEAN_SIZE: f64 = 40.0;
pub const DEFAULT_SIZE_STD_DEV: f64 = 2.0;
/// Every this many elements, one more process shows up...
pub const ELEMENTS_PER_PROCESS: usize = 100;
/// ...but there are never fewer than this many.
pub const MIN_PROCESSES: usize = 3;
/// Largest total a generated table may have: a block is one
/// allocation, and no allocation can exceed `isize::MAX` bytes.
pub const MAX_TABLE_SIZE: ByteSize = isize::MAX as ByteSize;

/// What the generator is asked to produce.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenConfig {
    pub count:          usize,
    /// Probability that an element is free rather than owned.
    pub free_fraction:  f64,
    pub mean_size:      f64,
    pub size_std_dev:   f64,
}

impl GenConfig {
    pub fn new(count: usize, free_fraction: f64) -> Result<Self, ConfigError> {
        let res = Self {
            count,
            free_fraction,
            mean_size:      DEFAULT_MEAN_SIZE,
            size_std_dev:   DEFAULT_SIZE_STD_DEV,
        };
        res.validate()?;

        Ok(res)
    }

    /// Same as [`GenConfig::new`], with the free share
    /// given as a whole percentage.
    pub fn from_percent(count: usize, percent: u64) -> Result<Self, ConfigError> {
        if percent > 100 {
            return Err(ConfigError::FreePercent(percent));
        }

        Self::new(count, percent as f64 / 100.0)
    }

    pub fn with_sizes(mut self, mean: f64, std_dev: f64) -> Result<Self, ConfigError> {
        self.mean_size = mean;
        self.size_std_dev = std_dev;
        self.validate()?;

        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Written so that NaN fails too.
        if !(0.0..=1.0).contains(&self.free_fraction) {
            return Err(ConfigError::FreeFraction(self.free_fraction));
        }
        self.size_distribution()?;

        Ok(())
    }

    /// Owners are drawn from `1..=processes()`.
    pub fn processes(&self) -> usize {
        (self.count / ELEMENTS_PER_PROCESS).max(MIN_PROCESSES)
    }

    fn size_distribution(&self) -> Result<Normal<f64>, ConfigError> {
        let bad = ConfigError::SizeDistribution {
            mean:       self.mean_size,
            std_dev:    self.size_std_dev,
        };
        if !self.mean_size.is_finite() { return Err(bad); }

        Normal::new(self.mean_size, self.size_std_dev).map_err(|_| bad)
    }
}

/// Builds a fragmented table of `cfg.count` elements, drawing
/// every random decision from `rng`.
///
/// Each element is free with probability `cfg.free_fraction`, and
/// owned by a uniformly chosen process otherwise. Sizes follow
/// the configured normal distribution, floored, and are at least 1.
pub fn generate<R>(cfg: &GenConfig, rng: &mut R) -> Result<Table, ConfigError>
where R: Rng + ?Sized {
    cfg.validate()?;
    let sizes = cfg.size_distribution()?;
    let processes = cfg.processes() as Pid;
    debug!(count = cfg.count, free_fraction = cfg.free_fraction, processes, "generating table");

    let too_large = ConfigError::TooLarge { count: cfg.count, mean: cfg.mean_size };
    let mut layout: Vec<(Pid, ByteSize)> = Vec::with_capacity(cfg.count);
    let mut total: ByteSize = 0;
    for _ in 0..cfg.count {
        // Negative draws floor below zero and are clamped too.
        // Huge ones saturate, and are caught by the running total.
        let size = sizes.sample(rng).floor().max(1.0) as ByteSize;
        total = total
            .checked_add(size)
            .filter(|t| *t <= MAX_TABLE_SIZE)
            .ok_or_else(|| too_large.clone())?;
        let owner = if rng.gen_bool(cfg.free_fraction) { FREE }
            else { rng.gen_range(1..=processes) };
        layout.push((owner, size));
    }
    let res = Table::from_layout(layout);
    debug!(
        elements = res.len(),
        total_size = res.total_size(),
        free_size = res.free_size(),
        "table generated"
    );

    Ok(res)
}

/// [`generate`] with a reproducible source of randomness.
pub fn generate_seeded(cfg: &GenConfig, seed: u64) -> Result<Table, ConfigError> {
    generate(cfg, &mut StdRng::seed_from_u64(seed))
}

/// [`generate`], seeded by the operating system.
pub fn generate_entropy(cfg: &GenConfig) -> Result<Table, ConfigError> {
    generate(cfg, &mut StdRng::from_entropy())
}
