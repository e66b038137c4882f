//! Aggregation tuning knobs and the shared command-line surface.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Maximum number of items in one batch.
pub const DEFAULT_BATCH_SIZE: usize = 6;
/// Best-effort minimum for the first batch of a session.
pub const DEFAULT_MIN_FIRST_BATCH: usize = 5;
/// The author source is only consulted while a batch holds fewer items than this.
pub const DEFAULT_AUTHOR_SOFT_CAP: usize = 4;
/// Upper bound on pull rounds per batch.
pub const DEFAULT_MAX_ROUNDS: usize = 20;

/// Rejected tuning combinations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlsError {
    /// A batch must hold at least one item.
    #[error("batch size must be at least 1")]
    ZeroBatchSize,
    /// The first-batch floor cannot exceed the batch size.
    #[error("first batch floor {floor} exceeds batch size {batch_size}")]
    FloorAboveBatch {
        /// Requested floor.
        floor: usize,
        /// Configured batch size.
        batch_size: usize,
    },
    /// At least one round is needed to pull anything.
    #[error("max rounds must be at least 1")]
    ZeroRounds,
}

/// Tunable knobs that bound related-items aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AggregatorControls {
    batch_size: usize,
    min_first_batch: usize,
    author_soft_cap: usize,
    max_rounds: usize,
}

impl AggregatorControls {
    /// Validates and builds a set of controls.
    pub fn new(
        batch_size: usize,
        min_first_batch: usize,
        author_soft_cap: usize,
        max_rounds: usize,
    ) -> Result<Self, ControlsError> {
        if batch_size == 0 {
            return Err(ControlsError::ZeroBatchSize);
        }
        if min_first_batch > batch_size {
            return Err(ControlsError::FloorAboveBatch {
                floor: min_first_batch,
                batch_size,
            });
        }
        if max_rounds == 0 {
            return Err(ControlsError::ZeroRounds);
        }
        Ok(Self {
            batch_size,
            min_first_batch,
            author_soft_cap,
            max_rounds,
        })
    }

    /// Maximum items per batch; also the page size requested upstream.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Floor applied to the first batch.
    pub fn min_first_batch(&self) -> usize {
        self.min_first_batch
    }

    /// Collected-count threshold below which the author source is consulted.
    pub fn author_soft_cap(&self) -> usize {
        self.author_soft_cap
    }

    /// Safety bound on rounds per batch.
    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Floor for the batch at `batch_index`.
    pub fn floor_for(&self, batch_index: u32) -> usize {
        if batch_index == 0 {
            self.min_first_batch
        } else {
            0
        }
    }
}

impl Default for AggregatorControls {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            min_first_batch: DEFAULT_MIN_FIRST_BATCH,
            author_soft_cap: DEFAULT_AUTHOR_SOFT_CAP,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

/// Command-line interface for binaries that drive related-items sessions.
#[derive(Parser, Debug, Clone)]
#[command(name = "bookshelf-related", about = "Print related-book batches for catalog items")]
pub struct Cli {
    /// Book identifiers to compute related shelves for (repeatable)
    #[arg(long = "book", required = true)]
    pub books: Vec<u64>,

    /// Number of batches to load per book
    #[arg(long, env = "BOOKSHELF_BATCHES", default_value_t = 2)]
    pub batches: usize,

    /// Base URL of the catalog backend
    #[arg(long, env = "BOOKSHELF_API_BASE", default_value = "http://localhost:3000")]
    pub api_base: String,

    /// Bearer token forwarded to the backend
    #[arg(long, env = "BOOKSHELF_TOKEN")]
    pub token: Option<String>,

    /// Seconds before a backend request times out
    #[arg(long, env = "BOOKSHELF_TIMEOUT_SECS", default_value_t = 15)]
    pub timeout_secs: u64,

    /// Read the catalog from a JSON fixture instead of the backend
    #[arg(long, env = "BOOKSHELF_FIXTURE")]
    pub fixture: Option<PathBuf>,

    /// Emit one JSON object per book instead of text
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Maximum items per batch
    #[arg(long, env = "BOOKSHELF_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Best-effort minimum for the first batch
    #[arg(long, env = "BOOKSHELF_MIN_FIRST_BATCH", default_value_t = DEFAULT_MIN_FIRST_BATCH)]
    pub min_first_batch: usize,

    /// Consult the author source only below this many collected items
    #[arg(long, env = "BOOKSHELF_AUTHOR_SOFT_CAP", default_value_t = DEFAULT_AUTHOR_SOFT_CAP)]
    pub author_soft_cap: usize,

    /// Safety bound on pull rounds per batch
    #[arg(long, env = "BOOKSHELF_MAX_ROUNDS", default_value_t = DEFAULT_MAX_ROUNDS)]
    pub max_rounds: usize,
}

impl Cli {
    /// Converts the parsed CLI into `AggregatorControls`.
    pub fn build_controls(&self) -> Result<AggregatorControls, ControlsError> {
        AggregatorControls::new(
            self.batch_size,
            self.min_first_batch,
            self.author_soft_cap,
            self.max_rounds,
        )
    }

    /// Per-request timeout for the HTTP catalog.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
