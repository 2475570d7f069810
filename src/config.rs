use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::stats::Sprt;

/// Settings for one tuning run.
///
/// Deserializable from JSON, so a run can be described in a file; every
/// field missing from the file takes its default. Values built through
/// [`TuneConfig::builder`] are validated; values loaded with serde are
/// validated when the [`IterationController`](crate::IterationController)
/// is created.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `concurrency` | 3 |
/// | `initial_batch_size` | 256 games |
/// | `batch_growth_per_iteration` | 64 games |
/// | `total_evaluation_budget` | 10000 evaluations |
/// | `restart_from_checkpoint` | `false` |
/// | `max_retries` | 0 |
/// | `sprt` | [`Sprt::default`] |
/// | `output_dir` | `.` |
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuneConfig {
    /// Batches evaluated at the same time.
    pub concurrency: usize,
    /// Games per batch before any growth.
    pub initial_batch_size: usize,
    /// Games added to the batch size on every recommendation change after
    /// the first.
    pub batch_growth_per_iteration: usize,
    /// Evaluations (submitted batches) before the run drains.
    pub total_evaluation_budget: usize,
    /// Resume from the files in `output_dir` instead of starting fresh.
    pub restart_from_checkpoint: bool,
    /// Times a failed batch is resubmitted before the run aborts.
    pub max_retries: usize,
    pub sprt: Sprt,
    pub output_dir: PathBuf,
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            initial_batch_size: 256,
            batch_growth_per_iteration: 64,
            total_evaluation_budget: 10_000,
            restart_from_checkpoint: false,
            max_retries: 0,
            sprt: Sprt::default(),
            output_dir: PathBuf::from("."),
        }
    }
}

impl TuneConfig {
    /// Returns a builder starting from the defaults.
    #[must_use]
    pub fn builder() -> TuneConfigBuilder {
        TuneConfigBuilder::default()
    }

    /// Reads a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the file cannot be read or holds
    /// out-of-range values, and [`Error::Serialization`] if it is not valid
    /// JSON.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] or [`Error::InvalidSprt`].
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::InvalidConfig("concurrency must be at least 1".into()));
        }
        if self.initial_batch_size < 2 {
            return Err(Error::InvalidConfig(
                "initial_batch_size must be at least one game pair".into(),
            ));
        }
        if self.total_evaluation_budget == 0 {
            return Err(Error::InvalidConfig(
                "total_evaluation_budget must be at least 1".into(),
            ));
        }
        self.sprt.validate()
    }
}

/// Fluent builder for [`TuneConfig`].
///
/// # Examples
///
/// ```
/// use pairtune::TuneConfig;
///
/// let config = TuneConfig::builder()
///     .concurrency(8)
///     .initial_batch_size(512)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 8);
/// assert_eq!(config.batch_growth_per_iteration, 64);
///
/// assert!(TuneConfig::builder().concurrency(0).build().is_err());
/// ```
#[derive(Clone, Debug, Default)]
pub struct TuneConfigBuilder {
    config: TuneConfig,
}

impl TuneConfigBuilder {
    #[must_use]
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    #[must_use]
    pub fn initial_batch_size(mut self, games: usize) -> Self {
        self.config.initial_batch_size = games;
        self
    }

    #[must_use]
    pub fn batch_growth_per_iteration(mut self, games: usize) -> Self {
        self.config.batch_growth_per_iteration = games;
        self
    }

    #[must_use]
    pub fn total_evaluation_budget(mut self, evaluations: usize) -> Self {
        self.config.total_evaluation_budget = evaluations;
        self
    }

    /// Resume from a previous run's checkpoint in the output directory.
    #[must_use]
    pub fn restart_from_checkpoint(mut self, restart: bool) -> Self {
        self.config.restart_from_checkpoint = restart;
        self
    }

    /// Resubmissions allowed for a failed batch before the run aborts.
    #[must_use]
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.config.max_retries = retries;
        self
    }

    #[must_use]
    pub fn sprt(mut self, sprt: Sprt) -> Self {
        self.config.sprt = sprt;
        self
    }

    /// Directory receiving checkpoints and logs. Created if missing.
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    /// Validates and returns the config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] or [`Error::InvalidSprt`] for
    /// out-of-range values.
    pub fn build(self) -> Result<TuneConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
