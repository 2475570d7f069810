#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a [`TuneConfig`](crate::TuneConfig) value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Returned when the SPRT bounds or error rates are unusable.
    #[error("invalid SPRT configuration: {0}")]
    InvalidSprt(String),

    /// Returned when statistics are requested on a history without games
    /// (or without a single complete game pair for pentanomial statistics).
    #[error("degenerate history: {0}")]
    DegenerateHistory(&'static str),

    /// Returned when a batch is submitted while every dispatcher slot is busy.
    #[error("no free dispatcher slot ({concurrency} jobs in flight)")]
    NoFreeSlot {
        /// The number of slots in the pool.
        concurrency: usize,
    },

    /// Returned when the trial executor fails for a whole batch
    /// (process failure, unparseable output, or a panicking worker).
    #[error("trial executor failed: {0}")]
    ExecutorFailure(String),

    /// Returned when a checkpoint or output file cannot be written or rotated.
    #[error("checkpoint I/O failed for {path}: {reason}")]
    Checkpoint {
        /// The file being written.
        path: String,
        /// The underlying failure.
        reason: String,
    },

    /// Returned when a restart is requested but no saved state exists.
    #[error("missing restart state: {0}")]
    MissingRestartState(String),

    /// Returned when saved state cannot be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Returned when a tunable-parameter listing line cannot be parsed.
    #[error("invalid parameter listing line {line}: {reason}")]
    InvalidParameterListing {
        /// The offending line.
        line: String,
        /// The reason the line was rejected.
        reason: String,
    },

    /// Returned when a batch task is cancelled before it reports a result.
    #[error("async task error: {0}")]
    TaskError(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    pub(crate) fn checkpoint(path: &std::path::Path, err: impl core::fmt::Display) -> Self {
        Error::Checkpoint {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
