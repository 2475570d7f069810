//! On-disk layout of a tuning run.
//!
//! Everything a run writes lives in one output directory:
//!
//! | File | Content | Write mode |
//! |------|---------|------------|
//! | `optimizer_checkpoint.json` | optimizer state | rotate to `.bak`, then atomic replace |
//! | `iteration_state.json` | controller counters and game histories | rotate to `.bak`, then atomic replace |
//! | `all_evalpoints.json` | every evaluation so far | atomic full rewrite |
//! | `all_optimals.jsonl` | one line per recommendation change | locked append |
//! | `optimal.json` | latest recommendation | atomic replace |
//!
//! "Atomic" means the bytes go to a hidden temp file in the same directory
//! which is then renamed over the target, so a crash never leaves a
//! half-written file behind.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::point::{CanonicalPoint, ParameterPoint};
use crate::stats::Summary;

const CHECKPOINT: &str = "optimizer_checkpoint.json";
const ITERATION_STATE: &str = "iteration_state.json";
const EVAL_LOG: &str = "all_evalpoints.json";
const OPTIMALS: &str = "all_optimals.jsonl";
const LATEST: &str = "optimal.json";

/// One evaluated batch as recorded in `all_evalpoints.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
    /// The point the optimizer asked for, before rounding.
    pub params: ParameterPoint,
    /// Games played by this batch.
    pub num_games: usize,
    /// Statistics of the merged history of the canonical point.
    pub stats: Summary,
}

/// One recommendation change as recorded in `all_optimals.jsonl` and
/// `optimal.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimalRecord {
    /// Evaluations completed when the recommendation changed.
    pub evals_done: usize,
    pub recommendation: CanonicalPoint,
}

/// Paths of the files of one run.
///
/// # Examples
///
/// ```
/// use pairtune::persistence::OutputLayout;
///
/// let layout = OutputLayout::new("run");
/// assert!(layout.checkpoint().ends_with("optimizer_checkpoint.json"));
/// assert!(layout.checkpoint_backup().ends_with("optimizer_checkpoint.json.bak"));
/// ```
#[derive(Clone, Debug)]
pub struct OutputLayout {
    dir: PathBuf,
}

impl OutputLayout {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the output directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Checkpoint`] if the directory cannot be created.
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| Error::checkpoint(&self.dir, e))
    }

    #[must_use]
    pub fn checkpoint(&self) -> PathBuf {
        self.dir.join(CHECKPOINT)
    }

    #[must_use]
    pub fn checkpoint_backup(&self) -> PathBuf {
        backup_path(&self.checkpoint())
    }

    #[must_use]
    pub fn iteration_state(&self) -> PathBuf {
        self.dir.join(ITERATION_STATE)
    }

    #[must_use]
    pub fn eval_log(&self) -> PathBuf {
        self.dir.join(EVAL_LOG)
    }

    #[must_use]
    pub fn optimals(&self) -> PathBuf {
        self.dir.join(OPTIMALS)
    }

    #[must_use]
    pub fn latest(&self) -> PathBuf {
        self.dir.join(LATEST)
    }

    /// Stores a new optimizer checkpoint, keeping the previous one as
    /// `optimizer_checkpoint.json.bak`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Checkpoint`] on any I/O failure.
    pub fn save_checkpoint(&self, bytes: &[u8]) -> Result<()> {
        rotate_and_write(&self.checkpoint(), bytes)
    }

    /// Reads the optimizer checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRestartState`] if there is no checkpoint and
    /// [`Error::Checkpoint`] if it cannot be read.
    pub fn load_checkpoint(&self) -> Result<Vec<u8>> {
        read_required(&self.checkpoint())
    }

    /// Stores the controller state, keeping the previous one as `.bak`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] or [`Error::Checkpoint`].
    pub fn save_state<T: Serialize>(&self, state: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        rotate_and_write(&self.iteration_state(), &bytes)
    }

    /// Persists one evaluation: the controller state first, then the
    /// optimizer checkpoint.
    ///
    /// A crash between the two writes leaves a state that already counts
    /// the evaluation next to a checkpoint that has not seen it. On restart
    /// the optimizer then misses one tell, but no game is counted twice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] or [`Error::Checkpoint`].
    pub fn commit<T: Serialize>(&self, state: &T, checkpoint: &[u8]) -> Result<()> {
        self.save_state(state)?;
        self.save_checkpoint(checkpoint)
    }

    /// Reads the controller state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRestartState`] if there is no state file,
    /// [`Error::Checkpoint`] if it cannot be read, and
    /// [`Error::Serialization`] if it cannot be decoded.
    pub fn load_state<T: DeserializeOwned>(&self) -> Result<T> {
        let bytes = read_required(&self.iteration_state())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Replaces the evaluation log with `records`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] or [`Error::Checkpoint`].
    pub fn write_eval_log(&self, records: &[EvalRecord]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(records)?;
        write_atomic(&self.eval_log(), &bytes)
    }

    /// Reads the evaluation log; empty if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Checkpoint`] or [`Error::Serialization`].
    pub fn read_eval_log(&self) -> Result<Vec<EvalRecord>> {
        let path = self.eval_log();
        match std::fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Error::checkpoint(&path, e)),
        }
    }

    /// Records a recommendation change: appends it to the journal and
    /// replaces the latest snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] or [`Error::Checkpoint`].
    pub fn record_optimal(&self, record: &OptimalRecord) -> Result<()> {
        append_line(&self.optimals(), record)?;
        let bytes = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.latest(), &bytes)
    }

    /// Reads every journaled recommendation, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Checkpoint`] or [`Error::Serialization`].
    pub fn read_optimals(&self) -> Result<Vec<OptimalRecord>> {
        read_lines(&self.optimals())
    }

    /// Reads the latest recommendation snapshot, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Checkpoint`] or [`Error::Serialization`].
    pub fn read_latest(&self) -> Result<Option<OptimalRecord>> {
        let path = self.latest();
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::checkpoint(&path, e)),
        }
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

fn read_required(path: &Path) -> Result<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::MissingRestartState(path.display().to_string()))
        }
        Err(e) => Err(Error::checkpoint(path, e)),
    }
}

/// Moves the current file (if any) to `<path>.bak`, then writes `bytes`.
fn rotate_and_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if path.exists() {
        let backup = backup_path(path);
        std::fs::rename(path, &backup).map_err(|e| Error::checkpoint(path, e))?;
        trace_debug!(path = %backup.display(), "rotated checkpoint");
    }
    write_atomic(path, bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    let mut file = File::create(&tmp_path).map_err(|e| Error::checkpoint(&tmp_path, e))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| Error::checkpoint(&tmp_path, e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| Error::checkpoint(path, e))
}

fn append_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let line = serde_json::to_string(value)?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::checkpoint(path, e))?;
    file.lock_exclusive().map_err(|e| Error::checkpoint(path, e))?;

    writeln!(file, "{line}").map_err(|e| Error::checkpoint(path, e))?;
    file.flush().map_err(|e| Error::checkpoint(path, e))?;

    file.unlock().map_err(|e| Error::checkpoint(path, e))
}

fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::checkpoint(path, e)),
    };
    file.lock_shared().map_err(|e| Error::checkpoint(path, e))?;

    let mut values = Vec::new();
    for line in BufReader::new(&file).lines() {
        let line = line.map_err(|e| Error::checkpoint(path, e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        values.push(serde_json::from_str(line)?);
    }

    file.unlock().map_err(|e| Error::checkpoint(path, e))?;
    Ok(values)
}
