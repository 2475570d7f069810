//! `cutechess-cli` based executor.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::TrialExecutor;
use crate::error::{Error, Result};
use crate::outcome::{Outcome, order_by_index};
use crate::point::CanonicalPoint;

const TEST_NAME: &str = "test";
const BASE_NAME: &str = "base";

/// Plays games between a configurable "test" engine and a fixed "base"
/// engine by running `cutechess-cli`.
///
/// Each request is split into `sub_batches` match processes that run in
/// parallel; their results are concatenated. Every process plays complete
/// game pairs (`-games 2 -repeat`), so pairing survives the split.
///
/// # Examples
///
/// ```no_run
/// use pairtune::executor::CutechessExecutor;
///
/// let executor = CutechessExecutor::builder("./stockfish")
///     .reference("./stockfish-master")
///     .book("UHO_XXL_+0.90_+1.19.epd")
///     .time_control("10.0+0.1")
///     .concurrency(8)
///     .sub_batches(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Debug)]
pub struct CutechessExecutor {
    cutechess: PathBuf,
    engine: PathBuf,
    reference: PathBuf,
    book: PathBuf,
    book_format: &'static str,
    tc: String,
    tc_ref: String,
    concurrency: usize,
    sub_batches: usize,
}

impl CutechessExecutor {
    /// Creates a builder for an executor tuning the engine at `engine`.
    #[must_use]
    pub fn builder(engine: impl Into<PathBuf>) -> CutechessExecutorBuilder {
        CutechessExecutorBuilder::new(engine.into())
    }

    /// Game rounds (pairs) each sub-batch plays for a `games` request.
    #[must_use]
    pub fn rounds_per_sub_batch(&self, games: usize) -> usize {
        games.div_ceil(2).div_ceil(self.sub_batches)
    }

    /// Builds the argument list for one match process.
    fn command_args(&self, params: &CanonicalPoint, rounds: usize, seed: u32) -> Vec<String> {
        let mut test = vec![
            format!("name={TEST_NAME}"),
            format!("cmd={}", self.engine.display()),
            format!("tc={}", self.tc),
        ];
        test.extend(params.iter().map(|(name, value)| format!("option.{name}={value}")));

        let mut args: Vec<String> = [
            "-games",
            "2",
            "-repeat",
            "-openings",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        args.push(format!("file={}", self.book.display()));
        args.push(format!("format={}", self.book_format));
        args.push("order=random".to_owned());
        args.extend(
            "-draw movenumber=50 movecount=8 score=5 -resign movecount=3 score=600"
                .split_whitespace()
                .map(ToOwned::to_owned),
        );
        args.push("-engine".to_owned());
        args.extend(test);
        args.push("-engine".to_owned());
        args.push(format!("name={BASE_NAME}"));
        args.push(format!("cmd={}", self.reference.display()));
        args.push(format!("tc={}", self.tc_ref));
        args.extend(
            ["-each", "proto=uci", "option.Hash=16"]
                .iter()
                .map(ToString::to_string),
        );
        args.push("-rounds".to_owned());
        args.push(rounds.to_string());
        args.push("-concurrency".to_owned());
        args.push(self.concurrency.to_string());
        args.push("-srand".to_owned());
        args.push(seed.to_string());
        args
    }

    /// Runs one match process to completion and parses its output.
    fn run_match(&self, params: &CanonicalPoint, rounds: usize) -> Result<Vec<Outcome>> {
        let seed = fastrand::u32(..i32::MAX.unsigned_abs());
        let args = self.command_args(params, rounds, seed);
        trace_debug!(cmd = %self.cutechess.display(), rounds, seed, "starting match");

        let output = Command::new(&self.cutechess)
            .args(&args)
            .output()
            .map_err(|e| {
                Error::ExecutorFailure(format!(
                    "failed to start {}: {e}",
                    self.cutechess.display()
                ))
            })?;

        if !output.status.success() {
            return Err(Error::ExecutorFailure(format!(
                "{} exited with {}",
                self.cutechess.display(),
                output.status
            )));
        }

        parse_match_output(&String::from_utf8_lossy(&output.stdout))
    }
}

impl TrialExecutor for CutechessExecutor {
    fn run(&self, params: &CanonicalPoint, games: usize) -> Result<Vec<Outcome>> {
        let rounds = self.rounds_per_sub_batch(games);
        if self.sub_batches == 1 {
            return self.run_match(params, rounds);
        }

        let results: Vec<Result<Vec<Outcome>>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..self.sub_batches)
                .map(|_| scope.spawn(|| self.run_match(params, rounds)))
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        Err(Error::ExecutorFailure("match thread panicked".to_owned()))
                    })
                })
                .collect()
        });

        let mut outcomes = Vec::new();
        for result in results {
            outcomes.extend(result?);
        }
        Ok(outcomes)
    }
}

/// Builder for [`CutechessExecutor`].
///
/// Defaults follow common fishtest-style settings:
/// - `cutechess`: `cutechess-cli`
/// - `reference`: the tuned engine itself
/// - `book`: `UHO_XXL_+0.90_+1.19.epd`
/// - `time_control` / `reference_time_control`: `10.0+0.1`
/// - `concurrency`: 8 games per process
/// - `sub_batches`: 1
#[derive(Clone, Debug)]
pub struct CutechessExecutorBuilder {
    cutechess: PathBuf,
    engine: PathBuf,
    reference: Option<PathBuf>,
    book: PathBuf,
    tc: String,
    tc_ref: Option<String>,
    concurrency: usize,
    sub_batches: usize,
}

impl CutechessExecutorBuilder {
    fn new(engine: PathBuf) -> Self {
        Self {
            cutechess: PathBuf::from("cutechess-cli"),
            engine,
            reference: None,
            book: PathBuf::from("UHO_XXL_+0.90_+1.19.epd"),
            tc: "10.0+0.1".to_owned(),
            tc_ref: None,
            concurrency: 8,
            sub_batches: 1,
        }
    }

    /// Path to the `cutechess-cli` binary.
    #[must_use]
    pub fn cutechess(mut self, path: impl Into<PathBuf>) -> Self {
        self.cutechess = path.into();
        self
    }

    /// Reference engine binary (defaults to the tuned engine).
    #[must_use]
    pub fn reference(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference = Some(path.into());
        self
    }

    /// Opening book; must end in `epd` or `pgn`.
    #[must_use]
    pub fn book(mut self, path: impl Into<PathBuf>) -> Self {
        self.book = path.into();
        self
    }

    /// Time control of the test engine, e.g. `10.0+0.1`.
    #[must_use]
    pub fn time_control(mut self, tc: impl Into<String>) -> Self {
        self.tc = tc.into();
        self
    }

    /// Time control of the reference engine (defaults to the test one).
    #[must_use]
    pub fn reference_time_control(mut self, tc: impl Into<String>) -> Self {
        self.tc_ref = Some(tc.into());
        self
    }

    /// Concurrent games inside each match process.
    #[must_use]
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    /// Number of match processes a batch is split into.
    #[must_use]
    pub fn sub_batches(mut self, n: usize) -> Self {
        self.sub_batches = n;
        self
    }

    /// Builds the executor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the book does not end in `epd` or
    /// `pgn`, or if `concurrency` or `sub_batches` is zero.
    pub fn build(self) -> Result<CutechessExecutor> {
        let book_format = book_format(&self.book).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "books must have epd or pgn extension: {}",
                self.book.display()
            ))
        })?;
        if self.concurrency == 0 || self.sub_batches == 0 {
            return Err(Error::InvalidConfig(
                "cutechess concurrency and sub-batches must be at least 1".to_owned(),
            ));
        }
        let reference = self.reference.unwrap_or_else(|| self.engine.clone());
        let tc_ref = self.tc_ref.unwrap_or_else(|| self.tc.clone());
        Ok(CutechessExecutor {
            cutechess: self.cutechess,
            engine: self.engine,
            reference,
            book: self.book,
            book_format,
            tc: self.tc,
            tc_ref,
            concurrency: self.concurrency,
            sub_batches: self.sub_batches,
        })
    }
}

fn book_format(book: &Path) -> Option<&'static str> {
    let name = book.to_string_lossy();
    if name.ends_with("epd") {
        Some("epd")
    } else if name.ends_with("pgn") {
        Some("pgn")
    } else {
        None
    }
}

/// Converts `cutechess-cli` output into outcomes for the test engine.
///
/// Only `Finished game <n> (<white> vs <black>): <result>` lines are read.
/// They are put in game-number order before conversion, because games of a
/// pair may finish out of order. Games without a decisive or drawn result
/// (crashes, disconnects) are skipped.
///
/// # Errors
///
/// Returns [`Error::ExecutorFailure`] if a finished-game line has no
/// readable game number.
///
/// # Examples
///
/// ```
/// use pairtune::Outcome;
/// use pairtune::executor::parse_match_output;
///
/// let out = "Finished game 2 (base vs test): 1-0 {White mates}\n\
///            Finished game 1 (test vs base): 1/2-1/2 {Draw by adjudication}\n";
/// assert_eq!(parse_match_output(out).unwrap(), vec![Outcome::Draw, Outcome::Loss]);
/// ```
pub fn parse_match_output(output: &str) -> Result<Vec<Outcome>> {
    let mut indexed = Vec::new();
    for line in output.lines().filter(|l| l.starts_with("Finished game")) {
        let index: u64 = line
            .split_whitespace()
            .nth(2)
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| Error::ExecutorFailure(format!("unparseable result line: {line}")))?;

        let test_is_white = line.contains(&format!("({TEST_NAME} vs {BASE_NAME})"));
        let test_is_black = line.contains(&format!("({BASE_NAME} vs {TEST_NAME})"));
        let white_result = if line.contains(": 1-0") {
            Some(Outcome::Win)
        } else if line.contains(": 0-1") {
            Some(Outcome::Loss)
        } else if line.contains(": 1/2-1/2") {
            Some(Outcome::Draw)
        } else {
            None
        };

        match (white_result, test_is_white, test_is_black) {
            (Some(result), true, _) => indexed.push((index, result)),
            (Some(result), _, true) => indexed.push((index, result.flipped())),
            _ => {
                trace_warn!(game = index, "game did not terminate properly, skipping");
            }
        }
    }
    Ok(order_by_index(indexed))
}
