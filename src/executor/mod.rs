//! Trial executors: the component that actually plays the games.
//!
//! The [`TrialExecutor`] trait is the only thing the scheduler needs from a
//! game runner. Given a canonical parameter point and a target number of
//! games it returns the outcomes, in pairing order, from the test engine's
//! point of view.
//!
//! # Available executors
//!
//! | Executor | Description |
//! |----------|-------------|
//! | [`CutechessExecutor`] | Spawns `cutechess-cli` match processes and parses their output |
//!
//! Implement the trait to plug in any other runner (a remote worker pool,
//! a simulator in tests, ...).

mod cutechess;

pub use cutechess::{CutechessExecutor, CutechessExecutorBuilder, parse_match_output};

use crate::error::Result;
use crate::outcome::Outcome;
use crate::point::CanonicalPoint;

/// Plays batches of paired games for a parameter assignment.
///
/// `run` is blocking; the [`BatchDispatcher`](crate::BatchDispatcher) calls
/// it on a blocking worker thread, so implementations may spawn processes
/// and wait on them directly.
///
/// Implementations must be `Send + Sync` because one executor instance
/// serves every in-flight batch.
pub trait TrialExecutor: Send + Sync + 'static {
    /// Play about `games` games with the test engine configured by `params`.
    ///
    /// The result holds at most `2 * ceil(games / 2)` outcomes; games that
    /// did not finish cleanly are left out, so fewer is normal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExecutorFailure`](crate::Error::ExecutorFailure) when
    /// the batch as a whole failed. A failed batch must never be reported as
    /// an empty successful one.
    fn run(&self, params: &CanonicalPoint, games: usize) -> Result<Vec<Outcome>>;
}

impl<F> TrialExecutor for F
where
    F: Fn(&CanonicalPoint, usize) -> Result<Vec<Outcome>> + Send + Sync + 'static,
{
    fn run(&self, params: &CanonicalPoint, games: usize) -> Result<Vec<Outcome>> {
        self(params, games)
    }
}
