#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Statistical evaluation and adaptive batch scheduling for tuning engine
//! parameters with paired games. Each candidate parameter point proposed by
//! an optimizer is played in large batches of game pairs against a reference
//! configuration; the results are folded into a pentanomial SPRT whose
//! log-likelihood ratio becomes the optimizer's loss.
//!
//! # Getting Started
//!
//! ```no_run
//! use pairtune::prelude::*;
//!
//! # async fn run() -> pairtune::Result<()> {
//! let listing = "Stockfish dev\nFutMargin,170,100,240\nHashSize,16,16,16\n";
//! let space = tunable(&parse_parameter_listing(listing)?);
//!
//! let config = TuneConfig::builder()
//!     .concurrency(3)
//!     .initial_batch_size(256)
//!     .batch_growth_per_iteration(64)
//!     .total_evaluation_budget(1000)
//!     .output_dir("tuning-run")
//!     .build()?;
//!
//! let optimizer = SelfAdaptiveEs::builder().seed(7).build(&space);
//! let executor = CutechessExecutor::builder("./stockfish").sub_batches(4).build()?;
//!
//! let report = IterationController::new(config, optimizer, executor)?
//!     .run()
//!     .await?;
//! println!("{:?}", report.recommendation);
//! # Ok(())
//! # }
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`Outcome`] | A single game result from the test engine's point of view. |
//! | [`stats::Summary`] | Score, Elo, LOS, pentanomial, and SPRT analytics for a history. |
//! | [`ResultAccumulator`] | Per-point history of every outcome ever observed. |
//! | [`BatchDispatcher`] | Fixed pool of in-flight batch jobs. |
//! | [`IterationController`] | The optimization loop with checkpointing. |
//! | [`Optimizer`] | Pluggable ask/tell search algorithm. |
//! | [`TrialExecutor`] | Pluggable game runner. |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at key scheduling points | on |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::warn!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn {
    ($($arg:tt)*) => {};
}

mod accumulator;
mod config;
mod controller;
mod dispatcher;
mod error;
pub mod executor;
pub mod optimizer;
mod outcome;
pub mod persistence;
mod point;
pub mod space;
pub mod stats;

pub use accumulator::ResultAccumulator;
pub use config::{TuneConfig, TuneConfigBuilder};
pub use controller::{IterationController, IterationState, Phase, TuneReport};
pub use dispatcher::{BatchDispatcher, CompletedJob};
pub use error::{Error, Result};
pub use executor::TrialExecutor;
pub use optimizer::{Candidate, Optimizer};
pub use outcome::{Outcome, order_by_index};
pub use point::{CanonicalPoint, ParameterPoint};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use pairtune::prelude::*;
/// ```
pub mod prelude {
    pub use crate::accumulator::ResultAccumulator;
    pub use crate::config::{TuneConfig, TuneConfigBuilder};
    pub use crate::controller::{IterationController, IterationState, Phase, TuneReport};
    pub use crate::dispatcher::{BatchDispatcher, CompletedJob};
    pub use crate::error::{Error, Result};
    pub use crate::executor::{CutechessExecutor, TrialExecutor};
    pub use crate::optimizer::{Candidate, Optimizer, SelfAdaptiveEs};
    pub use crate::outcome::Outcome;
    pub use crate::point::{CanonicalPoint, ParameterPoint};
    pub use crate::space::{ParameterSpec, parse_parameter_listing, tunable};
    pub use crate::stats::{EloModel, Sprt, SprtAnalytics, Summary};
}
