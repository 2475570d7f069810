//! Ask/tell optimizers driving the search.
//!
//! The scheduler treats the optimizer as a black box with five
//! capabilities: propose a [`Candidate`], receive the loss of an evaluated
//! candidate, recommend its current best point, and serialize its full
//! state so a crashed run can be resumed.
//!
//! Candidates are told back in completion order, not ask order, and several
//! may be outstanding at once. Implementations must accept that.
//!
//! # Available optimizers
//!
//! | Optimizer | Description |
//! |-----------|-------------|
//! | [`SelfAdaptiveEs`] | Population-based evolution strategy with a self-adapted step size |

mod es;

pub use es::{SelfAdaptiveEs, SelfAdaptiveEsBuilder};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::point::ParameterPoint;

/// A point proposed by an optimizer, awaiting evaluation.
///
/// `step` is optimizer-private bookkeeping carried alongside the point so
/// that `tell` needs no lookup table of outstanding candidates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: u64,
    pub point: ParameterPoint,
    #[serde(default)]
    pub step: f64,
}

impl Candidate {
    /// Creates a candidate with a neutral step.
    #[must_use]
    pub fn new(id: u64, point: ParameterPoint) -> Self {
        Self {
            id,
            point,
            step: 1.0,
        }
    }
}

/// A sequential black-box minimizer.
pub trait Optimizer: Send + 'static {
    /// Proposes the next point to evaluate.
    fn ask(&mut self) -> Candidate;

    /// Reports the loss of a previously asked candidate. Lower is better.
    fn tell(&mut self, candidate: &Candidate, loss: f64);

    /// The point the optimizer currently believes is best.
    fn provide_recommendation(&self) -> ParameterPoint;

    /// Serializes the complete optimizer state, RNG included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`](crate::Error::Serialization) if the
    /// state cannot be encoded.
    fn dump(&self) -> Result<Vec<u8>>;

    /// Restores an optimizer from [`dump`](Optimizer::dump) output. The
    /// restored optimizer continues exactly where the dumped one stopped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`](crate::Error::Serialization) if the
    /// bytes are not a valid state.
    fn load(bytes: &[u8]) -> Result<Self>
    where
        Self: Sized;
}
