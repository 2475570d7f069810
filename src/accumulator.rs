use std::collections::HashMap;

use parking_lot::RwLock;

use crate::outcome::Outcome;
use crate::point::CanonicalPoint;

/// Per-point game history, keyed by canonical parameter point.
///
/// Every batch played at a point is appended to that point's history, so
/// repeated evaluation of the same (rounded) parameters sharpens the
/// statistics instead of replacing them. Histories only grow.
///
/// The store is a thin wrapper around `RwLock<HashMap<..>>`; the iteration
/// controller is its only writer.
///
/// # Examples
///
/// ```
/// use pairtune::{Outcome, ParameterPoint, ResultAccumulator};
///
/// let acc = ResultAccumulator::new();
/// let key = ParameterPoint::new().with("x", 3.2).canonical();
/// acc.merge(&key, &[Outcome::Win, Outcome::Draw]);
/// let merged = acc.merge(&key, &[Outcome::Loss, Outcome::Loss]);
/// assert_eq!(merged.len(), 4);
/// ```
#[derive(Debug, Default)]
pub struct ResultAccumulator {
    histories: RwLock<HashMap<CanonicalPoint, Vec<Outcome>>>,
}

impl ResultAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an accumulator pre-populated with saved histories.
    #[must_use]
    pub fn with_histories(histories: HashMap<CanonicalPoint, Vec<Outcome>>) -> Self {
        Self {
            histories: RwLock::new(histories),
        }
    }

    /// Appends `outcomes` to the history of `key` and returns the full
    /// merged history (older games first).
    pub fn merge(&self, key: &CanonicalPoint, outcomes: &[Outcome]) -> Vec<Outcome> {
        let mut guard = self.histories.write();
        let history = guard.entry(key.clone()).or_default();
        history.extend_from_slice(outcomes);
        history.clone()
    }

    /// Returns the history of `key`, empty if the point was never played.
    #[must_use]
    pub fn get(&self, key: &CanonicalPoint) -> Vec<Outcome> {
        self.histories.read().get(key).cloned().unwrap_or_default()
    }

    /// Number of distinct points with a history.
    #[must_use]
    pub fn len(&self) -> usize {
        self.histories.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.histories.read().is_empty()
    }

    /// Copies every history, for persistence.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<CanonicalPoint, Vec<Outcome>> {
        self.histories.read().clone()
    }
}
