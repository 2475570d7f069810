//! Game outcomes from the test engine's point of view.

use serde::{Deserialize, Serialize};

/// The result of a single game, seen from the test configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// The test configuration won.
    #[serde(rename = "w")]
    Win,
    /// The test configuration lost.
    #[serde(rename = "l")]
    Loss,
    /// The game was drawn.
    #[serde(rename = "d")]
    Draw,
}

impl Outcome {
    /// The game score: 1 for a win, 0 for a loss, 0.5 for a draw.
    #[must_use]
    pub fn score(self) -> f64 {
        match self {
            Outcome::Win => 1.0,
            Outcome::Loss => 0.0,
            Outcome::Draw => 0.5,
        }
    }

    /// Half-points scored: 2, 0, or 1.
    pub(crate) fn half_points(self) -> usize {
        match self {
            Outcome::Win => 2,
            Outcome::Loss => 0,
            Outcome::Draw => 1,
        }
    }

    /// The same game seen from the other side.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Outcome::Win => Outcome::Loss,
            Outcome::Loss => Outcome::Win,
            Outcome::Draw => Outcome::Draw,
        }
    }
}

impl core::fmt::Display for Outcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let c = match self {
            Outcome::Win => "w",
            Outcome::Loss => "l",
            Outcome::Draw => "d",
        };
        f.write_str(c)
    }
}

/// Order outcomes reported with a completion index.
///
/// Game pairs are formed from consecutive entries, so results that arrive out
/// of order must be put back in index order first. The sort is stable: equal
/// indices keep their reported order.
///
/// # Examples
///
/// ```
/// use pairtune::{Outcome, order_by_index};
///
/// let seq = order_by_index(vec![(2, Outcome::Loss), (1, Outcome::Win)]);
/// assert_eq!(seq, vec![Outcome::Win, Outcome::Loss]);
/// ```
#[must_use]
pub fn order_by_index(mut indexed: Vec<(u64, Outcome)>) -> Vec<Outcome> {
    indexed.sort_by_key(|&(index, _)| index);
    indexed.into_iter().map(|(_, outcome)| outcome).collect()
}
