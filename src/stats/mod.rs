//! Outcome statistics: score, Elo, LOS, pentanomial histograms, and SPRT.
//!
//! Everything here is a pure function of its inputs. Functions that divide
//! by the number of games return [`Error::DegenerateHistory`] on empty input
//! instead of a default value.
//!
//! # Examples
//!
//! ```
//! use pairtune::Outcome::{Draw as D, Loss as L, Win as W};
//! use pairtune::stats::{self, Sprt};
//!
//! let games = [W, L, W, W, D, D];
//! assert_eq!(stats::pentanomial(&games), [0, 0, 2, 0, 1]);
//!
//! let summary = stats::Summary::from_outcomes(&games, &Sprt::default()).unwrap();
//! assert!((summary.score - 4.0 / 6.0).abs() < 1e-12);
//! assert!(summary.elo > 0.0);
//! ```

mod brownian;
mod normal;
mod sprt;

use serde::{Deserialize, Serialize};

pub use sprt::{EloModel, Sprt, SprtAnalytics};

use crate::error::{Error, Result};
use crate::outcome::Outcome;

/// Counts of game pairs by pair score:
/// `[LL, LD+DL, DD+WL+LW, WD+DW, WW]`.
pub type Pentanomial = [u64; 5];

/// Two-sided z-value used for the reported error bars (~95% confidence).
pub const CONFIDENCE_Z: f64 = 1.95716;

/// Scores are clamped to `[EPSILON, 1 - EPSILON]` before conversion to Elo.
const SCORE_EPSILON: f64 = 1e-6;

/// Loss / draw / win counts, in that order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u64; 3]", into = "[u64; 3]")]
pub struct Ldw {
    pub losses: u64,
    pub draws: u64,
    pub wins: u64,
}

impl Ldw {
    #[must_use]
    pub fn count(outcomes: &[Outcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut acc, o| {
            match o {
                Outcome::Win => acc.wins += 1,
                Outcome::Loss => acc.losses += 1,
                Outcome::Draw => acc.draws += 1,
            }
            acc
        })
    }

    #[must_use]
    pub fn games(&self) -> u64 {
        self.losses + self.draws + self.wins
    }
}

impl From<[u64; 3]> for Ldw {
    fn from([losses, draws, wins]: [u64; 3]) -> Self {
        Self {
            losses,
            draws,
            wins,
        }
    }
}

impl From<Ldw> for [u64; 3] {
    fn from(ldw: Ldw) -> Self {
        [ldw.losses, ldw.draws, ldw.wins]
    }
}

/// Average score per game: wins plus half the draws, over games played.
///
/// # Errors
///
/// Returns [`Error::DegenerateHistory`] if `outcomes` is empty.
pub fn score(outcomes: &[Outcome]) -> Result<f64> {
    if outcomes.is_empty() {
        return Err(Error::DegenerateHistory("score of zero games"));
    }
    #[allow(clippy::cast_precision_loss)]
    let n = outcomes.len() as f64;
    Ok(outcomes.iter().map(|o| o.score()).sum::<f64>() / n)
}

/// Half-width of the confidence interval on [`score`].
///
/// # Errors
///
/// Returns [`Error::DegenerateHistory`] if `outcomes` is empty.
pub fn score_error(outcomes: &[Outcome]) -> Result<f64> {
    let mean = score(outcomes)?;
    #[allow(clippy::cast_precision_loss)]
    let n = outcomes.len() as f64;
    let variance = outcomes
        .iter()
        .map(|o| (o.score() - mean).powi(2))
        .sum::<f64>()
        / n;
    Ok(CONFIDENCE_Z * variance.sqrt() / n.sqrt())
}

/// Logistic Elo difference corresponding to an expected score.
#[must_use]
pub fn elo(score: f64) -> f64 {
    let s = score.clamp(SCORE_EPSILON, 1.0 - SCORE_EPSILON);
    -400.0 * (1.0 / s - 1.0).log10()
}

/// Half the Elo span of `score ± margin`.
#[must_use]
pub fn elo_error(score: f64, margin: f64) -> f64 {
    (elo(score + margin) - elo(score - margin)) / 2.0
}

/// Likelihood of superiority from win/loss counts alone (draws ignored).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ldw_los(ldw: Ldw) -> f64 {
    if ldw.wins == ldw.losses {
        return 0.5;
    }
    let diff = ldw.wins as f64 - ldw.losses as f64;
    normal::cdf(diff / ((ldw.wins + ldw.losses) as f64).sqrt())
}

/// Histogram of consecutive, non-overlapping game pairs by pair score.
///
/// A trailing unpaired game is ignored, so the buckets always sum to
/// `outcomes.len() / 2`.
#[must_use]
pub fn pentanomial(outcomes: &[Outcome]) -> Pentanomial {
    let mut hist = [0; 5];
    for pair in outcomes.chunks_exact(2) {
        hist[pair[0].half_points() + pair[1].half_points()] += 1;
    }
    hist
}

/// Likelihood of superiority from a pentanomial histogram.
///
/// # Errors
///
/// Returns [`Error::DegenerateHistory`] if the histogram holds no pairs.
#[allow(clippy::cast_precision_loss)]
pub fn pentanomial_los(hist: &Pentanomial) -> Result<f64> {
    let pairs: u64 = hist.iter().sum();
    if pairs == 0 {
        return Err(Error::DegenerateHistory("pentanomial LOS of zero game pairs"));
    }
    let n = pairs as f64;
    let (sum, sum_sq) = hist
        .iter()
        .zip([0.0, 0.5, 1.0, 1.5, 2.0])
        .fold((0.0, 0.0), |(s, s2), (&count, pair_score)| {
            let p = count as f64 / n;
            (s + p * pair_score, s2 + p * pair_score * pair_score)
        });
    let sigma = (sum_sq - sum * sum).max(0.0).sqrt();
    let t = if sigma == 0.0 {
        sum - 1.0
    } else {
        (sum - 1.0) / sigma
    };
    Ok(normal::cdf(t))
}

/// Full statistical summary of a game history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Games in the history.
    pub games: usize,
    pub score: f64,
    pub score_error: f64,
    /// `[losses, draws, wins]`.
    pub ldw: Ldw,
    pub ldw_los: f64,
    pub pentanomial: Pentanomial,
    pub pentanomial_los: f64,
    #[serde(rename = "Elo")]
    pub elo: f64,
    #[serde(rename = "Elo_error")]
    pub elo_error: f64,
    pub sprt: SprtAnalytics,
}

impl Summary {
    /// Computes every statistic for `outcomes`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DegenerateHistory`] unless the history holds at
    /// least one complete game pair.
    pub fn from_outcomes(outcomes: &[Outcome], sprt: &Sprt) -> Result<Self> {
        let pentanomial = pentanomial(outcomes);
        let pentanomial_los = pentanomial_los(&pentanomial)?;
        let score = score(outcomes)?;
        let score_error = score_error(outcomes)?;
        let ldw = Ldw::count(outcomes);

        Ok(Self {
            games: outcomes.len(),
            score,
            score_error,
            ldw,
            ldw_los: ldw_los(ldw),
            pentanomial,
            pentanomial_los,
            elo: elo(score),
            elo_error: elo_error(score, score_error),
            sprt: sprt.analytics(&pentanomial),
        })
    }

    /// The optimizer loss: the negated SPRT log-likelihood ratio.
    #[must_use]
    pub fn loss(&self) -> f64 {
        -self.sprt.llr
    }
}
