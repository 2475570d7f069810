//! Pentanomial generalized SPRT, following the construction used by
//! fishtest.
//!
//! The pentanomial histogram is read as a distribution over normalized pair
//! scores `{0, 1/4, 1/2, 3/4, 1}`. Both hypotheses are turned into expected
//! per-game scores `s0`, `s1`, and the log-likelihood ratio is the Gaussian
//! approximation `N * (mu - (s0 + s1)/2) * (s1 - s0) / var`.

use serde::{Deserialize, Serialize};

use super::Pentanomial;
use super::brownian::Brownian;
use crate::error::{Error, Result};

/// `nElo / normalized t-value`: `800 / ln(10)`.
const NELO_DIVIDED_BY_NT: f64 = 800.0 / core::f64::consts::LN_10;

/// Pseudo-count given to empty histogram buckets.
const REGULARIZATION: f64 = 1e-3;

/// Elo scale in which `elo0` / `elo1` are expressed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EloModel {
    /// Classic logistic Elo: `s = 1 / (1 + 10^(-elo/400))`.
    Logistic,
    /// Normalized Elo: Elo per unit of the per-game standard deviation,
    /// independent of the draw ratio.
    #[default]
    Normalized,
}

/// SPRT configuration: error rates and the two hypotheses.
///
/// # Examples
///
/// ```
/// use pairtune::stats::{EloModel, Sprt};
///
/// let sprt = Sprt::new(0.05, 0.05, 0.0, 2.0, EloModel::Normalized).unwrap();
/// let analytics = sprt.analytics(&[10, 40, 100, 45, 12]);
/// assert!(analytics.llr > sprt.lower_bound() && analytics.llr < sprt.upper_bound());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sprt {
    /// Type I error rate.
    pub alpha: f64,
    /// Type II error rate.
    pub beta: f64,
    /// Elo under the null hypothesis.
    pub elo0: f64,
    /// Elo under the alternative hypothesis.
    pub elo1: f64,
    /// Scale in which `elo0` / `elo1` are expressed.
    #[serde(default)]
    pub model: EloModel,
}

impl Default for Sprt {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            beta: 0.05,
            elo0: 0.0,
            elo1: 2.0,
            model: EloModel::Normalized,
        }
    }
}

/// The SPRT state derived from a pentanomial histogram.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SprtAnalytics {
    /// Log-likelihood ratio, clamped to `[lower_bound, upper_bound]`.
    #[serde(rename = "LLR")]
    pub llr: f64,
    /// Probability that a test at true Elo 0 ends with a worse outcome.
    #[serde(rename = "LOS")]
    pub los: f64,
    /// `ln(beta / (1 - alpha))`: accept H0 at or below.
    #[serde(rename = "a")]
    pub lower_bound: f64,
    /// `ln((1 - beta) / alpha)`: accept H1 at or above.
    #[serde(rename = "b")]
    pub upper_bound: f64,
    /// The raw LLR overshot a bound by more than 3%.
    pub clamped: bool,
}

impl Sprt {
    /// Creates a validated SPRT configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSprt`] unless `0 < alpha < 1`, `0 < beta < 1`,
    /// `alpha + beta < 1`, and `elo0 < elo1`.
    pub fn new(alpha: f64, beta: f64, elo0: f64, elo1: f64, model: EloModel) -> Result<Self> {
        let sprt = Self {
            alpha,
            beta,
            elo0,
            elo1,
            model,
        };
        sprt.validate()?;
        Ok(sprt)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let rate_ok = |p: f64| p > 0.0 && p < 1.0;
        if !rate_ok(self.alpha) || !rate_ok(self.beta) || self.alpha + self.beta >= 1.0 {
            return Err(Error::InvalidSprt(format!(
                "error rates must lie in (0, 1) with alpha + beta < 1 (alpha={}, beta={})",
                self.alpha, self.beta
            )));
        }
        if !self.elo0.is_finite() || !self.elo1.is_finite() || self.elo0 >= self.elo1 {
            return Err(Error::InvalidSprt(format!(
                "elo0 ({}) must be below elo1 ({})",
                self.elo0, self.elo1
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn lower_bound(&self) -> f64 {
        (self.beta / (1.0 - self.alpha)).ln()
    }

    #[must_use]
    pub fn upper_bound(&self) -> f64 {
        ((1.0 - self.beta) / self.alpha).ln()
    }

    /// Computes LLR and LOS for a pentanomial histogram.
    ///
    /// Empty buckets are regularized, so any histogram (including an empty
    /// one) yields finite numbers; callers that need real evidence should
    /// check the pair count first.
    #[must_use]
    pub fn analytics(&self, pentanomial: &Pentanomial) -> SprtAnalytics {
        let pdf = PairPdf::from_histogram(pentanomial);
        let (mean, var) = pdf.moments();

        let sigma_pg = (2.0 * var).sqrt();
        let s0 = self.elo_to_score(self.elo0, sigma_pg);
        let s1 = self.elo_to_score(self.elo1, sigma_pg);

        let (drift, _) = drift_variance(mean, var, s0, s1, None);
        let a = self.lower_bound();
        let b = self.upper_bound();

        let mut llr = pdf.count * drift;
        let mut duration = pdf.count;
        let clamped = llr > 1.03 * b || llr < 1.03 * a;
        if llr < a {
            duration = a / drift;
            llr = a;
        } else if llr > b {
            duration = b / drift;
            llr = b;
        }

        let (mu, sigma2) = drift_variance(mean, var, s0, s1, Some(logistic_score(0.0)));
        let los = Brownian { a, b, mu, sigma2 }.outcome_cdf(duration, llr);

        SprtAnalytics {
            llr,
            los,
            lower_bound: a,
            upper_bound: b,
            clamped,
        }
    }

    fn elo_to_score(&self, elo: f64, sigma_pg: f64) -> f64 {
        match self.model {
            EloModel::Logistic => logistic_score(elo),
            EloModel::Normalized => elo / NELO_DIVIDED_BY_NT * sigma_pg + 0.5,
        }
    }
}

/// Expected score for a logistic Elo difference.
fn logistic_score(elo: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf(-elo / 400.0))
}

/// Per-pair drift and variance of the LLR.
///
/// With `true_score == None` the empirical distribution is used as is;
/// otherwise its mean is shifted to `true_score`, which widens the variance
/// by the squared shift.
fn drift_variance(mean: f64, var: f64, s0: f64, s1: f64, true_score: Option<f64>) -> (f64, f64) {
    let (s, v) = match true_score {
        None => (mean, var),
        Some(s) => (s, var + (s - mean).powi(2)),
    };
    let drift = (s - (s0 + s1) / 2.0) * (s1 - s0) / v;
    let variance = (s1 - s0).powi(2) / v;
    (drift, variance)
}

/// Regularized probability distribution over normalized pair scores.
struct PairPdf {
    count: f64,
    probs: [f64; 5],
}

impl PairPdf {
    #[allow(clippy::cast_precision_loss)]
    fn from_histogram(pentanomial: &Pentanomial) -> Self {
        let counts = pentanomial.map(|n| {
            if n == 0 {
                REGULARIZATION
            } else {
                n as f64
            }
        });
        let count: f64 = counts.iter().sum();
        Self {
            count,
            probs: counts.map(|n| n / count),
        }
    }

    fn moments(&self) -> (f64, f64) {
        let value = |i: usize| [0.0, 0.25, 0.5, 0.75, 1.0][i];
        let mean: f64 = self.probs.iter().enumerate().map(|(i, p)| p * value(i)).sum();
        let var: f64 = self
            .probs
            .iter()
            .enumerate()
            .map(|(i, p)| p * (value(i) - mean).powi(2))
            .sum();
        (mean, var)
    }
}
