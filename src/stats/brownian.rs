//! Brownian motion with drift between two absorbing barriers.
//!
//! Used to turn an observed SPRT state `(T, LLR)` into a probability: the
//! LLR of a sequential test behaves like a drifted Brownian motion started
//! at zero and stopped at `a < 0 < b`.
//!
//! The transition density of the killed process is built with the method of
//! images; the exponential drift tilt folds into every image as a shifted
//! Gaussian, so all integrals below are differences of normal CDFs.

use super::normal;

/// Drifted Brownian motion `dX = mu dt + sigma dW`, absorbed at `a` and `b`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Brownian {
    pub(crate) a: f64,
    pub(crate) b: f64,
    pub(crate) mu: f64,
    pub(crate) sigma2: f64,
}

/// Upper limit on the number of images on each side.
const MAX_IMAGES: i32 = 200;

impl Brownian {
    /// Probability that the process ends with an outcome worse than the one
    /// observed at `(t, y)`.
    ///
    /// "Worse" means: absorbed at `a` before `t`, or still running at `t`
    /// below `y`. For `y == b` this is the probability of not having passed
    /// by `t`; for `y == a` the probability of failing before `t`.
    pub(crate) fn outcome_cdf(&self, t: f64, y: f64) -> f64 {
        debug_assert!(t > 0.0, "outcome_cdf needs a positive duration");
        let s = (self.sigma2 * t).sqrt();
        let m = self.mu * t;
        let gamma = self.mu / self.sigma2;

        let images = self.image_count(s, m);
        let y = y.clamp(self.a, self.b);

        let fail_before_t = self.exit_at_a(0.0, gamma) - self.late_failures(s, m, gamma, images);
        let running_below = self.survival_mass(y, s, m, gamma, images);
        let p = fail_before_t + running_below;

        if p.is_finite() {
            p.clamp(0.0, 1.0)
        } else {
            // Image series overflowed; fall back to the unbounded Gaussian.
            normal::cdf((y - m) / s)
        }
    }

    fn image_count(&self, s: f64, m: f64) -> i32 {
        let width = self.b - self.a;
        #[allow(clippy::cast_possible_truncation)]
        let k = ((m.abs() + 10.0 * s) / (2.0 * width)).ceil() as i32 + 2;
        k.clamp(2, MAX_IMAGES)
    }

    /// Image centers of the driftless killed density: `(center, sign)`.
    fn images(&self, count: i32) -> impl Iterator<Item = (f64, f64)> + '_ {
        let width = self.b - self.a;
        (-count..=count).flat_map(move |k| {
            let shift = 2.0 * f64::from(k) * width;
            [(shift, 1.0), (2.0 * self.a - shift, -1.0)]
        })
    }

    /// `P(no absorption by t, X_t in [a, upper])`.
    fn survival_mass(&self, upper: f64, s: f64, m: f64, gamma: f64, images: i32) -> f64 {
        self.images(images)
            .map(|(c, sign)| {
                let diff = normal::cdf((upper - c - m) / s) - normal::cdf((self.a - c - m) / s);
                if diff == 0.0 {
                    0.0
                } else {
                    sign * (gamma * c).exp() * diff
                }
            })
            .sum()
    }

    /// `P(exit at a | X = x)` for the unkilled process.
    fn exit_at_a(&self, x: f64, gamma: f64) -> f64 {
        if gamma.abs() < 1e-12 {
            return (self.b - x) / (self.b - self.a);
        }
        let width = self.b - self.a;
        if gamma > 0.0 {
            let num = (-2.0 * gamma * (x - self.a)).exp() - (-2.0 * gamma * width).exp();
            num / (1.0 - (-2.0 * gamma * width).exp())
        } else {
            let num = 1.0 - (2.0 * gamma * (self.b - x)).exp();
            num / (1.0 - (2.0 * gamma * width).exp())
        }
    }

    /// `P(still running at t, eventually absorbed at a)`, i.e. the integral
    /// of the killed density against [`exit_at_a`](Self::exit_at_a).
    fn late_failures(&self, s: f64, m: f64, gamma: f64, images: i32) -> f64 {
        let survival = self.survival_mass(self.b, s, m, gamma, images);

        if gamma.abs() < 1e-12 {
            // Linear exit probability: integrate (b - x) against each image.
            let linear: f64 = self
                .images(images)
                .map(|(c, sign)| {
                    let d = c + m;
                    let lo = (self.a - d) / s;
                    let hi = (self.b - d) / s;
                    let mass = normal::cdf(hi) - normal::cdf(lo);
                    sign * ((self.b - d) * mass + s * (normal::pdf(hi) - normal::pdf(lo)))
                })
                .sum();
            return linear / (self.b - self.a);
        }

        // Each tilted image times e^{-2 gamma x} is again a Gaussian,
        // centered at c - m with weight e^{-gamma c}.
        let tilted: f64 = self
            .images(images)
            .map(|(c, sign)| {
                let diff = normal::cdf((self.b - c + m) / s) - normal::cdf((self.a - c + m) / s);
                if diff == 0.0 {
                    0.0
                } else {
                    sign * (-gamma * c).exp() * diff
                }
            })
            .sum();

        let ea = (-2.0 * gamma * self.a).exp();
        let eb = (-2.0 * gamma * self.b).exp();
        (tilted - eb * survival) / (ea - eb)
    }
}
