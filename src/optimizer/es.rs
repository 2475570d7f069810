//! Self-adaptive evolution strategy.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::optimizer::{Candidate, Optimizer};
use crate::point::ParameterPoint;
use crate::space::ParameterSpec;

/// Draws beyond which an out-of-bounds sample is clamped instead.
const MAX_RESAMPLES: usize = 10;

/// A population-based evolution strategy with a log-normally self-adapted
/// step size, built for noisy objectives.
///
/// Every asked individual perturbs the current mean by
/// `step_i * sigma_j * N(0, 1)` in each dimension `j`, where `sigma_j` is a
/// quarter of that parameter's range and `step_i` is the generation step
/// mutated by a log-normal factor. Once `population_size` individuals have
/// been told, the best quarter is recombined: the new mean is their average
/// point and the new step their geometric-mean step.
///
/// Individuals may be told in any order and while others are still in
/// flight. The recommendation is the current mean, which averages out the
/// evaluation noise better than any single best-seen point.
///
/// # Examples
///
/// ```
/// use pairtune::optimizer::SelfAdaptiveEs;
/// use pairtune::space::ParameterSpec;
/// use pairtune::Optimizer;
///
/// let space = vec![ParameterSpec::new("x", 50.0, 0.0, 100.0).unwrap()];
/// let mut es = SelfAdaptiveEs::builder().population_size(4).seed(1).build(&space);
/// let candidate = es.ask();
/// let x = candidate.point.get("x").unwrap();
/// assert!((0.0..=100.0).contains(&x));
/// es.tell(&candidate, 0.0);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelfAdaptiveEs {
    variables: Vec<Variable>,
    mean: Vec<f64>,
    step: f64,
    population_size: usize,
    generation: Vec<Evaluated>,
    generations: u64,
    next_id: u64,
    #[serde(rename = "rng_seed", with = "rng_state")]
    rng: fastrand::Rng,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Variable {
    name: String,
    low: f64,
    high: f64,
    sigma: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Evaluated {
    values: Vec<f64>,
    step: f64,
    loss: f64,
}

mod rng_state {
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        rng: &fastrand::Rng,
        serializer: S,
    ) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_u64(rng.get_seed())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> core::result::Result<fastrand::Rng, D::Error> {
        u64::deserialize(deserializer).map(fastrand::Rng::with_seed)
    }
}

impl SelfAdaptiveEs {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> SelfAdaptiveEsBuilder {
        SelfAdaptiveEsBuilder::new()
    }

    /// Number of completed generations.
    #[must_use]
    pub fn generations(&self) -> u64 {
        self.generations
    }

    #[must_use]
    pub fn population_size(&self) -> usize {
        self.population_size
    }

    /// The generation step multiplier.
    #[must_use]
    pub fn step(&self) -> f64 {
        self.step
    }

    fn point_of(&self, values: &[f64]) -> ParameterPoint {
        self.variables
            .iter()
            .zip(values)
            .map(|(v, &x)| (v.name.clone(), x))
            .collect()
    }

    fn sample(&mut self, step: f64) -> Vec<f64> {
        let mut values = Vec::with_capacity(self.variables.len());
        for _ in 0..MAX_RESAMPLES {
            values.clear();
            for (v, &m) in self.variables.iter().zip(&self.mean) {
                values.push(m + step * v.sigma * sample_standard_normal(&mut self.rng));
            }
            if self.variables.iter().zip(&values).all(|(v, &x)| (v.low..=v.high).contains(&x)) {
                return values;
            }
        }
        for (v, x) in self.variables.iter().zip(values.iter_mut()) {
            *x = x.clamp(v.low, v.high);
        }
        values
    }

    #[allow(clippy::cast_precision_loss)]
    fn recombine(&mut self) {
        self.generation.sort_by(|a, b| a.loss.total_cmp(&b.loss));
        let mu = (self.generation.len() / 4).max(1);
        let parents = &self.generation[..mu];

        let n = mu as f64;
        for (j, m) in self.mean.iter_mut().enumerate() {
            *m = parents.iter().map(|p| p.values[j]).sum::<f64>() / n;
        }
        self.step = (parents.iter().map(|p| p.step.ln()).sum::<f64>() / n).exp();

        self.generation.clear();
        self.generations += 1;
        trace_debug!(
            generation = self.generations,
            step = self.step,
            "evolution strategy recombined"
        );
    }
}

impl Optimizer for SelfAdaptiveEs {
    #[allow(clippy::cast_precision_loss)]
    fn ask(&mut self) -> Candidate {
        let tau = 1.0 / (2.0 * self.variables.len().max(1) as f64).sqrt();
        let step = self.step * (tau * sample_standard_normal(&mut self.rng)).exp();
        let values = self.sample(step);

        let id = self.next_id;
        self.next_id += 1;
        Candidate {
            id,
            point: self.point_of(&values),
            step,
        }
    }

    fn tell(&mut self, candidate: &Candidate, loss: f64) {
        let values = self
            .variables
            .iter()
            .zip(&self.mean)
            .map(|(v, &m)| candidate.point.get(&v.name).unwrap_or(m))
            .collect();
        let step = if candidate.step > 0.0 { candidate.step } else { self.step };
        self.generation.push(Evaluated { values, step, loss });

        if self.generation.len() >= self.population_size {
            self.recombine();
        }
    }

    fn provide_recommendation(&self) -> ParameterPoint {
        self.point_of(&self.mean)
    }

    fn dump(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn load(bytes: &[u8]) -> Result<Self> {
        let es: Self = serde_json::from_slice(bytes)?;
        if es.mean.len() != es.variables.len() {
            return Err(Error::Serialization(
                "optimizer state has mismatched mean and variables".to_owned(),
            ));
        }
        Ok(es)
    }
}

/// Builder for configuring a [`SelfAdaptiveEs`].
#[derive(Clone, Debug, Default)]
pub struct SelfAdaptiveEsBuilder {
    population_size: Option<usize>,
    seed: Option<u64>,
}

impl SelfAdaptiveEsBuilder {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of individuals per generation.
    ///
    /// Default: `4 + floor(3 * ln(n_dims))`. Values below 2 are raised to 2.
    #[must_use]
    pub fn population_size(mut self, size: usize) -> Self {
        self.population_size = Some(size);
        self
    }

    /// Sets a random seed for reproducibility.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builds the optimizer over the tunable entries of `space`, starting
    /// from their initial values.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn build(self, space: &[ParameterSpec]) -> SelfAdaptiveEs {
        let variables: Vec<Variable> = space
            .iter()
            .filter(|s| s.is_tunable())
            .map(|s| Variable {
                name: s.name.clone(),
                low: s.low,
                high: s.high,
                sigma: s.sigma(),
            })
            .collect();
        let mean = space.iter().filter(|s| s.is_tunable()).map(|s| s.init).collect();

        let n = variables.len().max(1) as f64;
        let population_size = self
            .population_size
            .unwrap_or_else(|| 4 + (3.0 * n.ln()).floor() as usize)
            .max(2);

        SelfAdaptiveEs {
            variables,
            mean,
            step: 1.0,
            population_size,
            generation: Vec::new(),
            generations: 0,
            next_id: 0,
            rng: self.seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed),
        }
    }
}

/// Sample a value from the standard normal distribution using the
/// Box-Muller transform.
fn sample_standard_normal(rng: &mut fastrand::Rng) -> f64 {
    let u1 = rng.f64().max(f64::EPSILON);
    let u2 = rng.f64() * core::f64::consts::TAU;
    (-2.0 * u1.ln()).sqrt() * u2.cos()
}
