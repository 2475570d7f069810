//! Tunable parameter declarations.
//!
//! An engine built for tuning lists its tunable parameters as
//! `name,init,min,max` lines. Entries whose bounds coincide are constants,
//! not search dimensions, and are filtered out by [`tunable`] before the
//! optimizer is built.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::point::ParameterPoint;

/// One declared parameter with its initial value and inclusive bounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub init: f64,
    pub low: f64,
    pub high: f64,
}

impl ParameterSpec {
    /// Creates a spec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameterListing`] when `low > high` or the
    /// initial value lies outside the bounds.
    pub fn new(name: impl Into<String>, init: f64, low: f64, high: f64) -> Result<Self> {
        let name = name.into();
        if low > high || !(low..=high).contains(&init) {
            return Err(Error::InvalidParameterListing {
                line: format!("{name},{init},{low},{high}"),
                reason: "initial value must lie within low <= high".to_owned(),
            });
        }
        Ok(Self {
            name,
            init,
            low,
            high,
        })
    }

    /// Whether the optimizer may move this parameter.
    #[must_use]
    pub fn is_tunable(&self) -> bool {
        self.low != self.high
    }

    /// Initial mutation scale: a quarter of the range.
    #[must_use]
    pub fn sigma(&self) -> f64 {
        (self.high - self.low) / 4.0
    }
}

/// Parses an engine's tunable-parameter listing.
///
/// Lines without a comma, and the engine's banner line, are ignored.
///
/// # Errors
///
/// Returns [`Error::InvalidParameterListing`] for a comma-separated line
/// that does not hold a name followed by three integers.
///
/// # Examples
///
/// ```
/// use pairtune::space::parse_parameter_listing;
///
/// let specs = parse_parameter_listing("Stockfish 17 by the SF developers\nA,10,0,20\n").unwrap();
/// assert_eq!(specs.len(), 1);
/// assert_eq!(specs[0].name, "A");
/// ```
pub fn parse_parameter_listing(listing: &str) -> Result<Vec<ParameterSpec>> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| line.contains(',') && !line.contains("Stockfish"))
        .map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Result<ParameterSpec> {
    let invalid = |reason: &str| Error::InvalidParameterListing {
        line: line.to_owned(),
        reason: reason.to_owned(),
    };

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let [name, init, low, high] = fields.as_slice() else {
        return Err(invalid("expected name,init,min,max"));
    };
    if name.is_empty() {
        return Err(invalid("empty parameter name"));
    }
    #[allow(clippy::cast_precision_loss)]
    let number = |s: &str| -> Result<f64> {
        s.parse::<i64>()
            .map(|v| v as f64)
            .map_err(|_| invalid("values must be integers"))
    };
    ParameterSpec::new(*name, number(*init)?, number(*low)?, number(*high)?)
}

/// Keeps only the parameters with distinct bounds.
#[must_use]
pub fn tunable(specs: &[ParameterSpec]) -> Vec<ParameterSpec> {
    specs.iter().filter(|s| s.is_tunable()).cloned().collect()
}

/// The point made of every spec's initial value.
#[must_use]
pub fn initial_point(specs: &[ParameterSpec]) -> ParameterPoint {
    specs.iter().map(|s| (s.name.clone(), s.init)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listing_skips_noise() {
        let listing = "\
Stockfish dev-20240101 by the Stockfish developers
info string NNUE evaluation enabled

FutMargin,170,100,240
HashMB, 16, 16, 16
";
        let specs = parse_parameter_listing(listing).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0], ParameterSpec::new("FutMargin", 170.0, 100.0, 240.0).unwrap());
        assert_eq!(specs[1].name, "HashMB");
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(parse_parameter_listing("A,1,2\n").is_err());
        assert!(parse_parameter_listing("A,x,0,2\n").is_err());
        assert!(parse_parameter_listing("A,5,0,2\n").is_err());
        assert!(parse_parameter_listing(",1,0,2\n").is_err());
    }

    #[test]
    fn test_equal_bounds_are_fixed() {
        let specs = vec![
            ParameterSpec::new("a", 1.0, 0.0, 4.0).unwrap(),
            ParameterSpec::new("b", 3.0, 3.0, 3.0).unwrap(),
        ];
        let free = tunable(&specs);
        assert_eq!(free.len(), 1);
        assert_eq!(free[0].name, "a");
        assert!((free[0].sigma() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_initial_point() {
        let specs = vec![ParameterSpec::new("a", 1.0, 0.0, 4.0).unwrap()];
        assert_eq!(initial_point(&specs).get("a"), Some(1.0));
    }
}
