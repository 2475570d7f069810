//! Parameter assignments and their canonical (integer) form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A named assignment of real values to tunable parameters.
///
/// Keys are kept sorted, so iteration and serialization order are stable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterPoint(BTreeMap<String, f64>);

impl ParameterPoint {
    /// Creates an empty point.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter value, returning the point for chaining.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    /// Sets a parameter value.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    /// Returns the value for `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Iterates over `(name, value)` in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Rounds every value to the nearest integer (ties to even).
    ///
    /// Points whose values round to the same integers share one canonical
    /// key and therefore one accumulated game history.
    ///
    /// # Examples
    ///
    /// ```
    /// use pairtune::ParameterPoint;
    ///
    /// let a = ParameterPoint::new().with("x", 3.49);
    /// let b = ParameterPoint::new().with("x", 2.51);
    /// assert_eq!(a.canonical(), b.canonical());
    /// ```
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn canonical(&self) -> CanonicalPoint {
        CanonicalPoint(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.round_ties_even() as i64))
                .collect(),
        )
    }
}

impl FromIterator<(String, f64)> for ParameterPoint {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The integer form of a [`ParameterPoint`], used as the accumulation key
/// and as the assignment handed to the trial executor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalPoint(BTreeMap<String, i64>);

impl CanonicalPoint {
    /// Returns the value for `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<i64> {
        self.0.get(name).copied()
    }

    /// Iterates over `(name, value)` in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, i64)> for CanonicalPoint {
    fn from_iter<I: IntoIterator<Item = (String, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl core::fmt::Display for CanonicalPoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_rounds_and_sorts() {
        let p = ParameterPoint::new().with("b", 1.6).with("a", -2.4);
        let key = p.canonical();
        assert_eq!(key.get("a"), Some(-2));
        assert_eq!(key.get("b"), Some(2));
        assert_eq!(key.to_string(), "{a: -2, b: 2}");
    }

    #[test]
    fn test_canonical_ties_to_even() {
        let p = ParameterPoint::new().with("x", 2.5).with("y", 3.5);
        let key = p.canonical();
        assert_eq!(key.get("x"), Some(2));
        assert_eq!(key.get("y"), Some(4));
    }

    #[test]
    fn test_nearby_points_share_key() {
        let a = ParameterPoint::new().with("x", 3.49);
        let b = ParameterPoint::new().with("x", 3.01);
        assert_ne!(a, b);
        assert_eq!(a.canonical(), b.canonical());
    }

    #[test]
    fn test_canonical_serializes_as_map() {
        let key = ParameterPoint::new().with("x", 7.2).canonical();
        assert_eq!(serde_json::to_string(&key).unwrap(), r#"{"x":7}"#);
    }
}
