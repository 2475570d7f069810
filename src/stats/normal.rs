// ---------------------------------------------------------------------------
// Normal distribution helpers (Hart / Abramowitz-Stegun approximation)
// ---------------------------------------------------------------------------

/// Standard normal PDF.
pub(crate) fn pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal CDF.
pub(crate) fn cdf(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    if x < -8.0 {
        return 0.0;
    }
    if x > 8.0 {
        return 1.0;
    }

    let abs_x = x.abs();
    let t = 1.0 / (1.0 + 0.231_641_9 * abs_x);
    let poly = t
        * (0.319_381_530
            + t * (-0.356_563_782 + t * (1.781_477_937 + t * (-1.821_255_978 + t * 1.330_274_429))));
    let upper_tail = pdf(abs_x) * poly;

    if x >= 0.0 { 1.0 - upper_tail } else { upper_tail }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cdf_reference_values() {
        assert!((cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((cdf(1.0) - 0.841_344_746).abs() < 1e-6);
        assert!((cdf(-1.959_964) - 0.025).abs() < 1e-6);
        assert_eq!(cdf(-9.0), 0.0);
        assert_eq!(cdf(9.0), 1.0);
    }

    #[test]
    fn test_cdf_symmetry() {
        for &x in &[0.1, 0.7, 1.3, 2.9, 5.0] {
            assert!((cdf(x) + cdf(-x) - 1.0).abs() < 1e-12);
        }
    }
}
