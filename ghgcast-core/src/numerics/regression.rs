//! Least-squares line fitting with a two-sided significance test.
//!
//! The p-value uses the exact Student's t distribution through the
//! regularized incomplete beta function, so trend forecasts can fall back to
//! a mean-converging series when a fitted slope is statistically
//! indistinguishable from noise.

/// Result of a least-squares line fit.
#[derive(Debug, Clone, Copy)]
pub struct LinRegression {
    pub slope: f64,
    pub intercept: f64,
    /// Pearson correlation coefficient.
    pub r: f64,
    /// Two-sided p-value for the hypothesis that the slope is zero.
    pub p_value: f64,
}

impl LinRegression {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Fit `y = intercept + slope * x` by ordinary least squares.
///
/// Panics if the inputs differ in length or hold fewer than two points, or
/// if all `x` values coincide.
pub fn linregress(x: &[f64], y: &[f64]) -> LinRegression {
    assert_eq!(x.len(), y.len(), "x and y must have the same length");
    let n = x.len();
    assert!(n >= 2, "regression needs at least two points");

    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_y = y.iter().sum::<f64>() / n as f64;

    let mut ss_xx = 0.0;
    let mut ss_yy = 0.0;
    let mut ss_xy = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        let dy = y[i] - mean_y;
        ss_xx += dx * dx;
        ss_yy += dy * dy;
        ss_xy += dx * dy;
    }
    assert!(ss_xx > 0.0, "all x values coincide");

    let slope = ss_xy / ss_xx;
    let intercept = mean_y - slope * mean_x;
    let r = if ss_yy == 0.0 {
        // A perfectly flat series correlates with nothing
        0.0
    } else {
        (ss_xy / (ss_xx * ss_yy).sqrt()).clamp(-1.0, 1.0)
    };

    let df = n as f64 - 2.0;
    let p_value = if df <= 0.0 || (1.0 - r * r) <= f64::EPSILON {
        0.0
    } else if r == 0.0 {
        1.0
    } else {
        let t = r * (df / (1.0 - r * r)).sqrt();
        // Two-sided p for Student's t: I_{df/(df+t^2)}(df/2, 1/2)
        incomplete_beta(0.5 * df, 0.5, df / (df + t * t))
    };

    LinRegression {
        slope,
        intercept,
        r,
        p_value,
    }
}

/// Natural log of the gamma function (Lanczos approximation).
pub fn ln_gamma(x: f64) -> f64 {
    assert!(x > 0.0, "ln_gamma requires a positive argument");
    const COEFFICIENTS: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.120_865_097_386_617_9e-2,
        -0.539_523_938_495_3e-5,
    ];
    let mut tmp = x + 5.5;
    tmp -= (x + 0.5) * tmp.ln();
    let mut series = 1.000_000_000_190_015;
    for (j, coefficient) in COEFFICIENTS.iter().enumerate() {
        series += coefficient / (x + 1.0 + j as f64);
    }
    -tmp + (2.506_628_274_631_000_5 * series / x).ln()
}

/// Regularized incomplete beta function I_x(a, b).
pub fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    assert!(a > 0.0 && b > 0.0, "shape parameters must be positive");
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let front =
        (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln()).exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Continued fraction for the incomplete beta function (Lentz's method).
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITERATIONS: usize = 200;
    const EPS: f64 = 3.0e-12;
    const FPMIN: f64 = 1.0e-300;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < FPMIN {
        d = FPMIN;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let numerator = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 + numerator * d;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = 1.0 + numerator / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        h *= d * c;

        let numerator = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + numerator * d;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = 1.0 + numerator / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPS {
            return h;
        }
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn perfect_line_recovers_coefficients() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 3.0 + 2.0 * v).collect();
        let fit = linregress(&x, &y);
        assert_relative_eq!(fit.slope, 2.0, epsilon = 1e-12);
        assert_relative_eq!(fit.intercept, 3.0, epsilon = 1e-12);
        assert_relative_eq!(fit.r, 1.0, epsilon = 1e-12);
        assert_eq!(fit.p_value, 0.0);
        assert_relative_eq!(fit.predict(20.0), 43.0, epsilon = 1e-12);
    }

    #[test]
    fn strong_trend_is_significant() {
        let x: Vec<f64> = (0..12).map(|i| i as f64).collect();
        // Deterministic small wobble on a clear downward trend
        let y: Vec<f64> = x
            .iter()
            .map(|v| 100.0 - 4.0 * v + if (*v as i64) % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let fit = linregress(&x, &y);
        assert!(fit.slope < -3.5);
        assert!(fit.p_value < 0.001, "p = {}", fit.p_value);
    }

    #[test]
    fn trendless_wobble_is_not_significant() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|v| if (*v as i64) % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let fit = linregress(&x, &y);
        assert!(fit.p_value > 0.05, "p = {}", fit.p_value);
    }

    #[test]
    fn flat_series_has_zero_slope() {
        let x: Vec<f64> = (0..5).map(|i| i as f64).collect();
        let y = vec![7.0; 5];
        let fit = linregress(&x, &y);
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.r, 0.0);
        assert_eq!(fit.p_value, 1.0);
    }

    #[test]
    fn ln_gamma_matches_factorials() {
        // Gamma(n) = (n-1)!
        assert_relative_eq!(ln_gamma(5.0), 24.0_f64.ln(), epsilon = 1e-10);
        assert_relative_eq!(ln_gamma(1.0), 0.0, epsilon = 1e-10);
        // Gamma(1/2) = sqrt(pi)
        assert_relative_eq!(
            ln_gamma(0.5),
            std::f64::consts::PI.sqrt().ln(),
            epsilon = 1e-10
        );
    }

    #[test]
    fn incomplete_beta_boundaries_and_symmetry() {
        assert_eq!(incomplete_beta(2.0, 3.0, 0.0), 0.0);
        assert_eq!(incomplete_beta(2.0, 3.0, 1.0), 1.0);
        // I_x(1, 1) is the identity
        assert_relative_eq!(incomplete_beta(1.0, 1.0, 0.42), 0.42, epsilon = 1e-10);
        // Symmetry: I_x(a, b) = 1 - I_{1-x}(b, a)
        let lhs = incomplete_beta(2.5, 1.5, 0.3);
        let rhs = 1.0 - incomplete_beta(1.5, 2.5, 0.7);
        assert_relative_eq!(lhs, rhs, epsilon = 1e-10);
    }

    #[test]
    fn t_distribution_tail_matches_known_value() {
        // For t = 2.228 with 10 degrees of freedom the two-sided p is 0.05
        let df = 10.0;
        let t: f64 = 2.228_138;
        let p = incomplete_beta(0.5 * df, 0.5, df / (df + t * t));
        assert_relative_eq!(p, 0.05, epsilon = 1e-4);
    }
}
