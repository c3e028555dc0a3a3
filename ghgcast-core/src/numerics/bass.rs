//! Bass diffusion adoption curves.
//!
//! Models the market-share growth of a spreading technology (here: electric
//! vehicles) with the Bass model
//!
//! ```text
//! f(t) = (p+q)^2/p * e^(-(p+q)t) / (1 + (q/p) e^(-(p+q)t))^2
//! ```
//!
//! where `p` is the innovation coefficient and `q` the imitation
//! coefficient. The share evolves multiplicatively, `y_{t+1} = y_t * (1 + m
//! f(t))`, and the free multiplier `m` is fitted so the simulated terminal
//! share hits a caller-supplied target.

use crate::errors::{ScenarioError, ScenarioResult};
use crate::numerics::optimize::golden_section_min;

/// Largest multiplier the fit will consider.
const MULTIPLIER_UPPER_BOUND: f64 = 200.0;
/// Bracket width below which the fit stops refining the multiplier.
const FIT_TOLERANCE: f64 = 1e-10;
/// Acceptable distance between the simulated terminal share and the target.
const RESIDUAL_TOLERANCE: f64 = 1e-4;

/// Instantaneous adoption rate at time `t`.
pub fn bass_diffuse(t: f64, p: f64, q: f64) -> f64 {
    assert!(p > 0.0 && q > 0.0, "diffusion coefficients must be positive");
    let e = (-(p + q) * t).exp();
    (p + q).powi(2) / p * e / (1.0 + q / p * e).powi(2)
}

/// Simulate `n_years` of multiplicative adoption growth from `y0`.
///
/// The returned vector holds the share after each year, so its last element
/// is the terminal share.
pub fn simulate_adoption(n_years: usize, y0: f64, m: f64, p: f64, q: f64) -> Vec<f64> {
    let mut share = y0;
    let mut shares = Vec::with_capacity(n_years);
    for t in 0..n_years {
        share *= 1.0 + m * bass_diffuse(t as f64, p, q);
        shares.push(share);
    }
    shares
}

/// Generate an adoption series of `n_years + 1` values starting at
/// `y_start` and ending as close to `y_end` as the model allows.
///
/// The multiplier is fitted by golden-section search on the absolute
/// distance between the simulated terminal share and `y_end`. A residual
/// above tolerance (including a target below the starting share, which
/// pure diffusion cannot reach) is surfaced as
/// [`ScenarioError::FitNonConvergence`] rather than returned silently.
pub fn generate_diffusion(
    n_years: usize,
    y_start: f64,
    y_end: f64,
    p: f64,
    q: f64,
) -> ScenarioResult<Vec<f64>> {
    assert!(n_years > 0, "diffusion needs at least one forecast year");
    assert!(y_start > 0.0, "starting share must be positive");

    let objective = |m: f64| {
        let simulated = simulate_adoption(n_years, y_start, m, p, q);
        (y_end - simulated[n_years - 1]).abs()
    };
    let (m, residual) =
        golden_section_min(objective, 0.0, MULTIPLIER_UPPER_BOUND, FIT_TOLERANCE, 300);
    if residual > RESIDUAL_TOLERANCE {
        return Err(ScenarioError::FitNonConvergence {
            what: "Bass diffusion".to_string(),
            residual,
        });
    }

    let mut series = Vec::with_capacity(n_years + 1);
    series.push(y_start);
    series.extend(simulate_adoption(n_years, y_start, m, p, q));
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const P: f64 = 0.03;
    const Q: f64 = 0.6;

    #[test]
    fn diffusion_rate_is_positive_and_peaks() {
        let rates: Vec<f64> = (0..30).map(|t| bass_diffuse(t as f64, P, Q)).collect();
        assert!(rates.iter().all(|&r| r > 0.0));
        // The rate rises to a single interior peak, then decays
        let peak = rates
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert!(peak > 0 && peak < 15, "peak at {}", peak);
    }

    #[test]
    fn adoption_is_monotonic() {
        let shares = simulate_adoption(20, 0.01, 5.0, P, Q);
        for window in shares.windows(2) {
            assert!(window[1] >= window[0]);
        }
    }

    #[test]
    fn fitted_series_hits_the_target() {
        let series = generate_diffusion(16, 0.01, 0.30, P, Q).unwrap();
        assert_eq!(series.len(), 17);
        assert_eq!(series[0], 0.01);
        assert_relative_eq!(series[16], 0.30, epsilon = 1e-3);
        // Never overshoots on the way there
        for value in &series {
            assert!(*value <= 0.30 + 1e-3);
        }
    }

    #[test]
    fn fitted_series_is_s_shaped() {
        let series = generate_diffusion(16, 0.01, 0.50, P, Q).unwrap();
        // Yearly increments grow first, then shrink
        let increments: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();
        let peak = increments
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert!(peak > 0 && peak < increments.len() - 1);
    }

    #[test]
    fn unreachable_target_is_an_error() {
        // Diffusion cannot shrink adoption below its starting share
        let err = generate_diffusion(10, 0.20, 0.05, P, Q).unwrap_err();
        assert!(matches!(err, ScenarioError::FitNonConvergence { .. }));
    }
}
