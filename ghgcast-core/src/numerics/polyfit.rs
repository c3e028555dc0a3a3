//! Least-squares polynomial fitting.

use nalgebra::{DMatrix, DVector};

/// Fit a degree-`degree` polynomial to `(x, y)` by least squares.
///
/// Returns the coefficients in ascending order of power. The Vandermonde
/// system is solved through SVD, which stays stable for the modest degrees
/// used here.
///
/// Panics if the inputs differ in length or hold fewer than `degree + 1`
/// points.
pub fn polyfit(x: &[f64], y: &[f64], degree: usize) -> Vec<f64> {
    assert_eq!(x.len(), y.len(), "x and y must have the same length");
    assert!(
        x.len() > degree,
        "fitting a degree-{} polynomial needs more than {} points",
        degree,
        degree
    );

    let n_coefficients = degree + 1;
    let vandermonde = DMatrix::from_fn(x.len(), n_coefficients, |row, col| x[row].powi(col as i32));
    let rhs = DVector::from_column_slice(y);

    let solution = vandermonde
        .svd(true, true)
        .solve(&rhs, 1e-12)
        .expect("polynomial least squares is always solvable via SVD");
    solution.iter().copied().collect()
}

/// Evaluate a polynomial given ascending coefficients (Horner's scheme).
pub fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients
        .iter()
        .rev()
        .fold(0.0, |acc, &coefficient| acc * x + coefficient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn exact_quadratic_recovery() {
        let x: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 1.5 - 2.0 * v + 0.5 * v * v).collect();
        let coefficients = polyfit(&x, &y, 2);
        assert_relative_eq!(coefficients[0], 1.5, epsilon = 1e-8);
        assert_relative_eq!(coefficients[1], -2.0, epsilon = 1e-8);
        assert_relative_eq!(coefficients[2], 0.5, epsilon = 1e-8);
    }

    #[test]
    fn degree_five_interpolates_six_points() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y = [2.0, -1.0, 4.0, 0.5, 3.0, -2.0];
        let coefficients = polyfit(&x, &y, 5);
        for (xi, yi) in x.iter().zip(y.iter()) {
            assert_relative_eq!(polyval(&coefficients, *xi), *yi, epsilon = 1e-6);
        }
    }

    #[test]
    fn overdetermined_fit_smooths() {
        // Points on a line, fitted with a cubic: higher coefficients vanish
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().map(|v| 3.0 + 2.0 * v).collect();
        let coefficients = polyfit(&x, &y, 3);
        assert_relative_eq!(coefficients[0], 3.0, epsilon = 1e-6);
        assert_relative_eq!(coefficients[1], 2.0, epsilon = 1e-6);
        assert!(coefficients[2].abs() < 1e-6);
        assert!(coefficients[3].abs() < 1e-6);
    }

    #[test]
    fn polyval_constant() {
        assert_eq!(polyval(&[7.0], 123.0), 7.0);
    }

    #[test]
    #[should_panic(expected = "needs more than")]
    fn underdetermined_fit_panics() {
        polyfit(&[1.0, 2.0], &[1.0, 2.0], 5);
    }
}
