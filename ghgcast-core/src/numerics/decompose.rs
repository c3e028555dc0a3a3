//! Multiplicative decomposition of an emission reduction into the share
//! caused by an activity-level change and the share caused by an
//! emission-intensity change.
//!
//! A sector's emissions factor as `activity x intensity` (heat demand x
//! emission factor, mileage x per-km factor, consumption x supply factor).
//! Between a reference year and a forecast year the total drop is split by
//! holding the reference intensity fixed: whatever the activity change alone
//! would have saved is "activity-caused", the clamped remainder is
//! "intensity-caused", and both parts are rescaled so they sum to the actual
//! reduction.

/// One decomposed reduction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReductionAttribution {
    /// Actual emission drop, `reference - forecast` (same unit as the inputs'
    /// product).
    pub total_reduction: f64,
    /// Part of the drop attributed to the activity change.
    pub activity_reduction: f64,
    /// Part of the drop attributed to the intensity change.
    pub intensity_reduction: f64,
    /// `activity_reduction / total_reduction`; shares sum to 1.
    pub activity_share: f64,
    pub intensity_share: f64,
}

/// Decompose the reduction between `(reference_activity, reference_intensity)`
/// and `(forecast_activity, forecast_intensity)`.
///
/// Defined for a positive total reduction. When emissions did not fall, all
/// fields except `total_reduction` are zero.
pub fn attribute_reduction(
    reference_activity: f64,
    reference_intensity: f64,
    forecast_activity: f64,
    forecast_intensity: f64,
) -> ReductionAttribution {
    let reference_product = reference_activity * reference_intensity;
    let forecast_product = forecast_activity * forecast_intensity;
    let total_reduction = reference_product - forecast_product;

    if total_reduction <= 0.0 {
        return ReductionAttribution {
            total_reduction,
            activity_reduction: 0.0,
            intensity_reduction: 0.0,
            activity_share: 0.0,
            intensity_share: 0.0,
        };
    }

    let activity_raw = (reference_product - forecast_activity * reference_intensity).max(0.0);
    let intensity_raw = (total_reduction - activity_raw).max(0.0);
    let raw_sum = activity_raw + intensity_raw;

    // Rescale so the parts add up to the actual reduction
    let scale = if raw_sum > 0.0 {
        total_reduction / raw_sum
    } else {
        0.0
    };
    let activity_reduction = activity_raw * scale;
    let intensity_reduction = intensity_raw * scale;

    ReductionAttribution {
        total_reduction,
        activity_reduction,
        intensity_reduction,
        activity_share: activity_reduction / total_reduction,
        intensity_share: intensity_reduction / total_reduction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn shares_sum_to_one_and_parts_to_total() {
        let attribution = attribute_reduction(100.0, 2.0, 80.0, 1.5);
        assert_relative_eq!(attribution.total_reduction, 80.0);
        assert_relative_eq!(
            attribution.activity_reduction + attribution.intensity_reduction,
            attribution.total_reduction,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            attribution.activity_share + attribution.intensity_share,
            1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn pure_activity_reduction() {
        let attribution = attribute_reduction(100.0, 2.0, 60.0, 2.0);
        assert_relative_eq!(attribution.activity_share, 1.0, epsilon = 1e-12);
        assert_relative_eq!(attribution.intensity_share, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn pure_intensity_reduction() {
        let attribution = attribute_reduction(100.0, 2.0, 100.0, 1.0);
        assert_relative_eq!(attribution.intensity_share, 1.0, epsilon = 1e-12);
        assert_relative_eq!(attribution.activity_share, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn growing_activity_attributes_everything_to_intensity() {
        // Activity grew; the drop is carried entirely by the cleaner intensity
        let attribution = attribute_reduction(100.0, 2.0, 120.0, 1.0);
        assert_relative_eq!(attribution.total_reduction, 80.0);
        assert_relative_eq!(attribution.activity_share, 0.0, epsilon = 1e-12);
        assert_relative_eq!(attribution.intensity_share, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn no_reduction_yields_zero_shares() {
        let attribution = attribute_reduction(100.0, 2.0, 110.0, 2.0);
        assert!(attribution.total_reduction < 0.0);
        assert_eq!(attribution.activity_share, 0.0);
        assert_eq!(attribution.intensity_share, 0.0);
    }
}
