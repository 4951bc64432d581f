use serde::{Deserialize, Serialize};

use super::estimation::RateEstimate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombinedEstimate {
    pub rate: f64,
    pub standard_error: f64,
    pub sample_count: usize,
    pub classes_used: usize,
}

impl CombinedEstimate {
    pub fn is_defined(&self) -> bool {
        self.rate.is_finite()
    }

    pub fn time_constant(&self) -> f64 {
        1.0 / self.rate
    }

    pub fn time_constant_error(&self) -> f64 {
        self.standard_error / (self.rate * self.rate)
    }
}

/// Inverse-variance weighted mean of per-class rate estimates.
///
/// Classes whose weight `1 / se^2` is zero, infinite or undefined are left
/// out. With nothing left the combined rate and error are NaN. Included
/// terms are summed in sorted order so the result does not depend on the
/// order of the inputs.
pub fn combine(estimates: &[RateEstimate]) -> CombinedEstimate {
    let sample_count = estimates.iter().map(|estimate| estimate.sample_count).sum();

    let mut weighted: Vec<(f64, f64)> = estimates.iter()
        .filter(|estimate| estimate.rate.is_finite())
        .map(|estimate| (estimate.rate, 1.0 / (estimate.standard_error * estimate.standard_error)))
        .filter(|(_, weight)| *weight > 0.0 && weight.is_finite())
        .collect();
    weighted.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

    if weighted.is_empty() {
        return CombinedEstimate { rate: f64::NAN, standard_error: f64::NAN, sample_count, classes_used: 0 };
    }

    let weight_sum: f64 = weighted.iter().map(|(_, weight)| weight).sum();
    let rate = weighted.iter().map(|(rate, weight)| rate * weight).sum::<f64>() / weight_sum;

    CombinedEstimate {
        rate,
        standard_error: weight_sum.powf(-0.5),
        sample_count,
        classes_used: weighted.len(),
    }
}
