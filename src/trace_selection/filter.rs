use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::individual_trace::IntensityTrace;
use super::tools::*;
use crate::signal_analysis::hmm::initialization::gaussian_mixture::{summarize_groups, GaussianMixture1D};

// Two max-intensity groups are considered distinct only if neither outnumbers
// the other by this factor
const GROUP_SIZE_RATIO_LIMIT: f64 = 10.0;
// and their medians are separated by more than this many standard deviations
const GROUP_SEPARATION_MIN: f64 = 1.0;
// Spots in the bright group further than this many std from its mean are dropped
const BRIGHT_GROUP_MAX_Z: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterTest {
    MinIntensity,
    MaxIntensity,
    Rmsd,
    UnboundIntensity,
    BoundIntensity,
}

/// Median-absolute-deviation outlier test over a population.
///
/// A value is an inlier when `|x - median| / MAD < cutoff`. When the MAD is
/// zero every scaled deviation is taken as zero, so all values pass.
pub fn is_inlier(values: &[f64], cutoff: f64) -> Vec<bool> {
    let center = median(values);
    let mad = median_absolute_deviation(values);

    values.iter()
        .map(|value| {
            let deviation = (value - center).abs();
            let scaled = if mad > 0.0 {deviation / mad} else {0.0};
            scaled < cutoff
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotSelection {
    pub is_inlier: Vec<bool>,
    pub failed_tests: Vec<Vec<FilterTest>>,
    pub found_two_groups: bool,
}

impl SpotSelection {
    pub fn num_selected(&self) -> usize {
        self.is_inlier.iter().filter(|&&inlier| inlier).count()
    }

    pub fn select<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items.iter()
            .zip(&self.is_inlier)
            .filter(|(_, inlier)| **inlier)
            .map(|(item, _)| item.clone())
            .collect()
    }
}

// Keep candidate spots whose dimmest frame is typical of the population and
// whose brightest frame belongs to the bright population.
pub fn select_spots(traces: &[IntensityTrace], intensity_min_cutoff: f64, intensity_max_cutoff: f64) -> SpotSelection {
    let peak_min: Vec<f64> = traces.iter().map(|trace| trace.min_value()).collect();
    let peak_max: Vec<f64> = traces.iter().map(|trace| trace.max_value()).collect();

    let min_inlier = is_inlier(&peak_min, intensity_min_cutoff);
    let (max_inlier, found_two_groups) = match bright_group(&peak_max) {
        Some(bright) => (bright, true),
        None => (is_inlier(&peak_max, intensity_max_cutoff), false),
    };

    let mut failed_tests: Vec<Vec<FilterTest>> = vec![Vec::new(); traces.len()];
    for (i, failed) in failed_tests.iter_mut().enumerate() {
        if !min_inlier[i] {failed.push(FilterTest::MinIntensity)}
        if !max_inlier[i] {failed.push(FilterTest::MaxIntensity)}
    }

    let is_inlier: Vec<bool> = failed_tests.iter().map(|failed| failed.is_empty()).collect();
    let selection = SpotSelection { is_inlier, failed_tests, found_two_groups };

    info!(
        "Selected {} of {} candidate spots ({} max-intensity groups)",
        selection.num_selected(),
        traces.len(),
        if found_two_groups {"two"} else {"one"}
    );

    selection
}

// If the max intensities split into two distinct groups, flag members of the
// brighter group that lie within BRIGHT_GROUP_MAX_Z std of its mean
fn bright_group(peak_max: &[f64]) -> Option<Vec<bool>> {
    let gmm = GaussianMixture1D::fit(peak_max, 2).ok()?;
    let labels = gmm.predict(peak_max);
    let groups = summarize_groups(peak_max, &labels, 2);

    let (n0, n1) = (groups[0].count as f64, groups[1].count as f64);
    if n0.min(n1) == 0.0 {return None}

    let size_balanced = n0.max(n1) / n0.min(n1) < GROUP_SIZE_RATIO_LIMIT;
    let separated = (groups[0].median - groups[1].median).abs() / groups[0].std.min(groups[1].std) > GROUP_SEPARATION_MIN;
    debug!("Max intensity groups: {:?}, balanced {}, separated {}", groups, size_balanced, separated);

    if !(size_balanced && separated) {return None}

    // Label 1 is the brighter component
    let bright_values: Vec<f64> = peak_max.iter()
        .zip(&labels)
        .filter(|(_, label)| **label == 1)
        .map(|(&value, _)| value)
        .collect();
    let [mean, std] = compute_mean_and_std(&bright_values);

    Some(
        peak_max.iter()
            .zip(&labels)
            .map(|(value, &label)| label == 1 && !((value - mean).abs() / std > BRIGHT_GROUP_MAX_Z))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_inlier_flags_outlier() {
        let values = [10.0, 11.0, 9.0, 10.5, 9.5, 50.0];
        let inliers = is_inlier(&values, 4.0);
        assert_eq!(inliers, vec![true, true, true, true, true, false]);
    }

    // Zero MAD means nothing is flagged
    #[test]
    fn test_is_inlier_zero_mad() {
        let values = [3.0, 3.0, 3.0, 100.0];
        assert!(is_inlier(&values, 1.0).iter().all(|&inlier| inlier));
    }

    #[test]
    fn test_select_spots_two_groups() {
        // Dim background peaks and bright binding spots with the same floor
        let mut traces = Vec::new();
        for i in 0..20 {
            let top = 20.0 + (i % 5) as f64;
            traces.push(IntensityTrace::new(vec![10.0, top, 10.0 + (i % 3) as f64 * 0.1]).unwrap());
        }
        for i in 0..20 {
            let top = 200.0 + (i % 5) as f64 * 2.0;
            traces.push(IntensityTrace::new(vec![10.0, top, 10.0 + (i % 3) as f64 * 0.1]).unwrap());
        }

        let selection = select_spots(&traces, 4.0, 4.0);

        assert!(selection.found_two_groups);
        assert_eq!(selection.num_selected(), 20);
        assert!(selection.is_inlier[20..].iter().all(|&inlier| inlier));
        assert!(selection.failed_tests[0].contains(&FilterTest::MaxIntensity));
    }

    #[test]
    fn test_select_spots_single_group() {
        let traces: Vec<IntensityTrace> = (0..10)
            .map(|i| IntensityTrace::new(vec![10.0, 100.0 + i as f64]).unwrap())
            .chain(std::iter::once(IntensityTrace::new(vec![10.0, 1000.0]).unwrap()))
            .collect();

        let selection = select_spots(&traces, 4.0, 4.0);

        assert!(!selection.found_two_groups);
        assert!(!selection.is_inlier[10]);
        assert_eq!(selection.num_selected(), 10);
    }
}
